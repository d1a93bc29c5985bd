//! Idempotent table clearing through asynchronous deletion triggers.

use std::time::Duration;

use tokio::time::sleep;

use verdant_core::ClearReport;

use super::error::TransportError;
use super::fetch::fetch_all_records;
use super::source::TableStore;
use super::types::{ClearPolicy, ClearTarget, TableRef};

/// Clear a set of tables by firing their deletion triggers and verifying
/// they emptied, retrying the still-populated subset.
///
/// Each round fires every pending table's trigger twice (the trigger is
/// fire-and-forget with no delivery confirmation, so the second call hedges
/// against a dropped request), then sleeps the settle interval and fetches
/// each table's first page to check emptiness. Tables still holding records
/// are retried in the next round with a doubled settle interval, up to the
/// policy's attempt budget; the cycle never recurses unboundedly against a
/// deletion hook that never completes. Trigger and verification failures are
/// tolerated per table and logged.
///
/// Clearing an already-empty set of tables is a no-op beyond the trigger
/// calls. The returned [`ClearReport`] names the cleared and unresolved
/// tables so callers decide how to treat an incomplete clear.
pub async fn clear_tables<S: TableStore + ?Sized>(
    store: &S,
    targets: &[ClearTarget],
    policy: &ClearPolicy,
) -> ClearReport {
    let mut pending: Vec<ClearTarget> = targets.to_vec();
    let mut cleared = Vec::new();
    let mut attempts = 0;
    let mut settle = policy.settle;

    while !pending.is_empty() && attempts < policy.max_attempts {
        attempts += 1;
        for pass in 0..2 {
            for target in &pending {
                trigger(store, target, pass).await;
            }
        }
        sleep(settle).await;

        let mut still_pending = Vec::new();
        for target in pending {
            if verified_empty(store, &target.table).await {
                cleared.push(target.table.table);
            } else {
                still_pending.push(target);
            }
        }
        pending = still_pending;
        settle = settle.saturating_mul(2);
    }

    if attempts > 0 {
        sleep(policy.cooldown).await;
    }

    ClearReport {
        cleared,
        unresolved: pending.into_iter().map(|target| target.table.table).collect(),
        attempts,
    }
}

async fn trigger<S: TableStore + ?Sized>(store: &S, target: &ClearTarget, pass: usize) {
    let Some(webhook) = &target.webhook else {
        if pass == 0 {
            log::warn!("no deletion trigger configured for {}", target.table);
        }
        return;
    };
    if let Err(err) = store.trigger_webhook(webhook).await {
        log::warn!("deletion trigger for {} failed: {err}", target.table);
    }
}

async fn verified_empty<S: TableStore + ?Sized>(store: &S, table: &TableRef) -> bool {
    match store.list_page(table, None, None).await {
        Ok(page) => page.records.is_empty(),
        Err(err) => {
            log::warn!("failed to verify {table} emptied: {err}");
            false
        }
    }
}

/// Delete every record of a table one by one.
///
/// Record ids are collected by an exhaustive listing first; each delete is
/// paced and tolerated individually, so one rejected delete never stops the
/// purge. Used by uploads that replace a table's contents wholesale.
///
/// # Errors
///
/// Returns the transport error of the id listing; without a complete id set
/// the purge cannot start.
pub async fn purge_table<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    pacing: Duration,
) -> Result<usize, TransportError> {
    let records = fetch_all_records(store, table, None).await?;
    let mut deleted = 0;
    for record in &records {
        match store.delete_record(table, record.id()).await {
            Ok(()) => deleted += 1,
            Err(err) => {
                log::warn!("failed to delete record {} from {table}: {err}", record.id());
            }
        }
        sleep(pacing).await;
    }
    Ok(deleted)
}
