use std::collections::HashMap;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use verdant_core::{Frame, LinkCache, Page, PageToken, Record, RecordId, TableName, Value};

use super::test_support::{StoreCall, StubStore, block_on_for_tests};
use super::types::{BaseId, ClearPolicy, ClearTarget, TableRef, UploadOptions, WebhookUrl};
use super::upload::{coerce_value, prepare_frame};
use super::{clear_tables, fetch_all_records, purge_table, resolve_linked_field, upload_frame};

#[fixture]
fn table() -> TableRef {
    TableRef::new(BaseId::from("appBase"), TableName::from("plots"))
}

#[fixture]
fn store() -> StubStore {
    StubStore::new()
}

fn instant_policy(max_attempts: usize) -> ClearPolicy {
    ClearPolicy::new()
        .with_max_attempts(max_attempts)
        .with_settle(Duration::ZERO)
        .with_cooldown(Duration::ZERO)
}

fn single_column_frame(rows: usize) -> Frame {
    let mut frame = Frame::new(["eco_id"]);
    for index in 0..rows {
        frame
            .push_row(vec![Value::Number(index as f64)])
            .expect("row should match columns");
    }
    frame
}

fn webhook_target(table: &TableRef, url: &str) -> ClearTarget {
    ClearTarget::new(table.clone(), Some(WebhookUrl::from(url)))
}

// --- Paginated fetcher ---

#[rstest]
fn fetch_concatenates_pages_in_order(table: TableRef, store: StubStore) {
    store.push_page_with_records(3, Some("c1"));
    store.push_page_with_records(2, None);

    let records = block_on_for_tests(fetch_all_records(&store, &table, None))
        .expect("fetch should succeed");

    let ids: Vec<&str> = records.iter().map(|record| record.id().as_ref()).collect();
    assert_eq!(ids, vec!["rec0", "rec1", "rec2", "rec3", "rec4"]);
    assert_eq!(store.list_page_count(), 2);
    let offsets: Vec<Option<String>> = store
        .calls()
        .iter()
        .filter_map(|call| match call {
            StoreCall::ListPage { offset, .. } => Some(offset.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![None, Some("c1".to_owned())]);
}

#[rstest]
fn fetch_aborts_without_partial_results(table: TableRef, store: StubStore) {
    store.push_page_with_records(3, Some("c1"));
    store.push_page_failure(503);

    let outcome = block_on_for_tests(fetch_all_records(&store, &table, None));

    assert!(outcome.is_err());
    assert_eq!(store.list_page_count(), 2);
}

// --- Linked-record resolver ---

#[rstest]
fn repeated_resolution_fetches_once(table: TableRef, store: StubStore) {
    store.insert_record(Record::new(
        RecordId::from("recA"),
        HashMap::from([("CODE".to_owned(), Value::Text("POD-A".to_owned()))]),
    ));
    let mut cache = LinkCache::new();

    let first = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("recA"),
        "CODE",
        &mut cache,
    ));
    let second = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("recA"),
        "CODE",
        &mut cache,
    ));

    assert_eq!(first, Some(Value::Text("POD-A".to_owned())));
    assert_eq!(second, first);
    assert_eq!(store.get_record_count(), 1);
}

#[rstest]
fn distinct_ids_and_fields_fetch_separately(table: TableRef, store: StubStore) {
    store.insert_record(Record::new(
        RecordId::from("recA"),
        HashMap::from([
            ("CODE".to_owned(), Value::Text("POD-A".to_owned())),
            ("project_id".to_owned(), Value::Text("proj-1".to_owned())),
        ]),
    ));
    store.insert_record(Record::new(
        RecordId::from("recB"),
        HashMap::from([("CODE".to_owned(), Value::Text("POD-B".to_owned()))]),
    ));
    let mut cache = LinkCache::new();

    let code = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("recA"),
        "CODE",
        &mut cache,
    ));
    let project = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("recA"),
        "project_id",
        &mut cache,
    ));
    let other = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("recB"),
        "CODE",
        &mut cache,
    ));

    assert_eq!(code, Some(Value::Text("POD-A".to_owned())));
    assert_eq!(project, Some(Value::Text("proj-1".to_owned())));
    assert_eq!(other, Some(Value::Text("POD-B".to_owned())));
    assert_eq!(store.get_record_count(), 3);
}

#[rstest]
fn absent_fields_cache_as_empty_hits(table: TableRef, store: StubStore) {
    store.insert_record(Record::new(RecordId::from("recA"), HashMap::new()));
    let mut cache = LinkCache::new();

    for _ in 0..2 {
        let resolved = block_on_for_tests(resolve_linked_field(
            &store,
            &table,
            &RecordId::from("recA"),
            "CODE",
            &mut cache,
        ));
        assert_eq!(resolved, None);
    }

    assert_eq!(store.get_record_count(), 1);
}

#[rstest]
fn failed_resolution_is_soft_and_uncached(table: TableRef, store: StubStore) {
    let mut cache = LinkCache::new();

    for _ in 0..2 {
        let resolved = block_on_for_tests(resolve_linked_field(
            &store,
            &table,
            &RecordId::from("recMissing"),
            "CODE",
            &mut cache,
        ));
        assert_eq!(resolved, None);
    }

    // Failures are retried, not cached.
    assert_eq!(store.get_record_count(), 2);
    assert!(cache.is_empty());
}

// --- Batch uploader ---

#[rstest]
fn uploads_in_batches_of_ten(table: TableRef, store: StubStore) {
    let frame = single_column_frame(23);
    let options = UploadOptions::new().with_pacing(Duration::ZERO);

    let report = block_on_for_tests(upload_frame(&store, &table, &frame, options));

    assert_eq!(store.batch_sizes(), vec![10, 10, 3]);
    assert_eq!(report.records, 23);
    assert_eq!(report.batches, 3);
    assert!(report.is_complete());
}

#[rstest]
fn upload_paces_every_batch(table: TableRef, store: StubStore) {
    let frame = single_column_frame(23);
    let pacing = Duration::from_millis(10);
    let options = UploadOptions::new().with_pacing(pacing);

    let start = Instant::now();
    let report = block_on_for_tests(upload_frame(&store, &table, &frame, options));

    // Three batches, each followed by the pacing pause.
    assert!(start.elapsed() >= pacing * 3);
    assert_eq!(report.batches, 3);
}

#[rstest]
fn one_rejected_batch_never_blocks_the_rest(table: TableRef, store: StubStore) {
    store.push_create_response(Ok(()));
    store.push_create_response(Err(422));
    let frame = single_column_frame(23);
    let options = UploadOptions::new().with_pacing(Duration::ZERO);

    let report = block_on_for_tests(upload_frame(&store, &table, &frame, options));

    assert_eq!(store.batch_sizes(), vec![10, 10, 3]);
    assert_eq!(report.failures.len(), 1);
    let failure = report.failures.first().expect("one failure should remain");
    assert_eq!(failure.batch_index, 1);
    assert_eq!(failure.status, Some(422));
}

#[rstest]
fn upload_without_geometry_column_is_identical_either_way(table: TableRef) {
    let with_geometry = {
        let mut frame = Frame::new(["eco_id", "geometry"]);
        frame
            .push_row(vec![
                Value::Number(1.0),
                Value::Geometry(Box::new(geo::Geometry::Point(geo::Point::new(-74.1, 4.6)))),
            ])
            .expect("row should match columns");
        frame
    };
    let without_geometry = single_column_frame(1);

    for frame in [&with_geometry, &without_geometry] {
        let store = StubStore::new();
        let options = UploadOptions::new().with_pacing(Duration::ZERO);
        let report = block_on_for_tests(upload_frame(&store, &table, frame, options));
        assert_eq!(report.batches, 1);
        assert!(report.is_complete());
    }
}

#[rstest]
fn prepare_drops_or_serialises_the_geometry_column() {
    let mut frame = Frame::new(["eco_id", "geometry"]);
    frame
        .push_row(vec![
            Value::Number(1.0),
            Value::Geometry(Box::new(geo::Geometry::Point(geo::Point::new(-74.1, 4.6)))),
        ])
        .expect("row should match columns");

    let dropped = prepare_frame(&frame, false);
    assert!(!dropped.has_column("geometry"));

    let serialised = prepare_frame(&frame, true);
    assert_eq!(
        serialised.cell(0, "geometry"),
        Some(&Value::Text("POINT(-74.1 4.6)".to_owned()))
    );
}

#[rstest]
fn coercion_textualises_everything_the_schema_rejects() {
    assert_eq!(coerce_value(Value::Null), Value::Text(String::new()));
    assert_eq!(coerce_value(Value::Number(2.5)), Value::Number(2.5));
    assert_eq!(coerce_value(Value::Bool(true)), Value::Bool(true));
    let timestamp = chrono::DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
        .expect("timestamp should parse")
        .with_timezone(&chrono::Utc);
    assert_eq!(
        coerce_value(Value::Timestamp(timestamp)),
        Value::Text("2024-05-01T00:00:00Z".to_owned())
    );
    assert_eq!(
        coerce_value(Value::List(vec![Value::Number(1.0)])),
        Value::Text("[1.0]".to_owned())
    );
}

#[rstest]
fn delete_all_purges_before_writing(table: TableRef, store: StubStore) {
    store.push_page_with_records(2, None);
    let frame = single_column_frame(1);
    let options = UploadOptions::new()
        .with_delete_all(true)
        .with_pacing(Duration::ZERO);

    let report = block_on_for_tests(upload_frame(&store, &table, &frame, options));

    assert_eq!(store.delete_count(), 2);
    assert_eq!(report.batches, 1);
    let kinds: Vec<u8> = store
        .calls()
        .iter()
        .map(|call| match call {
            StoreCall::ListPage { .. } => 0,
            StoreCall::DeleteRecord { .. } => 1,
            StoreCall::CreateRecords { .. } => 2,
            _ => 9,
        })
        .collect();
    assert_eq!(kinds, vec![0, 1, 1, 2]);
}

#[rstest]
fn purge_tolerates_individual_delete_failures(table: TableRef, store: StubStore) {
    store.push_page_with_records(2, None);
    store.push_delete_response(Err(500));

    let deleted = block_on_for_tests(purge_table(&store, &table, Duration::ZERO))
        .expect("purge should succeed");

    assert_eq!(deleted, 1);
    assert_eq!(store.delete_count(), 2);
}

// --- Table clearer ---

#[rstest]
fn clearing_empty_tables_triggers_twice_without_retry(store: StubStore) {
    let plots = TableRef::new(BaseId::from("appOut"), TableName::from("plots_out"));
    let logs = TableRef::new(BaseId::from("appOut"), TableName::from("logs_out"));
    let targets = vec![
        webhook_target(&plots, "https://hooks.example/plots_out"),
        webhook_target(&logs, "https://hooks.example/logs_out"),
    ];
    store.push_page(Page::new(Vec::new(), None));
    store.push_page(Page::new(Vec::new(), None));

    let report = block_on_for_tests(clear_tables(&store, &targets, &instant_policy(3)));

    assert_eq!(store.trigger_count(), 4);
    assert_eq!(report.attempts, 1);
    assert_eq!(
        report.cleared,
        vec![TableName::from("plots_out"), TableName::from("logs_out")]
    );
    assert!(report.is_complete());
}

#[rstest]
fn clear_retries_only_the_nonempty_subset(store: StubStore) {
    let plots = TableRef::new(BaseId::from("appOut"), TableName::from("plots_out"));
    let logs = TableRef::new(BaseId::from("appOut"), TableName::from("logs_out"));
    let targets = vec![
        webhook_target(&plots, "https://hooks.example/plots_out"),
        webhook_target(&logs, "https://hooks.example/logs_out"),
    ];
    // Round one: plots_out empties, logs_out still holds a record.
    store.push_page(Page::new(Vec::new(), None));
    store.push_page_with_records(1, None);
    // Round two: logs_out has emptied.
    store.push_page(Page::new(Vec::new(), None));

    let report = block_on_for_tests(clear_tables(&store, &targets, &instant_policy(3)));

    assert_eq!(report.attempts, 2);
    assert!(report.is_complete());
    let triggered: Vec<String> = store
        .calls()
        .iter()
        .filter_map(|call| match call {
            StoreCall::TriggerWebhook { url } => Some(url.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        triggered,
        vec![
            "https://hooks.example/plots_out",
            "https://hooks.example/logs_out",
            "https://hooks.example/plots_out",
            "https://hooks.example/logs_out",
            "https://hooks.example/logs_out",
            "https://hooks.example/logs_out",
        ]
    );
}

#[rstest]
fn clear_gives_up_after_the_attempt_budget(store: StubStore) {
    let plots = TableRef::new(BaseId::from("appOut"), TableName::from("plots_out"));
    let targets = vec![webhook_target(&plots, "https://hooks.example/plots_out")];
    for _ in 0..3 {
        store.push_page_with_records(1, None);
    }

    let report = block_on_for_tests(clear_tables(&store, &targets, &instant_policy(3)));

    assert_eq!(report.attempts, 3);
    assert_eq!(report.unresolved, vec![TableName::from("plots_out")]);
    assert!(!report.is_complete());
    assert_eq!(store.trigger_count(), 6);
}

#[rstest]
fn clearing_nothing_is_a_no_op(store: StubStore) {
    let report = block_on_for_tests(clear_tables(&store, &[], &instant_policy(3)));

    assert_eq!(report.attempts, 0);
    assert!(report.is_complete());
    assert!(store.calls().is_empty());
}

#[rstest]
fn targets_without_webhooks_are_still_verified(store: StubStore) {
    let plots = TableRef::new(BaseId::from("appOut"), TableName::from("plots_out"));
    let targets = vec![ClearTarget::new(plots, None)];
    store.push_page(Page::new(Vec::new(), None));

    let report = block_on_for_tests(clear_tables(&store, &targets, &instant_policy(3)));

    assert_eq!(store.trigger_count(), 0);
    assert!(report.is_complete());
}

// --- End to end ---

#[rstest]
fn fetched_pages_prime_the_resolver(table: TableRef, store: StubStore) {
    store.push_page_with_records(15, Some("c1"));
    store.push_page_with_records(5, None);

    let records = block_on_for_tests(fetch_all_records(&store, &table, None))
        .expect("fetch should succeed");
    assert_eq!(records.len(), 20);
    assert_eq!(store.list_page_count(), 2);

    let mut cache = LinkCache::new();
    cache.prime(&records, "CODE");
    let resolved = block_on_for_tests(resolve_linked_field(
        &store,
        &table,
        &RecordId::from("rec0"),
        "CODE",
        &mut cache,
    ));

    assert_eq!(resolved, Some(Value::Text("code-0".to_owned())));
    assert_eq!(store.get_record_count(), 0);
}

#[rstest]
fn page_token_round_trips_opaquely() {
    let token = PageToken::from("itrAbc/recXYZ==");
    assert_eq!(token.as_ref(), "itrAbc/recXYZ==");
    assert_eq!(token.to_string(), "itrAbc/recXYZ==");
}
