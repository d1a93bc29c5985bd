//! Best-effort batched upload of result frames.

use tokio::time::sleep;

use verdant_core::{BatchFailure, Frame, UploadReport, Value};

use super::clear::purge_table;
use super::source::TableStore;
use super::types::{MAX_BATCH_LEN, TableRef, UploadOptions};
use super::wire::JsonFields;

/// Name of the geometry-bearing column a result frame may carry.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Upload a frame to a table in fixed-size, paced batches.
///
/// The frame is prepared first: the geometry column is serialised to
/// well-known text (`insert_geo`) or dropped entirely, and its absence is
/// never an error; timestamps and nested values are coerced to plain text and
/// nulls become empty strings, because the remote schema has no native null.
/// With `delete_all` set the destination table is purged before writing.
///
/// Batches go out in slice order with the pacing pause after each write. A
/// rejected batch is logged and recorded in the returned [`UploadReport`];
/// the remaining batches are still submitted, trading strict consistency
/// for forward progress. Callers decide whether a partial upload is fatal.
pub async fn upload_frame<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    frame: &Frame,
    options: UploadOptions,
) -> UploadReport {
    let prepared = prepare_frame(frame, options.insert_geo);

    if options.delete_all {
        match purge_table(store, table, options.pacing).await {
            Ok(deleted) => log::info!("purged {deleted} records from {table}"),
            Err(err) => log::warn!("failed to purge {table} before upload: {err}"),
        }
    }

    let rows = frame_rows(&prepared);
    let mut failures = Vec::new();
    let mut batches = 0;
    for (batch_index, chunk) in rows.chunks(MAX_BATCH_LEN).enumerate() {
        batches += 1;
        if let Err(err) = store.create_records(table, chunk).await {
            log::warn!("batch {batch_index} upload to {table} failed: {err}");
            failures.push(BatchFailure {
                batch_index,
                status: err.status(),
                message: err.to_string(),
            });
        }
        sleep(options.pacing).await;
    }

    UploadReport {
        records: rows.len(),
        batches,
        failures,
    }
}

/// Apply the outbound transformations to a copy of the frame.
pub(crate) fn prepare_frame(frame: &Frame, insert_geo: bool) -> Frame {
    let mut prepared = frame.clone();
    if insert_geo {
        // A frame without a geometry column uploads unchanged.
        if let Err(err) = prepared.map_column(GEOMETRY_COLUMN, coerce_value) {
            log::debug!("no geometry column to serialise: {err}");
        }
    } else {
        prepared.drop_column(GEOMETRY_COLUMN);
    }
    prepared.map_cells(coerce_value);
    prepared
}

/// Coerce a cell onto the subset the remote schema accepts.
pub(crate) fn coerce_value(value: Value) -> Value {
    match value {
        Value::Null => Value::Text(String::new()),
        Value::Timestamp(_) | Value::List(_) | Value::Object(_) | Value::Geometry(_) => {
            Value::Text(value.to_string())
        }
        other @ (Value::Bool(_) | Value::Number(_) | Value::Text(_)) => other,
    }
}

fn frame_rows(frame: &Frame) -> Vec<JsonFields> {
    frame
        .rows()
        .map(|row| {
            frame
                .columns()
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect()
        })
        .collect()
}
