//! Memoised dereferencing of linked records.

use verdant_core::{LinkCache, RecordId, Value};

use super::source::TableStore;
use super::types::TableRef;

/// Extract the record id a link field points at.
///
/// Link fields arrive either as a list of record ids (the first one wins)
/// or as a bare id string; an empty or missing field links nothing.
#[must_use]
pub fn link_target(value: Option<&Value>) -> Option<RecordId> {
    let value = value?;
    let id = match value {
        Value::List(items) => items.first()?.as_str()?,
        Value::Text(text) => text,
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }
    Some(RecordId::from(id))
}

/// Resolve one field of a linked record, memoised through `cache`.
///
/// A cache hit answers without a network call; the same foreign id is looked
/// up repeatedly across many local rows, so this is correctness-relevant
/// admission control, not just an optimisation. On a miss the record is
/// fetched once and the field cached under the `(id, field)` compound key;
/// a field that is absent on the remote record is cached as an empty hit so
/// the miss is not refetched.
///
/// Resolution fails softly: a failed fetch is logged and `None` returned so
/// one broken reference never aborts a bulk import. Failed fetches are not
/// cached; a later resolution of the same id may still succeed.
pub async fn resolve_linked_field<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    record_id: &RecordId,
    field_name: &str,
    cache: &mut LinkCache,
) -> Option<Value> {
    if let Some(hit) = cache.lookup(record_id, field_name) {
        return hit.cloned();
    }
    match store.get_record(table, record_id).await {
        Ok(record) => {
            let value = record.field(field_name).cloned();
            cache.insert(record_id.clone(), field_name, value.clone());
            value
        }
        Err(err) => {
            log::warn!("failed to resolve linked record {record_id} in {table}: {err}");
            None
        }
    }
}
