//! Exhaustive retrieval of paginated listings.

use verdant_core::{PageToken, Record};

use super::error::TransportError;
use super::source::TableStore;
use super::types::{TableRef, ViewId};

/// Fetch every record of a table, following continuation tokens until a
/// page omits one.
///
/// The whole operation aborts on the first failed page request, since a
/// partial page set would be inconsistent. Records accumulate in memory; dataset
/// sizes are assumed bounded by what one table occupies.
///
/// # Errors
///
/// Returns the transport error of the first page request that fails.
///
/// # Examples
/// ```
/// # use verdant_core::TableName;
/// # use verdant_data::airtable::test_support::{StubStore, block_on_for_tests};
/// # use verdant_data::airtable::{BaseId, TableRef, fetch_all_records};
/// let store = StubStore::new();
/// store.push_page_with_records(15, Some("c1"));
/// store.push_page_with_records(5, None);
/// let table = TableRef::new(BaseId::from("appBase"), TableName::from("plots"));
///
/// let records = block_on_for_tests(fetch_all_records(&store, &table, None))
///     .expect("fetch should succeed");
/// assert_eq!(records.len(), 20);
/// ```
pub async fn fetch_all_records<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    view: Option<&ViewId>,
) -> Result<Vec<Record>, TransportError> {
    let mut records = Vec::new();
    let mut offset: Option<PageToken> = None;
    loop {
        let page = store.list_page(table, view, offset.as_ref()).await?;
        records.extend(page.records);
        match page.offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }
    Ok(records)
}
