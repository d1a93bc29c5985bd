//! Call-scoped memoisation of linked-record lookups.

use std::collections::HashMap;

use crate::record::{Record, RecordId, Value};

/// Memoises resolved linked-record fields for one resolution pass.
///
/// Entries are keyed by the `(record id, field name)` pair so that two
/// different fields of the same record never collapse onto one slot. A
/// resolved field may legitimately be absent on the remote record; such
/// lookups are cached as `None` so the miss is not refetched. Once written,
/// an entry is never overwritten within the cache's lifetime.
///
/// Caches are created by the caller and threaded through each resolution
/// call; no shared process-wide cache exists.
///
/// # Examples
/// ```
/// # use verdant_core::{LinkCache, RecordId, Value};
/// let mut cache = LinkCache::new();
/// cache.insert(RecordId::new("rec1"), "CODE", Some(Value::Text("POD-A".into())));
/// let hit = cache.lookup(&RecordId::new("rec1"), "CODE");
/// assert_eq!(hit, Some(Some(&Value::Text("POD-A".into()))));
/// assert!(cache.lookup(&RecordId::new("rec1"), "other").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkCache {
    entries: HashMap<(RecordId, String), Option<Value>>,
}

impl LinkCache {
    /// Construct an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached resolution.
    ///
    /// The outer `Option` distinguishes a cache miss from a cached lookup
    /// whose field was absent on the remote record.
    #[must_use]
    pub fn lookup(&self, id: &RecordId, field: &str) -> Option<Option<&Value>> {
        self.entries
            .get(&(id.clone(), field.to_owned()))
            .map(Option::as_ref)
    }

    /// Record a resolution; an already-present entry is left untouched.
    pub fn insert(&mut self, id: RecordId, field: impl Into<String>, value: Option<Value>) {
        self.entries.entry((id, field.into())).or_insert(value);
    }

    /// Pre-load the cache with a field of already-fetched records.
    ///
    /// Linked records frequently live in the very table that was just
    /// fetched exhaustively; priming avoids refetching them one by one.
    pub fn prime(&mut self, records: &[Record], field: &str) {
        for record in records {
            self.insert(record.id().clone(), field, record.field(field).cloned());
        }
    }

    /// Number of cached resolutions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
