//! Wire-format types for the remote table API.
//!
//! Listings return `{"records": [{"id", "fields"}], "offset"?}`; the
//! `offset` continuation token is opaque and its absence ends pagination.
//! Writes post `{"records": [{"fields"}]}` with at most ten records.

use serde::{Deserialize, Serialize};

use verdant_core::{Page, PageToken, Record, RecordId, Value};

/// Field map of one wire record.
pub type JsonFields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
pub(crate) struct ListRecordsResponse {
    #[serde(default)]
    pub records: Vec<WireRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}

impl ListRecordsResponse {
    pub fn into_page(self) -> Page {
        let records = self
            .records
            .into_iter()
            .map(WireRecord::into_record)
            .collect();
        Page::new(records, self.offset.map(PageToken::new))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRecord {
    pub id: String,
    #[serde(default)]
    pub fields: JsonFields,
}

impl WireRecord {
    pub fn into_record(self) -> Record {
        Record::new(RecordId::new(self.id), convert_fields(self.fields))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SingleRecordResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: JsonFields,
}

impl SingleRecordResponse {
    /// Build a [`Record`], falling back to the requested id when the
    /// response omits its own.
    pub fn into_record(self, requested: &RecordId) -> Record {
        let id = self
            .id
            .map_or_else(|| requested.clone(), RecordId::new);
        Record::new(id, convert_fields(self.fields))
    }
}

fn convert_fields(fields: JsonFields) -> std::collections::HashMap<String, Value> {
    fields
        .into_iter()
        .map(|(name, value)| (name, Value::from_json(value)))
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRecordsBody<'a> {
    pub records: Vec<CreateRecord<'a>>,
}

impl<'a> CreateRecordsBody<'a> {
    pub fn new(rows: &'a [JsonFields]) -> Self {
        Self {
            records: rows
                .iter()
                .map(|fields| CreateRecord { fields })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRecord<'a> {
    pub fields: &'a JsonFields,
}
