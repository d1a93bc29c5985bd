//! Relational-database backend template.
//!
//! Every operation fails fast with an explicit not-implemented signal; a
//! real implementation would map the contract onto SQL over a connection
//! pool while keeping the same call-scoped cache discipline.

use async_trait::async_trait;

use verdant_core::{
    AdapterError, ClearReport, DataAdapter, Frame, LandMirrorDirs, LinkCache, RecordId, TableName,
    UploadReport, Value,
};

const BACKEND: &str = "postgres";

/// Placeholder adapter for a relational-database destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    /// Construct the template adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn unimplemented_operation(operation: &'static str) -> AdapterError {
    AdapterError::NotImplemented {
        backend: BACKEND,
        operation,
    }
}

#[async_trait(?Send)]
impl DataAdapter for PostgresAdapter {
    async fn fetch_land_plots(&self, _dirs: &LandMirrorDirs) -> Result<Frame, AdapterError> {
        Err(unimplemented_operation("fetch_land_plots"))
    }

    async fn fetch_observations(&self) -> Result<Frame, AdapterError> {
        Err(unimplemented_operation("fetch_observations"))
    }

    async fn upload_results(
        &self,
        _frame: &Frame,
        _table: &TableName,
        _insert_geo: bool,
        _delete_all: bool,
    ) -> Result<UploadReport, AdapterError> {
        Err(unimplemented_operation("upload_results"))
    }

    async fn log_event(&self, _event: &str, _info: &str) -> Result<(), AdapterError> {
        Err(unimplemented_operation("log_event"))
    }

    async fn clear_tables(&self, _tables: &[TableName]) -> Result<ClearReport, AdapterError> {
        Err(unimplemented_operation("clear_tables"))
    }

    async fn fetch_area_certifiers(&self) -> Result<Frame, AdapterError> {
        Err(unimplemented_operation("fetch_area_certifiers"))
    }

    async fn resolve_linked_field(
        &self,
        _record_id: &RecordId,
        _field_name: &str,
        _cache: &mut LinkCache,
    ) -> Result<Option<Value>, AdapterError> {
        Err(unimplemented_operation("resolve_linked_field"))
    }
}
