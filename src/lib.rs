//! Facade crate for the Verdant sync engine.
//!
//! This crate re-exports the core domain types and, behind the `engine`
//! feature, the remote table backend with its synchronization primitives.

#![forbid(unsafe_code)]

pub use verdant_core::{
    AdapterError, BatchFailure, ClearReport, DataAdapter, Frame, FrameError, LandMirrorDirs,
    LinkCache, Page, PageToken, Record, RecordId, TableName, UploadReport, Value,
};

#[cfg(feature = "engine")]
pub use verdant_data::airtable::{
    AirtableAdapter, ApiBaseUrl, BaseId, ClearPolicy, ClearTarget, HttpTableStore, TableRef,
    TableStore, TransportError, UploadOptions, ViewId, WebhookUrl, clear_tables,
    fetch_all_records, resolve_linked_field, upload_frame,
};

#[cfg(feature = "engine")]
pub use verdant_data::backend::{BackendKind, PostgresAdapter, RestAdapter, build_adapter};

#[cfg(feature = "engine")]
pub use verdant_data::config::SyncConfig;
