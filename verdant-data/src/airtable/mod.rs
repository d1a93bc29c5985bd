//! Synchronization engine for the Airtable Web API.
//!
//! The module isolates the wire protocol behind the [`TableStore`] trait and
//! builds the four synchronization primitives on top of it: the paginated
//! fetcher, the linked-record resolver, the paced batch uploader, and the
//! bounded trigger-and-verify table clearer. [`AirtableAdapter`] composes
//! them into the [`verdant_core::DataAdapter`] contract.
#![forbid(unsafe_code)]

mod adapter;
mod clear;
mod error;
mod fetch;
mod resolve;
mod source;
mod types;
mod upload;
mod wire;

#[doc(hidden)]
pub mod test_support;

pub use adapter::AirtableAdapter;
pub use clear::{clear_tables, purge_table};
pub use error::{StoreBuildError, TransportError};
pub use fetch::fetch_all_records;
pub use resolve::{link_target, resolve_linked_field};
pub use source::{DEFAULT_API_BASE_URL, HttpTableStore, TableStore};
pub use types::{
    ApiBaseUrl, BaseId, ClearPolicy, ClearTarget, DEFAULT_CLEAR_ATTEMPTS, DEFAULT_CLEAR_COOLDOWN,
    DEFAULT_CLEAR_SETTLE, DEFAULT_PACING, MAX_BATCH_LEN, TableRef, UploadOptions, ViewId,
    WebhookUrl,
};
pub use upload::{GEOMETRY_COLUMN, upload_frame};
pub use wire::JsonFields;

#[cfg(test)]
mod tests;
