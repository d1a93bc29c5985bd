//! The capability contract every sync backend implements.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::LinkCache;
use crate::frame::{Frame, FrameError};
use crate::record::{RecordId, TableName, Value};

/// Errors surfaced by [`DataAdapter`] operations.
///
/// Write-phase failures are deliberately *not* errors: failed batches and
/// deletes are tolerated per item and reported inside [`UploadReport`] and
/// [`ClearReport`] so the sync keeps making forward progress. Likewise a
/// linked-record fetch that fails resolves to "no value" rather than
/// aborting a bulk import.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// A fetch-phase request failed; the whole operation aborts because a
    /// partial page set would be inconsistent.
    #[error("remote fetch from {url} failed: {message}")]
    Remote {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// Short failure description.
        message: String,
    },
    /// Mirroring an attachment to local storage failed.
    #[error("attachment mirroring failed: {message}")]
    Attachment {
        /// Short failure description including the offending URL or path.
        message: String,
    },
    /// Writing a local artefact (such as the metadata CSV) failed.
    #[error("failed to write artefact {path:?}: {message}")]
    Artefact {
        /// Destination path of the artefact.
        path: PathBuf,
        /// Short failure description.
        message: String,
    },
    /// The adapter configuration is unusable.
    #[error("invalid configuration: {message}")]
    Config {
        /// Short failure description.
        message: String,
    },
    /// A frame transformation failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The selected backend does not implement this operation.
    #[error("{operation} is not implemented for the {backend} backend")]
    NotImplemented {
        /// Name of the backend variant.
        backend: &'static str,
        /// Name of the unimplemented operation.
        operation: &'static str,
    },
}

/// One failed batch write within an otherwise best-effort upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based position of the batch within the upload.
    pub batch_index: usize,
    /// HTTP status, when the server answered at all.
    pub status: Option<u16>,
    /// Short failure description.
    pub message: String,
}

/// Outcome of a best-effort batched upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadReport {
    /// Number of records dispatched.
    pub records: usize,
    /// Number of batches submitted.
    pub batches: usize,
    /// Batches that the remote rejected.
    pub failures: Vec<BatchFailure>,
}

impl UploadReport {
    /// Whether every batch was accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a bounded table-clear cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClearReport {
    /// Tables verified empty.
    pub cleared: Vec<TableName>,
    /// Tables still holding records when the attempt budget ran out.
    pub unresolved: Vec<TableName>,
    /// Number of trigger-and-verify rounds performed.
    pub attempts: usize,
}

impl ClearReport {
    /// Whether every requested table was verified empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Local destinations for the land-plot mirroring pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandMirrorDirs {
    /// Directory receiving one KML file per plot.
    pub kml_dir: PathBuf,
    /// Directory receiving one extracted shapefile archive per plot.
    pub shapefile_dir: PathBuf,
    /// Destination of the land-metadata CSV artefact.
    pub metadata_csv: PathBuf,
}

impl Default for LandMirrorDirs {
    fn default() -> Self {
        Self {
            kml_dir: PathBuf::from("KML"),
            shapefile_dir: PathBuf::from("SHPoriginal"),
            metadata_csv: PathBuf::from("land_metadata.csv"),
        }
    }
}

impl LandMirrorDirs {
    /// Root both mirror directories and the CSV under `base`.
    #[must_use]
    pub fn under(base: &std::path::Path) -> Self {
        Self {
            kml_dir: base.join("KML"),
            shapefile_dir: base.join("SHPoriginal"),
            metadata_csv: base.join("land_metadata.csv"),
        }
    }
}

/// The data-source capability interface.
///
/// A backend exposes the five synchronization operations plus the two
/// single-table fetches the pipeline needs. Implementations are driven by a
/// single sequential client: no operation runs concurrently with another on
/// one adapter instance, and resolution caches are owned by the caller and
/// passed in explicitly.
#[async_trait(?Send)]
pub trait DataAdapter {
    /// Fetch land-plot metadata, mirroring KML and shapefile attachments to
    /// the given local directories and writing the metadata CSV artefact.
    async fn fetch_land_plots(&self, dirs: &LandMirrorDirs) -> Result<Frame, AdapterError>;

    /// Fetch observation records with the domain derivation rules applied.
    async fn fetch_observations(&self) -> Result<Frame, AdapterError>;

    /// Upload a result frame to the named destination table.
    ///
    /// `insert_geo` keeps the geometry column (serialised as well-known
    /// text); otherwise the column is dropped. `delete_all` clears the
    /// destination table before writing.
    async fn upload_results(
        &self,
        frame: &Frame,
        table: &TableName,
        insert_geo: bool,
        delete_all: bool,
    ) -> Result<UploadReport, AdapterError>;

    /// Record a structured event in the remote log table.
    async fn log_event(&self, event: &str, info: &str) -> Result<(), AdapterError>;

    /// Clear the named tables through their deletion triggers and verify
    /// they emptied.
    async fn clear_tables(&self, tables: &[TableName]) -> Result<ClearReport, AdapterError>;

    /// Fetch the per-plot area-certifier table.
    async fn fetch_area_certifiers(&self) -> Result<Frame, AdapterError>;

    /// Resolve one field of a linked record, memoised through `cache`.
    ///
    /// Resolution failures are soft: the error is logged and `Ok(None)` is
    /// returned so a broken reference never aborts a bulk import.
    async fn resolve_linked_field(
        &self,
        record_id: &RecordId,
        field_name: &str,
        cache: &mut LinkCache,
    ) -> Result<Option<Value>, AdapterError>;
}
