//! The closed set of sync backends.
//!
//! The backend is selected at configuration time from an enumerated set, so
//! an unsupported choice fails when the adapter is built rather than half
//! way through a run. Only the remote table service backend is fully
//! implemented; the relational and generic-REST variants are templates that
//! fail fast with an explicit not-implemented signal on every operation.

mod postgres;
mod rest;

use std::fmt;

use serde::Deserialize;

use verdant_core::DataAdapter;

use crate::airtable::{AirtableAdapter, StoreBuildError};
use crate::config::SyncConfig;

pub use postgres::PostgresAdapter;
pub use rest::RestAdapter;

/// The enumerated backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The remote tabular-database-as-a-service backend.
    #[default]
    Airtable,
    /// Relational-database template backend.
    Postgres,
    /// Generic REST template backend.
    Rest,
}

impl BackendKind {
    /// Stable lowercase name of the variant.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Airtable => "airtable",
            Self::Postgres => "postgres",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the adapter the configuration selects.
///
/// # Errors
///
/// Returns an error if the backend's transport fails to construct.
pub fn build_adapter(config: SyncConfig) -> Result<Box<dyn DataAdapter>, StoreBuildError> {
    match config.backend {
        BackendKind::Airtable => Ok(Box::new(AirtableAdapter::from_config(config)?)),
        BackendKind::Postgres => Ok(Box::new(PostgresAdapter::new())),
        BackendKind::Rest => Ok(Box::new(RestAdapter::new())),
    }
}
