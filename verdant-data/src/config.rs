//! Configuration model for the sync pipeline.
//!
//! Configuration lives in a JSON file: credentials, table bindings, the
//! results base, and the per-table deletion-trigger endpoints. Loading
//! validates every configured URL up front so a typo fails the run before
//! any network traffic.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use verdant_core::TableName;

use crate::airtable::{BaseId, TableRef, ViewId, WebhookUrl};
use crate::backend::BackendKind;

/// Errors produced while loading the configuration file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration {path:?}: {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The file is not valid JSON for the configuration model.
    #[error("failed to parse configuration {path:?}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// A configured URL does not parse.
    #[error("invalid {what} URL {value:?}: {source}")]
    InvalidUrl {
        /// Which configuration entry held the URL.
        what: String,
        /// The rejected value.
        value: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

/// Bearer credentials for the two remote bases.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Token for the source base holding land plots and observations.
    pub source_token: String,
    /// Token for the results base receiving uploads.
    pub results_token: String,
}

/// Binding of the land-plot table, including its attachment field.
#[derive(Debug, Clone, Deserialize)]
pub struct LandTableBinding {
    /// Base holding the table.
    pub base: String,
    /// Table name or id.
    pub table: String,
    /// Saved view filtering the listing, when configured.
    #[serde(default)]
    pub view: Option<String>,
    /// Field carrying the KML attachment.
    pub attachment_field: String,
}

impl LandTableBinding {
    /// The table addressed within its base.
    #[must_use]
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(BaseId::new(&*self.base), TableName::new(&*self.table))
    }

    /// The saved-view filter, when configured.
    #[must_use]
    pub fn view_id(&self) -> Option<ViewId> {
        self.view.as_deref().map(ViewId::new)
    }
}

/// Binding of a plain source table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableBinding {
    /// Base holding the table.
    pub base: String,
    /// Table name or id.
    pub table: String,
    /// Saved view filtering the listing, when configured.
    #[serde(default)]
    pub view: Option<String>,
}

impl TableBinding {
    /// The table addressed within its base.
    #[must_use]
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(BaseId::new(&*self.base), TableName::new(&*self.table))
    }

    /// The saved-view filter, when configured.
    #[must_use]
    pub fn view_id(&self) -> Option<ViewId> {
        self.view.as_deref().map(ViewId::new)
    }
}

/// Top-level configuration of the sync pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Which backend variant to drive.
    #[serde(default)]
    pub backend: BackendKind,
    /// Override of the remote API endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Bearer credentials.
    pub credentials: Credentials,
    /// Land-plot table binding.
    pub land_table: LandTableBinding,
    /// Observation table binding.
    pub observations_table: TableBinding,
    /// Base receiving result uploads.
    pub results_base: String,
    /// Table receiving structured log events.
    #[serde(default = "default_log_table")]
    pub log_table: String,
    /// Deletion-trigger endpoint per clearable table.
    #[serde(default)]
    pub delete_webhooks: BTreeMap<String, String>,
}

fn default_log_table() -> String {
    "Logs".to_owned()
}

impl SyncConfig {
    /// Load and validate the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, does not parse, or
    /// carries an invalid URL.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate_urls()?;
        Ok(config)
    }

    /// Address a table within the results base.
    #[must_use]
    pub fn results_table_ref(&self, table: &TableName) -> TableRef {
        TableRef::new(BaseId::new(&*self.results_base), table.clone())
    }

    /// The deletion-trigger endpoint of a table, when configured.
    #[must_use]
    pub fn delete_webhook(&self, table: &TableName) -> Option<WebhookUrl> {
        self.delete_webhooks
            .get(table.as_ref())
            .map(|url| WebhookUrl::new(&**url))
    }

    fn validate_urls(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.api_base_url {
            check_url("API base", base_url)?;
        }
        for (table, webhook) in &self.delete_webhooks {
            check_url(&format!("delete webhook for {table}"), webhook)?;
        }
        Ok(())
    }
}

fn check_url(what: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        what: what.to_owned(),
        value: value.to_owned(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write;

    #[fixture]
    fn config_json() -> String {
        serde_json::json!({
            "credentials": {
                "source_token": "pat-source",
                "results_token": "pat-results"
            },
            "land_table": {
                "base": "appLand",
                "table": "land_plots",
                "view": "viwActive",
                "attachment_field": "kml_file"
            },
            "observations_table": {
                "base": "appLand",
                "table": "observations"
            },
            "results_base": "appResults",
            "delete_webhooks": {
                "plots_out": "https://hooks.example/clear/plots_out"
            }
        })
        .to_string()
    }

    #[rstest]
    fn loads_and_applies_defaults(config_json: String) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
        file.write_all(config_json.as_bytes())
            .expect("config should write");
        let config = SyncConfig::load(file.path()).expect("config should load");

        assert_eq!(config.backend, BackendKind::Airtable);
        assert_eq!(config.log_table, "Logs");
        assert_eq!(config.land_table.table_ref().to_string(), "appLand/land_plots");
        assert_eq!(
            config.delete_webhook(&TableName::from("plots_out")),
            Some(WebhookUrl::from("https://hooks.example/clear/plots_out"))
        );
        assert!(config.delete_webhook(&TableName::from("unknown")).is_none());
    }

    #[rstest]
    fn rejects_invalid_webhook_urls(config_json: String) {
        let broken = config_json.replace("https://hooks.example/clear/plots_out", "not a url");
        let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
        file.write_all(broken.as_bytes()).expect("config should write");

        let outcome = SyncConfig::load(file.path());
        assert!(matches!(outcome, Err(ConfigError::InvalidUrl { .. })));
    }

    #[rstest]
    fn missing_file_reports_read_error() {
        let outcome = SyncConfig::load(Path::new("/nonexistent/verdant.json"));
        assert!(matches!(outcome, Err(ConfigError::Read { .. })));
    }
}
