//! [`DataAdapter`] implementation over the remote table service.

use std::collections::BTreeMap;
use std::fs::File;
use std::time::Duration;

use async_trait::async_trait;

use verdant_core::{
    AdapterError, ClearReport, DataAdapter, Frame, LandMirrorDirs, LinkCache, RecordId, TableName,
    UploadReport, Value,
};

use crate::{attachments, config::SyncConfig, observations};

use super::clear;
use super::error::StoreBuildError;
use super::fetch::fetch_all_records;
use super::resolve::{self, link_target};
use super::source::{HttpTableStore, TableStore};
use super::types::{ClearPolicy, ClearTarget, DEFAULT_PACING, TableRef, UploadOptions};
use super::upload::upload_frame;

const PLOT_ID_FIELD: &str = "plot_id";
const SHAPEFILE_FIELD: &str = "shapefile_polygon";
const AREA_CERTIFIER_FIELD: &str = "area_certifier";
const POD_FIELD: &str = "POD";
const POD_CODE_FIELD: &str = "CODE";
const PROJECT_FIELD: &str = "project_biodiversity";
const PROJECT_ID_FIELD: &str = "project_id";

/// Adapter driving the remote table service.
///
/// Holds one store per credential: the source store reads the land-plot and
/// observation bases, the results store writes calculation output, logs, and
/// clears. All caches are call-scoped; the adapter itself owns no mutable
/// state, so a single sequential client can drive it safely.
#[derive(Debug)]
pub struct AirtableAdapter<S> {
    config: SyncConfig,
    source: S,
    results: S,
    pacing: Duration,
    clear_policy: ClearPolicy,
}

impl AirtableAdapter<HttpTableStore> {
    /// Build an adapter with HTTP stores for both configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn from_config(config: SyncConfig) -> Result<Self, StoreBuildError> {
        let mut source = HttpTableStore::new(&*config.credentials.source_token)?;
        let mut results = HttpTableStore::new(&*config.credentials.results_token)?;
        if let Some(base_url) = &config.api_base_url {
            source = source.with_base_url(&**base_url);
            results = results.with_base_url(&**base_url);
        }
        Ok(Self::with_stores(config, source, results))
    }
}

impl<S: TableStore> AirtableAdapter<S> {
    /// Build an adapter over explicit stores (used by tests and gateways).
    pub fn with_stores(config: SyncConfig, source: S, results: S) -> Self {
        Self {
            config,
            source,
            results,
            pacing: DEFAULT_PACING,
            clear_policy: ClearPolicy::default(),
        }
    }

    /// Override the pacing interval between paced writes.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Override the table-clear policy.
    #[must_use]
    pub fn with_clear_policy(mut self, clear_policy: ClearPolicy) -> Self {
        self.clear_policy = clear_policy;
        self
    }
}

#[async_trait(?Send)]
impl<S: TableStore> DataAdapter for AirtableAdapter<S> {
    async fn fetch_land_plots(&self, dirs: &LandMirrorDirs) -> Result<Frame, AdapterError> {
        let binding = &self.config.land_table;
        let table = binding.table_ref();
        let view = binding.view_id();
        let records = fetch_all_records(&self.source, &table, view.as_ref()).await?;

        attachments::reset_dir(&dirs.kml_dir)?;
        attachments::reset_dir(&dirs.shapefile_dir)?;

        // The linked PODs and projects live in the land table itself, which
        // was just fetched exhaustively; priming avoids refetching them.
        let mut pod_cache = LinkCache::new();
        pod_cache.prime(&records, POD_CODE_FIELD);
        let mut project_cache = LinkCache::new();
        project_cache.prime(&records, PROJECT_ID_FIELD);

        let mut frame = Frame::new([
            PLOT_ID_FIELD,
            POD_FIELD,
            PROJECT_FIELD,
            AREA_CERTIFIER_FIELD,
        ]);
        let mut processed = 0_usize;
        let mut kml_count = 0_usize;
        let mut shapefile_count = 0_usize;

        for record in &records {
            let kml_url = record
                .field(&binding.attachment_field)
                .and_then(attachments::attachment_url);
            let shapefile_url = record
                .field(SHAPEFILE_FIELD)
                .and_then(attachments::attachment_url);
            if kml_url.is_none() && shapefile_url.is_none() {
                continue;
            }
            processed += 1;
            let plot_id = pad_plot_id(record.field(PLOT_ID_FIELD));

            if let Some(url) = kml_url {
                attachments::mirror_kml(&self.source, url, &dirs.kml_dir, &plot_id).await?;
                kml_count += 1;
                log::info!("downloaded KML for plot {plot_id}");
            }
            if let Some(url) = shapefile_url {
                let extracted = attachments::mirror_shapefile(
                    &self.source,
                    url,
                    &dirs.shapefile_dir,
                    &plot_id,
                )
                .await?;
                if extracted.is_none() {
                    // Corrupt archive: the record contributes no metadata.
                    continue;
                }
                shapefile_count += 1;
                log::info!("downloaded and extracted shapefile for plot {plot_id}");
            }

            let pod = linked_text(
                &self.source,
                &table,
                record.field(POD_FIELD),
                POD_CODE_FIELD,
                &mut pod_cache,
            )
            .await;
            let project = linked_text(
                &self.source,
                &table,
                record.field(PROJECT_FIELD),
                PROJECT_ID_FIELD,
                &mut project_cache,
            )
            .await;
            let area = record
                .field(AREA_CERTIFIER_FIELD)
                .cloned()
                .filter(|value| !value.is_null())
                .unwrap_or(Value::Number(0.0));
            frame.push_row(vec![
                Value::Text(plot_id),
                Value::Text(pod),
                Value::Text(project),
                area,
            ])?;
        }

        let file = File::create(&dirs.metadata_csv).map_err(|err| AdapterError::Artefact {
            path: dirs.metadata_csv.clone(),
            message: err.to_string(),
        })?;
        frame.write_csv(file)?;

        self.log_event(
            "Unique PODs found:",
            &format!("{:?}", value_counts(&frame, POD_FIELD)),
        )
        .await?;
        self.log_event(
            "Unique Project Biodiversity found:",
            &format!("{:?}", value_counts(&frame, PROJECT_FIELD)),
        )
        .await?;
        self.log_event(
            "Total records with KML or shapefile:",
            &processed.to_string(),
        )
        .await?;
        self.log_event("Total KMLs downloaded:", &kml_count.to_string())
            .await?;
        self.log_event("Total shapefiles downloaded:", &shapefile_count.to_string())
            .await?;

        Ok(frame)
    }

    async fn fetch_observations(&self) -> Result<Frame, AdapterError> {
        let binding = &self.config.observations_table;
        let table = binding.table_ref();
        let view = binding.view_id();
        let records = fetch_all_records(&self.source, &table, view.as_ref()).await?;
        let report = observations::derive_observations(&self.source, &table, &records).await?;
        for stage in &report.stages {
            self.log_event(&stage.label, &stage.detail).await?;
        }
        Ok(report.frame)
    }

    async fn upload_results(
        &self,
        frame: &Frame,
        table: &TableName,
        insert_geo: bool,
        delete_all: bool,
    ) -> Result<UploadReport, AdapterError> {
        let destination = self.config.results_table_ref(table);
        let options = UploadOptions::new()
            .with_insert_geo(insert_geo)
            .with_delete_all(delete_all)
            .with_pacing(self.pacing);
        Ok(upload_frame(&self.results, &destination, frame, options).await)
    }

    async fn log_event(&self, event: &str, info: &str) -> Result<(), AdapterError> {
        let mut frame = Frame::new(["Event", "Info"]);
        frame.push_row(vec![
            Value::Text(event.to_owned()),
            Value::Text(info.to_owned()),
        ])?;
        let log_table = TableName::new(&*self.config.log_table);
        self.upload_results(&frame, &log_table, false, false).await?;
        Ok(())
    }

    async fn clear_tables(&self, tables: &[TableName]) -> Result<ClearReport, AdapterError> {
        let targets: Vec<ClearTarget> = tables
            .iter()
            .map(|name| {
                ClearTarget::new(
                    self.config.results_table_ref(name),
                    self.config.delete_webhook(name),
                )
            })
            .collect();
        Ok(clear::clear_tables(&self.results, &targets, &self.clear_policy).await)
    }

    async fn fetch_area_certifiers(&self) -> Result<Frame, AdapterError> {
        let binding = &self.config.land_table;
        let table = binding.table_ref();
        let view = binding.view_id();
        let records = fetch_all_records(&self.source, &table, view.as_ref()).await?;
        let mut frame = Frame::new([PLOT_ID_FIELD, AREA_CERTIFIER_FIELD]);
        for record in &records {
            let plot = filled_or_zero(record.field(PLOT_ID_FIELD));
            let area = filled_or_zero(record.field(AREA_CERTIFIER_FIELD));
            frame.push_row(vec![plot, area])?;
        }
        Ok(frame)
    }

    async fn resolve_linked_field(
        &self,
        record_id: &RecordId,
        field_name: &str,
        cache: &mut LinkCache,
    ) -> Result<Option<Value>, AdapterError> {
        let table = self.config.land_table.table_ref();
        Ok(resolve::resolve_linked_field(&self.source, &table, record_id, field_name, cache).await)
    }
}

/// Zero-pad a plot id to the three-character form used by file names and
/// metadata alike.
fn pad_plot_id(value: Option<&Value>) -> String {
    let raw = value.map_or_else(String::new, ToString::to_string);
    format!("{raw:0>3}")
}

/// Resolve a link field to the text of one of its record's fields.
async fn linked_text<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    link: Option<&Value>,
    field: &str,
    cache: &mut LinkCache,
) -> String {
    let Some(id) = link_target(link) else {
        return String::new();
    };
    resolve::resolve_linked_field(store, table, &id, field, cache)
        .await
        .map_or_else(String::new, |value| value.to_string())
}

/// Distinct values of a column with their occurrence counts.
fn value_counts(frame: &Frame, column: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    if let Some(values) = frame.column_values(column) {
        for value in values {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn filled_or_zero(value: Option<&Value>) -> Value {
    value
        .cloned()
        .filter(|value| !value.is_null())
        .unwrap_or(Value::Number(0.0))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::super::test_support::{StoreCall, StubStore, block_on_for_tests};
    use super::*;
    use verdant_core::Record;

    #[fixture]
    fn config() -> SyncConfig {
        serde_json::from_value(serde_json::json!({
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
        }))
        .expect("test configuration should deserialise")
    }

    fn adapter(
        config: SyncConfig,
        source: StubStore,
        results: StubStore,
    ) -> AirtableAdapter<StubStore> {
        AirtableAdapter::with_stores(config, source, results)
            .with_pacing(Duration::ZERO)
            .with_clear_policy(
                ClearPolicy::new()
                    .with_max_attempts(2)
                    .with_settle(Duration::ZERO)
                    .with_cooldown(Duration::ZERO),
            )
    }

    fn attachment(url: &str) -> Value {
        Value::List(vec![Value::Object(BTreeMap::from([(
            "url".to_owned(),
            Value::Text(url.to_owned()),
        )]))])
    }

    fn land_record(id: &str, fields: Vec<(&str, Value)>) -> Record {
        Record::new(
            RecordId::from(id),
            fields
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        )
    }

    #[rstest]
    fn land_plots_mirror_resolve_and_log(config: SyncConfig) {
        let source = StubStore::new();
        source.set_attachment("https://files.example/7.kml", b"<kml/>".to_vec());
        source.insert_record(land_record(
            "recPod",
            vec![("CODE", Value::Text("POD-A".to_owned()))],
        ));
        source.insert_record(land_record(
            "recProj",
            vec![("project_id", Value::Text("proj-1".to_owned()))],
        ));
        let plot = land_record(
            "recPlot",
            vec![
                ("plot_id", Value::Number(7.0)),
                ("kml_file", attachment("https://files.example/7.kml")),
                ("POD", Value::List(vec![Value::Text("recPod".to_owned())])),
                (
                    "project_biodiversity",
                    Value::List(vec![Value::Text("recProj".to_owned())]),
                ),
                ("area_certifier", Value::Number(12.0)),
            ],
        );
        let bare = land_record("recBare", vec![("plot_id", Value::Number(8.0))]);
        source.push_page(verdant_core::Page::new(vec![plot, bare], None));

        let results = StubStore::new();
        let temp = TempDir::new().expect("temp dir should create");
        let dirs = LandMirrorDirs::under(temp.path());
        let sync = adapter(config, source, results);

        let frame =
            block_on_for_tests(sync.fetch_land_plots(&dirs)).expect("land fetch should succeed");

        // Only the attachment-bearing record contributes metadata.
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.cell(0, "plot_id"), Some(&Value::Text("007".to_owned())));
        assert_eq!(frame.cell(0, "POD"), Some(&Value::Text("POD-A".to_owned())));
        assert_eq!(
            frame.cell(0, "project_biodiversity"),
            Some(&Value::Text("proj-1".to_owned()))
        );
        assert_eq!(frame.cell(0, "area_certifier"), Some(&Value::Number(12.0)));
        assert!(dirs.kml_dir.join("007.kml").exists());
        assert!(dirs.metadata_csv.exists());

        // Five stage events land in the log table, one batch each.
        let log_batches = sync
            .results
            .calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::CreateRecords { .. }))
            .count();
        assert_eq!(log_batches, 5);
    }

    #[rstest]
    fn log_events_upload_the_two_column_shape(config: SyncConfig) {
        let results = StubStore::new();
        let sync = adapter(config, StubStore::new(), results);

        block_on_for_tests(sync.log_event("Observations used:", "42"))
            .expect("logging should succeed");

        let calls = sync.results.calls();
        assert_eq!(calls.len(), 1);
        match calls.first() {
            Some(StoreCall::CreateRecords { table, len, columns }) => {
                assert_eq!(table, "appResults/Logs");
                assert_eq!(*len, 1);
                assert_eq!(columns, &["Event".to_owned(), "Info".to_owned()]);
            }
            other => panic!("expected a batch write, got {other:?}"),
        }
    }

    #[rstest]
    fn clear_uses_configured_webhooks_and_tolerates_missing_ones(config: SyncConfig) {
        let results = StubStore::new();
        results.push_page(verdant_core::Page::new(Vec::new(), None));
        results.push_page(verdant_core::Page::new(Vec::new(), None));
        let sync = adapter(config, StubStore::new(), results);

        let report = block_on_for_tests(
            sync.clear_tables(&[TableName::from("plots_out"), TableName::from("mystery")]),
        )
        .expect("clear should succeed");

        assert!(report.is_complete());
        // Only the configured table has a trigger; the other is verified only.
        assert_eq!(sync.results.trigger_count(), 2);
    }

    #[rstest]
    fn area_certifiers_fill_missing_values_with_zero(config: SyncConfig) {
        let source = StubStore::new();
        source.push_page(verdant_core::Page::new(
            vec![
                land_record(
                    "rec1",
                    vec![
                        ("plot_id", Value::Number(7.0)),
                        ("area_certifier", Value::Number(1.5)),
                    ],
                ),
                land_record("rec2", vec![("plot_id", Value::Number(8.0))]),
            ],
            None,
        ));
        let sync = adapter(config, source, StubStore::new());

        let frame = block_on_for_tests(sync.fetch_area_certifiers())
            .expect("area fetch should succeed");

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.cell(0, "area_certifier"), Some(&Value::Number(1.5)));
        assert_eq!(frame.cell(1, "area_certifier"), Some(&Value::Number(0.0)));
    }

    #[rstest]
    fn upload_results_targets_the_results_base(config: SyncConfig) {
        let results = StubStore::new();
        let sync = adapter(config, StubStore::new(), results);
        let mut frame = Frame::new(["eco_id"]);
        frame
            .push_row(vec![Value::Number(1.0)])
            .expect("row should match columns");

        let report = block_on_for_tests(sync.upload_results(
            &frame,
            &TableName::from("plots_out"),
            false,
            false,
        ))
        .expect("upload should succeed");

        assert!(report.is_complete());
        match sync.results.calls().first() {
            Some(StoreCall::CreateRecords { table, .. }) => {
                assert_eq!(table, "appResults/plots_out");
            }
            other => panic!("expected a batch write, got {other:?}"),
        }
    }
}
