//! Command-line interface for the Verdant sync pipeline.
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use verdant_core::{DataAdapter, FrameError, LandMirrorDirs, TableName};
use verdant_data::airtable::StoreBuildError;
use verdant_data::backend::build_adapter;
use verdant_data::config::{ConfigError, SyncConfig};

const ARG_CONFIG: &str = "config";
const ENV_LAND_CONFIG: &str = "VERDANT_CMDS_LAND_CONFIG";
const ENV_OBSERVATIONS_CONFIG: &str = "VERDANT_CMDS_OBSERVATIONS_CONFIG";
const ENV_CLEAR_CONFIG: &str = "VERDANT_CMDS_CLEAR_CONFIG";
const ENV_LOG_CONFIG: &str = "VERDANT_CMDS_LOG_CONFIG";

/// Run the Verdant CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns an error when argument parsing, configuration loading, or the
/// dispatched operation fails.
pub async fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let summary = dispatch(cli.command).await?;
    println!("{summary}");
    Ok(())
}

async fn dispatch(command: Command) -> Result<String, CliError> {
    match command {
        Command::Land(args) => {
            let config = args.into_config()?;
            let adapter = load_adapter(&config.config_path)?;
            run_land(adapter.as_ref(), &config).await
        }
        Command::Observations(args) => {
            let config = args.into_config()?;
            let adapter = load_adapter(&config.config_path)?;
            run_observations(adapter.as_ref(), &config).await
        }
        Command::Clear(args) => {
            let config = args.into_config()?;
            let adapter = load_adapter(&config.config_path)?;
            run_clear(adapter.as_ref(), &config).await
        }
        Command::Log(args) => {
            let config = args.into_config()?;
            let adapter = load_adapter(&config.config_path)?;
            run_log(adapter.as_ref(), &config).await
        }
    }
}

fn load_adapter(config_path: &Path) -> Result<Box<dyn DataAdapter>, CliError> {
    let config = SyncConfig::load(config_path)?;
    Ok(build_adapter(config)?)
}

async fn run_land<A: DataAdapter + ?Sized>(
    adapter: &A,
    config: &LandConfig,
) -> Result<String, CliError> {
    let frame = adapter.fetch_land_plots(&config.dirs).await?;
    Ok(format!(
        "fetched {} land plots; metadata written to {}",
        frame.len(),
        config.dirs.metadata_csv.display()
    ))
}

async fn run_observations<A: DataAdapter + ?Sized>(
    adapter: &A,
    config: &ObservationsConfig,
) -> Result<String, CliError> {
    let frame = adapter.fetch_observations().await?;
    let file = std::fs::File::create(&config.output).map_err(|source| CliError::WriteOutput {
        path: config.output.clone(),
        source,
    })?;
    frame.write_csv(file)?;
    Ok(format!(
        "wrote {} observations to {}",
        frame.len(),
        config.output.display()
    ))
}

async fn run_clear<A: DataAdapter + ?Sized>(
    adapter: &A,
    config: &ClearConfig,
) -> Result<String, CliError> {
    let report = adapter.clear_tables(&config.tables).await?;
    if report.is_complete() {
        Ok(format!(
            "cleared {} tables in {} attempts",
            report.cleared.len(),
            report.attempts
        ))
    } else {
        let stuck: Vec<&str> = report
            .unresolved
            .iter()
            .map(AsRef::as_ref)
            .collect();
        Ok(format!(
            "cleared {} tables; still populated after {} attempts: {}",
            report.cleared.len(),
            report.attempts,
            stuck.join(", ")
        ))
    }
}

async fn run_log<A: DataAdapter + ?Sized>(
    adapter: &A,
    config: &LogConfig,
) -> Result<String, CliError> {
    adapter.log_event(&config.event, &config.info).await?;
    Ok(format!("recorded event {:?}", config.event))
}

#[derive(Debug, Parser)]
#[command(
    name = "verdant",
    about = "Synchronization utilities for the Verdant biodiversity pipeline",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mirror land-plot attachments and fetch their metadata.
    Land(LandArgs),
    /// Fetch and derive the observation table.
    Observations(ObservationsArgs),
    /// Clear destination tables through their deletion triggers.
    Clear(ClearArgs),
    /// Record a structured event in the remote log table.
    Log(LogArgs),
}

/// CLI arguments for the `land` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Mirror land-plot attachments and fetch their metadata")]
#[ortho_config(prefix = "VERDANT")]
struct LandArgs {
    /// Path to the pipeline configuration file.
    #[arg(long = ARG_CONFIG, value_name = "path")]
    #[serde(default)]
    config: Option<PathBuf>,
    /// Directory receiving the mirror directories and metadata CSV.
    #[arg(long = "output-dir", value_name = "path")]
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

impl LandArgs {
    fn into_config(self) -> Result<LandConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let config_path = merged.config.ok_or(CliError::MissingArgument {
            field: ARG_CONFIG,
            env: ENV_LAND_CONFIG,
        })?;
        let dirs = merged
            .output_dir
            .map_or_else(LandMirrorDirs::default, |base| LandMirrorDirs::under(&base));
        Ok(LandConfig { config_path, dirs })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LandConfig {
    config_path: PathBuf,
    dirs: LandMirrorDirs,
}

/// CLI arguments for the `observations` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Fetch and derive the observation table")]
#[ortho_config(prefix = "VERDANT")]
struct ObservationsArgs {
    /// Path to the pipeline configuration file.
    #[arg(long = ARG_CONFIG, value_name = "path")]
    #[serde(default)]
    config: Option<PathBuf>,
    /// Destination CSV for the derived observations.
    #[arg(long = "output", value_name = "path")]
    #[serde(default)]
    output: Option<PathBuf>,
}

impl ObservationsArgs {
    fn into_config(self) -> Result<ObservationsConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let config_path = merged.config.ok_or(CliError::MissingArgument {
            field: ARG_CONFIG,
            env: ENV_OBSERVATIONS_CONFIG,
        })?;
        let output = merged
            .output
            .unwrap_or_else(|| PathBuf::from("observations.csv"));
        Ok(ObservationsConfig {
            config_path,
            output,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ObservationsConfig {
    config_path: PathBuf,
    output: PathBuf,
}

/// CLI arguments for the `clear` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Clear destination tables through their deletion triggers")]
#[ortho_config(prefix = "VERDANT")]
struct ClearArgs {
    /// Path to the pipeline configuration file.
    #[arg(long = ARG_CONFIG, value_name = "path")]
    #[serde(default)]
    config: Option<PathBuf>,
    /// Tables to clear; repeat the flag for each table.
    #[arg(long = "table", value_name = "name")]
    #[serde(default)]
    tables: Option<Vec<String>>,
}

impl ClearArgs {
    fn into_config(self) -> Result<ClearConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let config_path = merged.config.ok_or(CliError::MissingArgument {
            field: ARG_CONFIG,
            env: ENV_CLEAR_CONFIG,
        })?;
        let tables: Vec<TableName> = merged
            .tables
            .unwrap_or_default()
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| TableName::new(&**name))
            .collect();
        if tables.is_empty() {
            return Err(CliError::NoTables);
        }
        Ok(ClearConfig {
            config_path,
            tables,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClearConfig {
    config_path: PathBuf,
    tables: Vec<TableName>,
}

/// CLI arguments for the `log` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Record a structured event in the remote log table")]
#[ortho_config(prefix = "VERDANT")]
struct LogArgs {
    /// Path to the pipeline configuration file.
    #[arg(long = ARG_CONFIG, value_name = "path")]
    #[serde(default)]
    config: Option<PathBuf>,
    /// Event label.
    #[arg(long = "event", value_name = "text")]
    #[serde(default)]
    event: Option<String>,
    /// Event detail.
    #[arg(long = "info", value_name = "text")]
    #[serde(default)]
    info: Option<String>,
}

impl LogArgs {
    fn into_config(self) -> Result<LogConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let config_path = merged.config.ok_or(CliError::MissingArgument {
            field: ARG_CONFIG,
            env: ENV_LOG_CONFIG,
        })?;
        let event = merged.event.ok_or(CliError::MissingEvent)?;
        let info = merged.info.unwrap_or_default();
        Ok(LogConfig {
            config_path,
            event,
            info,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogConfig {
    config_path: PathBuf,
    event: String,
    info: String,
}

/// Errors emitted by the Verdant CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// The missing CLI flag.
        field: &'static str,
        /// The environment variable that can supply it.
        env: &'static str,
    },
    /// The clear subcommand received no tables.
    #[error("no tables to clear (pass --table at least once)")]
    NoTables,
    /// The log subcommand received no event label.
    #[error("missing event label (pass --event)")]
    MissingEvent,
    /// The pipeline configuration file is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The selected backend failed to construct.
    #[error(transparent)]
    Backend(#[from] StoreBuildError),
    /// A sync operation failed.
    #[error(transparent)]
    Adapter(#[from] verdant_core::AdapterError),
    /// Writing the derived CSV failed.
    #[error("failed to write {path:?}: {source}")]
    WriteOutput {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Rendering a frame failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}
