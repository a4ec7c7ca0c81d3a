use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of woo-migrate's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                               |
/// |---------|-----------------|-------------------------------------------|
/// | `Error` | `error`         | `--quiet` / cron jobs                     |
/// | `Info`  | `info`          | Default: page progress, group completion  |
/// | `Debug` | `debug`         | `--verbose`: every query text as well     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise. Logs go
/// to stderr; stdout is reserved for direct-mode SQL.
///
/// Only available with the `cli` feature (pulls in `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "woo_migrate=error",
        LogLevel::Info => "woo_migrate=info",
        LogLevel::Debug => "woo_migrate=debug",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::import::ImportSource;
pub use application::monitoring::PerfReport;
pub use domain::error::MigrationError;
pub use domain::group::{Selection, SelectionFlag, TableGroup};
pub use domain::report::{ExportReport, GroupReport, GroupStatus, ImportReport};
pub use domain::taxonomy::TaxonomyBlock;
pub use domain::value_objects::{OutputMethod, TableName, TablePrefix, WriteMode};
pub use infrastructure::config::{AppConfig, DbConfig, ExportConfig, ImportConfig, OutputConfig};

use crate::application::import::ImportRunner;
use crate::application::monitoring::MonitoringDataSource;
use crate::application::orchestrator::{write_manifest, ExportPlan, Orchestrator};
use crate::application::splitter::StreamSink;
use crate::domain::ports::{Connector, DataSource};
use crate::infrastructure::db::client::MySqlConnector;
use crate::infrastructure::fs::list_run_dirs;
use crate::presentation::writers::json::JsonWriter;

// ─── Public entry points ───

/// Export every selected group from `cfg.source`.
///
/// With the progress output method, files land under a fresh
/// `<output.dir>/export_<timestamp>/` directory together with a
/// `manifest.json`. With the direct method, SQL is streamed to stdout.
///
/// Failed groups are reported inside the [`ExportReport`]; only a run that
/// cannot start at all is an `Err`.
pub async fn export(cfg: &AppConfig) -> Result<(ExportReport, PerfReport)> {
    cfg.validate()?;
    let perf = PerfReport::new();
    let orchestrator = Orchestrator::new(Arc::new(MySqlConnector), Arc::clone(&perf));
    let plan = export_plan(cfg);

    let report = match cfg.export.output_method {
        OutputMethod::Progress => {
            let mut report = orchestrator
                .export(plan)
                .await
                .context("Failed to start export run")?;
            let writer = JsonWriter::with_perf(PerfReport::snapshot(&perf));
            write_manifest(&mut report, &writer).context("Failed to write run manifest")?;
            report
        }
        OutputMethod::Direct => {
            let mut sink = StreamSink::stdout();
            orchestrator.export_stream(plan, &mut sink).await
        }
    };

    Ok((report, PerfReport::snapshot(&perf)))
}

/// Replay exported files into `cfg.destination`.
///
/// Statements run best-effort; failures are counted in the [`ImportReport`].
pub async fn import(cfg: &AppConfig, source: &ImportSource) -> Result<(ImportReport, PerfReport)> {
    let perf = PerfReport::new();
    let dest = connect_destination(&cfg.destination, &MySqlConnector, Arc::clone(&perf)).await?;

    let runner = ImportRunner::new(cfg.import.select.clone());
    let report = runner.run(source, dest.as_ref()).await;
    dest.close().await;

    Ok((report, PerfReport::snapshot(&perf)))
}

/// Import source described by the `[import]` section, if any.
pub fn configured_import_source(cfg: &ImportConfig) -> Option<ImportSource> {
    if !cfg.files.is_empty() {
        return Some(ImportSource::Files(cfg.files.iter().map(PathBuf::from).collect()));
    }
    cfg.from_dir
        .as_ref()
        .map(|d| ImportSource::Directory(PathBuf::from(d)))
}

/// Previous run directories under `output.dir`, newest first.
pub fn list_exports(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let root = Path::new(&cfg.output.dir);
    list_run_dirs(root).with_context(|| format!("Cannot list {}", root.display()))
}

// ─── Private helpers ───────────────────────────────────────────────────────────

fn export_plan(cfg: &AppConfig) -> ExportPlan {
    ExportPlan {
        source: cfg.source.clone(),
        dst_prefix: cfg.destination.prefix.clone(),
        settings: cfg.export.clone(),
        output_root: PathBuf::from(&cfg.output.dir),
    }
}

/// Connect to the destination and wrap it in the monitoring decorator.
async fn connect_destination(
    cfg: &DbConfig,
    connector: &dyn Connector,
    perf: Arc<std::sync::Mutex<PerfReport>>,
) -> Result<Arc<dyn DataSource>> {
    let inner = connector
        .connect(cfg)
        .await
        .map_err(|e| MigrationError::connection(cfg.describe(), &e))?;
    Ok(Arc::new(MonitoringDataSource::new(inner, perf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_files_win_over_directory() {
        let cfg = ImportConfig {
            from_dir: Some("exports/export_1".into()),
            files: vec!["a_products.sql".into()],
            ..ImportConfig::default()
        };
        match configured_import_source(&cfg) {
            Some(ImportSource::Files(f)) => assert_eq!(f, vec![PathBuf::from("a_products.sql")]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_import_source_configured() {
        assert!(configured_import_source(&ImportConfig::default()).is_none());
    }

    #[test]
    fn plan_takes_destination_prefix() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [destination]
            prefix = "wc_"
            [output]
            dir = "out"
            "#,
        )
        .unwrap();
        let plan = export_plan(&cfg);
        assert_eq!(plan.dst_prefix.as_str(), "wc_");
        assert_eq!(plan.output_root, PathBuf::from("out"));
    }

    #[tokio::test]
    async fn refused_destination_is_a_connection_error() {
        use crate::application::testing::MemoryConnector;

        let err = connect_destination(&DbConfig::default(), &MemoryConnector(None), PerfReport::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Connection to root@localhost:3306/"));
    }
}
