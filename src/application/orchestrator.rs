use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::application::jobs::{job_for, JobContext, JobStats};
use crate::application::monitoring::{MonitoringDataSource, PerfReport};
use crate::application::splitter::FileSplitter;
use crate::domain::error::MigrationError;
use crate::domain::fingerprint::file_fingerprint;
use crate::domain::group::TableGroup;
use crate::domain::ports::{Connector, DataSource, OutputWriter, StatementSink};
use crate::domain::report::{run_dir_name, ExportReport, GroupReport, GroupStatus, ProducedFile};
use crate::domain::value_objects::TablePrefix;
use crate::infrastructure::config::{DbConfig, ExportConfig};
use crate::infrastructure::fs::create_run_dir;

/// Everything one export run needs.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub source: DbConfig,
    pub dst_prefix: TablePrefix,
    pub settings: ExportConfig,
    /// Parent of the timestamped run directory.
    pub output_root: PathBuf,
}

/// Runs one job per selected group with bounded parallelism.
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    perf: Arc<Mutex<PerfReport>>,
}

impl Orchestrator {
    pub fn new(connector: Arc<dyn Connector>, perf: Arc<Mutex<PerfReport>>) -> Self {
        Self { connector, perf }
    }

    /// Progress output: one directory per group under a fresh
    /// `export_<timestamp>` run directory.
    ///
    /// Only failing to create the run directory aborts the run; a group that
    /// fails is reported as such and its siblings carry on.
    pub async fn export(&self, plan: ExportPlan) -> Result<ExportReport, MigrationError> {
        let generated_at = Local::now();
        let run_dir = create_run_dir(&plan.output_root, &run_dir_name(generated_at))
            .map_err(|e| MigrationError::fs(&plan.output_root, e))?;
        info!("Exporting to {}", run_dir.display());

        let mut report = ExportReport::new(
            plan.settings.mode,
            &plan.source.dbname,
            Some(run_dir.clone()),
        );
        let groups = plan.settings.select.groups();
        let semaphore = Arc::new(Semaphore::new(plan.settings.parallelism.max(1)));
        let plan = Arc::new(plan);

        let mut handles = Vec::with_capacity(groups.len());
        for group in groups {
            // Permits are taken here, in submission order, so a parallelism
            // of 1 runs the jobs strictly one after another.
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    report.groups.push(GroupReport::failed(group, e.to_string()));
                    continue;
                }
            };
            let connector = Arc::clone(&self.connector);
            let perf = Arc::clone(&self.perf);
            let plan = Arc::clone(&plan);
            let dir = group_dir(&run_dir, group);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_to_dir(connector, perf, &plan, group, dir, generated_at).await
            });
            handles.push((group, handle));
        }

        for (group, handle) in handles {
            let group_report = match handle.await {
                Ok(r) => r,
                Err(e) => GroupReport::failed(group, format!("job panicked: {}", e)),
            };
            log_completion(&group_report);
            report.groups.push(group_report);
        }
        Ok(report)
    }

    /// Direct output: every group, in order, into one sink. Nothing is
    /// written to disk.
    pub async fn export_stream(&self, plan: ExportPlan, sink: &mut dyn StatementSink) -> ExportReport {
        let generated_at = Local::now();
        let mut report = ExportReport::new(plan.settings.mode, &plan.source.dbname, None);

        for group in plan.settings.select.groups() {
            let start = Instant::now();
            let before = sink.bytes_written();
            let result = match self.open_source(&plan.source).await {
                Ok(source) => {
                    let ctx = context(&plan, Arc::clone(&source), generated_at);
                    let result = job_for(group).run(&ctx, sink).await;
                    source.close().await;
                    result
                }
                Err(e) => Err(e),
            };
            let mut group_report = group_report(group, result, Vec::new(), start);
            group_report.bytes = sink.bytes_written() - before;
            log_completion(&group_report);
            report.groups.push(group_report);
        }

        if let Err(e) = sink.finish() {
            error!("Failed to flush output stream: {}", e);
        }
        report
    }

    async fn open_source(&self, cfg: &DbConfig) -> Result<Arc<dyn DataSource>, MigrationError> {
        open_source(self.connector.as_ref(), &self.perf, cfg).await
    }
}

async fn open_source(
    connector: &dyn Connector,
    perf: &Arc<Mutex<PerfReport>>,
    cfg: &DbConfig,
) -> Result<Arc<dyn DataSource>, MigrationError> {
    let inner = connector
        .connect(cfg)
        .await
        .map_err(|e| MigrationError::connection(cfg.describe(), &e))?;
    Ok(Arc::new(MonitoringDataSource::new(inner, Arc::clone(perf))))
}

fn context(
    plan: &ExportPlan,
    source: Arc<dyn DataSource>,
    generated_at: chrono::DateTime<Local>,
) -> JobContext {
    JobContext {
        source,
        source_db: plan.source.dbname.clone(),
        src_prefix: plan.source.prefix.clone(),
        dst_prefix: plan.dst_prefix.clone(),
        mode: plan.settings.mode,
        page_size: plan.settings.page_size,
        selection: plan.settings.select.clone(),
        generated_at,
    }
}

/// One group job with its own connection and directory.
async fn run_to_dir(
    connector: Arc<dyn Connector>,
    perf: Arc<Mutex<PerfReport>>,
    plan: &ExportPlan,
    group: TableGroup,
    dir: PathBuf,
    generated_at: chrono::DateTime<Local>,
) -> GroupReport {
    let start = Instant::now();

    let source = match open_source(connector.as_ref(), &perf, &plan.source).await {
        Ok(s) => s,
        Err(e) => return group_report(group, Err(e), Vec::new(), start),
    };

    let mut splitter = match FileSplitter::new(&dir, plan.settings.max_file_size) {
        Ok(s) => s,
        Err(e) => {
            source.close().await;
            return group_report(group, Err(e), Vec::new(), start);
        }
    };

    let ctx = context(plan, Arc::clone(&source), generated_at);
    let mut result = job_for(group).run(&ctx, &mut splitter).await;
    let files = match splitter.finish() {
        Ok(files) => files,
        Err(e) => {
            if result.is_ok() {
                result = Err(e);
            }
            Vec::new()
        }
    };
    source.close().await;

    group_report(group, result, produced_files(&files), start)
}

fn produced_files(paths: &[PathBuf]) -> Vec<ProducedFile> {
    paths
        .iter()
        .map(|p| ProducedFile {
            path: p.clone(),
            bytes: fs::metadata(p).map(|m| m.len()).unwrap_or(0),
            sha256: None,
        })
        .collect()
}

fn group_report(
    group: TableGroup,
    result: Result<JobStats, MigrationError>,
    files: Vec<ProducedFile>,
    start: Instant,
) -> GroupReport {
    let mut report = match result {
        Ok(stats) => GroupReport {
            group,
            status: GroupStatus::Completed,
            files: Vec::new(),
            rows: stats.rows,
            statements: stats.statements,
            bytes: 0,
            warnings: stats.warnings,
            duration_ms: 0,
        },
        Err(e) => GroupReport::failed(group, e.to_string()),
    };
    report.bytes = files.iter().map(|f| f.bytes).sum();
    report.files = files;
    report.duration_ms = start.elapsed().as_millis();
    report
}

fn log_completion(r: &GroupReport) {
    match &r.status {
        GroupStatus::Completed => info!(
            group = %r.group,
            files = r.files.len(),
            statements = r.statements,
            warnings = r.warnings.len(),
            duration_ms = r.duration_ms as u64,
            "group export completed"
        ),
        GroupStatus::Failed { error } => {
            error!(group = %r.group, "group export failed: {}", error)
        }
    }
}

/// Fill in file fingerprints and write the run manifest at the run root.
pub fn write_manifest(
    report: &mut ExportReport,
    writer: &dyn OutputWriter,
) -> Result<Option<PathBuf>, MigrationError> {
    let Some(root) = report.root_dir.clone() else {
        return Ok(None);
    };
    for group in report.groups.iter_mut() {
        for file in group.files.iter_mut() {
            match file_fingerprint(&file.path) {
                Ok(fp) => file.sha256 = Some(fp.0),
                Err(e) => warn!("Cannot fingerprint {}: {}", file.path.display(), e),
            }
        }
    }
    let content = writer
        .format(report)
        .map_err(|e| MigrationError::InvalidInput(format!("manifest: {:#}", e)))?;
    let path = root.join(writer.file_name());
    fs::write(&path, content).map_err(|e| MigrationError::fs(&path, e))?;
    Ok(Some(path))
}

/// Directory a group writes to inside a run directory.
pub fn group_dir(run_dir: &Path, group: TableGroup) -> PathBuf {
    run_dir.join(group.dir_name())
}
