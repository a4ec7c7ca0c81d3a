use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::group::TableGroup;
use crate::domain::taxonomy::TaxonomyBlock;
use crate::domain::value_objects::WriteMode;

/// Longest statement prefix kept in a failure record.
const PREVIEW_CHARS: usize = 120;

// ─── Statement execution ─────────────────────────────────────────────────────

/// One statement the destination rejected.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatementFailure {
    /// Position of the statement inside its batch.
    pub index: usize,
    /// First characters of the statement.
    pub statement: String,
    pub message: String,
}

impl StatementFailure {
    pub fn new(index: usize, statement: &str, message: impl Into<String>) -> Self {
        Self {
            index,
            statement: statement.chars().take(PREVIEW_CHARS).collect(),
            message: message.into(),
        }
    }
}

/// Result of a best-effort batch execution.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchOutcome {
    pub executed: usize,
    pub failures: Vec<StatementFailure>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.executed += other.executed;
        self.failures.extend(other.failures);
    }

    pub fn attempted(&self) -> usize {
        self.executed + self.failures.len()
    }
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    Completed,
    Failed { error: String },
}

/// One file written by a group job.
#[derive(Debug, Clone, Serialize)]
pub struct ProducedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// SHA-256 of the file content, filled in when the manifest is built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Outcome of one group's export job.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: TableGroup,
    #[serde(flatten)]
    pub status: GroupStatus,
    pub files: Vec<ProducedFile>,
    pub rows: u64,
    pub statements: u64,
    pub bytes: u64,
    /// Stage-level failures that did not stop the job.
    pub warnings: Vec<String>,
    pub duration_ms: u128,
}

impl GroupReport {
    pub fn failed(group: TableGroup, error: impl Into<String>) -> Self {
        GroupReport {
            group,
            status: GroupStatus::Failed {
                error: error.into(),
            },
            files: Vec::new(),
            rows: 0,
            statements: 0,
            bytes: 0,
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == GroupStatus::Completed
    }
}

/// Everything one export run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub run_id: String,
    pub created_at: String,
    pub mode: WriteMode,
    pub source_db: String,
    /// Run directory; `None` for direct (streamed) output.
    pub root_dir: Option<PathBuf>,
    pub groups: Vec<GroupReport>,
}

impl ExportReport {
    pub fn new(mode: WriteMode, source_db: &str, root_dir: Option<PathBuf>) -> Self {
        ExportReport {
            run_id: format!(
                "run_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            ),
            created_at: Utc::now().to_rfc3339(),
            mode,
            source_db: source_db.to_string(),
            root_dir,
            groups: Vec::new(),
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &ProducedFile> {
        self.groups.iter().flat_map(|g| g.files.iter())
    }

    pub fn total_statements(&self) -> u64 {
        self.groups.iter().map(|g| g.statements).sum()
    }

    pub fn failed_groups(&self) -> Vec<TableGroup> {
        self.groups
            .iter()
            .filter(|g| !g.is_ok())
            .map(|g| g.group)
            .collect()
    }
}

/// Name of a run directory: `export_<YYYYmmdd_HHMMSS>`.
pub fn run_dir_name(at: DateTime<Local>) -> String {
    format!("export_{}", at.format("%Y%m%d_%H%M%S"))
}

// ─── Import ──────────────────────────────────────────────────────────────────

/// Replay result for one file (or one raw stream).
#[derive(Debug, Clone, Serialize)]
pub struct FileImport {
    pub group: TableGroup,
    pub path: Option<PathBuf>,
    pub outcome: BatchOutcome,
    /// Taxonomy blocks replayed, in file order.
    pub blocks_replayed: Vec<TaxonomyBlock>,
    /// Taxonomy segments present but not selected.
    pub blocks_skipped: usize,
    /// Text at end of input that never formed a complete statement.
    pub dropped_tail: bool,
}

impl FileImport {
    pub fn new(group: TableGroup, path: Option<PathBuf>) -> Self {
        FileImport {
            group,
            path,
            outcome: BatchOutcome::default(),
            blocks_replayed: Vec::new(),
            blocks_skipped: 0,
            dropped_tail: false,
        }
    }
}

/// Everything one import invocation did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub files: Vec<FileImport>,
    /// Candidate files that matched no requested group.
    pub skipped: Vec<PathBuf>,
    /// Requested groups with no directory or matching file.
    pub missing_groups: Vec<TableGroup>,
    /// Files that could not be read at all.
    pub unreadable: Vec<String>,
    /// Parts whose content no longer matches the run manifest.
    pub checksum_mismatches: Vec<PathBuf>,
}

impl ImportReport {
    pub fn statements_executed(&self) -> usize {
        self.files.iter().map(|f| f.outcome.executed).sum()
    }

    pub fn statements_failed(&self) -> usize {
        self.files.iter().map(|f| f.outcome.failures.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn failure_preview_is_truncated() {
        let long = "x".repeat(500);
        let f = StatementFailure::new(3, &long, "boom");
        assert_eq!(f.statement.chars().count(), PREVIEW_CHARS);
        assert_eq!(f.index, 3);
    }

    #[test]
    fn batch_outcomes_merge() {
        let mut a = BatchOutcome {
            executed: 2,
            failures: vec![],
        };
        a.merge(BatchOutcome {
            executed: 1,
            failures: vec![StatementFailure::new(0, "bad;", "syntax")],
        });
        assert_eq!(a.executed, 3);
        assert_eq!(a.attempted(), 4);
    }

    #[test]
    fn run_dir_name_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(run_dir_name(at), "export_20240305_140709");
    }

    #[test]
    fn report_collects_failed_groups() {
        let mut r = ExportReport::new(WriteMode::Append, "shop", None);
        r.groups.push(GroupReport::failed(TableGroup::Users, "refused"));
        assert_eq!(r.failed_groups(), vec![TableGroup::Users]);
        assert!(r.run_id.starts_with("run_"));
    }
}
