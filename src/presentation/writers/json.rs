use anyhow::Result;
use serde::Serialize;

use crate::application::monitoring::PerfReport;
use crate::domain::{
    ports::OutputWriter,
    report::{ExportReport, GroupReport},
};
use crate::infrastructure::fs::MANIFEST_FILE;

// ─── Serialisation view ──────────────────────────────────────────────────────
//
// Wraps the domain report with manifest-only fields; the domain type is
// never modified.

#[derive(Serialize)]
struct Manifest<'a> {
    format: &'static str,
    run_id: &'a str,
    created_at: &'a str,
    mode: &'a str,
    source_db: &'a str,
    total_statements: u64,
    groups: &'a [GroupReport],
    #[serde(skip_serializing_if = "Option::is_none")]
    perf: Option<&'a PerfReport>,
}

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Writes `manifest.json` at the run root.
#[derive(Default)]
pub struct JsonWriter {
    perf: Option<PerfReport>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_perf(perf: PerfReport) -> Self {
        Self { perf: Some(perf) }
    }
}

impl OutputWriter for JsonWriter {
    fn format(&self, report: &ExportReport) -> Result<String> {
        let view = Manifest {
            format: "woo-migrate/1",
            run_id: &report.run_id,
            created_at: &report.created_at,
            mode: report.mode.as_str(),
            source_db: &report.source_db,
            total_statements: report.total_statements(),
            groups: &report.groups,
            perf: self.perf.as_ref(),
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }

    fn file_name(&self) -> &'static str {
        MANIFEST_FILE
    }
}
