use crate::application::monitoring::PerfReport;
use crate::domain::report::{ExportReport, GroupStatus, ImportReport};
use colored::*;
use std::fmt::Write as _;
use std::path::PathBuf;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

// Renderers return text; the caller picks stdout or stderr (direct output
// mode keeps stdout for SQL).

// ─── Export summary ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct GroupRow {
    group: String,
    status: String,
    files: String,
    rows: String,
    statements: String,
    bytes: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

pub fn render_export_summary(report: &ExportReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "WOO-MIGRATE EXPORT SUMMARY".bold().cyan());
    let _ = writeln!(
        out,
        "Source: {}  ·  mode: {}",
        report.source_db.blue(),
        report.mode.to_string().yellow()
    );
    let _ = writeln!(out, "Run: {}", report.run_id.bright_yellow());
    if let Some(root) = &report.root_dir {
        let _ = writeln!(out, "Output: {}", root.display().to_string().green());
    }
    let _ = writeln!(out);

    if report.groups.is_empty() {
        let _ = writeln!(out, "{}", "Nothing selected.".italic());
        return out;
    }

    let rows: Vec<GroupRow> = report
        .groups
        .iter()
        .map(|g| GroupRow {
            group: g.group.to_string().bold().to_string(),
            status: match &g.status {
                GroupStatus::Completed if g.warnings.is_empty() => "ok".green().to_string(),
                GroupStatus::Completed => format!("ok ({} warning(s))", g.warnings.len())
                    .yellow()
                    .to_string(),
                GroupStatus::Failed { .. } => "failed".red().bold().to_string(),
            },
            files: g.files.len().to_string(),
            rows: g.rows.to_string(),
            statements: g.statements.to_string(),
            bytes: g.bytes.to_string(),
            duration_ms: format_duration(g.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=6)).with(Alignment::right()))
        .to_string();
    let _ = writeln!(out, "{table}");

    for g in &report.groups {
        if let GroupStatus::Failed { error } = &g.status {
            let _ = writeln!(out, "  {} {}: {}", "✗".red(), g.group, error);
        }
        for w in &g.warnings {
            let _ = writeln!(out, "  {} {}: {}", "!".yellow(), g.group, w);
        }
    }
    let _ = writeln!(out);
    out
}

// ─── Import summary ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct FileRow {
    group: String,
    file: String,
    executed: String,
    failed: String,
    blocks: String,
}

pub fn render_import_summary(report: &ImportReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "WOO-MIGRATE IMPORT SUMMARY".bold().cyan());
    let _ = writeln!(out);

    if report.files.is_empty() {
        let _ = writeln!(out, "{}", "No files imported.".italic());
    } else {
        let rows: Vec<FileRow> = report
            .files
            .iter()
            .map(|f| FileRow {
                group: f.group.to_string().bold().to_string(),
                file: f
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<stream>".into()),
                executed: f.outcome.executed.to_string().green().to_string(),
                failed: match f.outcome.failures.len() {
                    0 => "0".to_string(),
                    n => n.to_string().red().to_string(),
                },
                blocks: if f.blocks_replayed.is_empty() {
                    "-".dimmed().to_string()
                } else {
                    f.blocks_replayed
                        .iter()
                        .map(|b| b.label().to_lowercase())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
            .to_string();
        let _ = writeln!(out, "{table}");
    }

    let _ = writeln!(
        out,
        "  Total: {} executed  ·  {} failed",
        report.statements_executed().to_string().bold(),
        report.statements_failed().to_string().bold(),
    );
    for f in report.files.iter().filter(|f| f.dropped_tail) {
        let name = f
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stream>".into());
        let _ = writeln!(out, "  {} incomplete trailing statement dropped in {}", "!".yellow(), name);
    }
    for g in &report.missing_groups {
        let _ = writeln!(out, "  {} no input found for {}", "!".yellow(), g);
    }
    for p in &report.checksum_mismatches {
        let _ = writeln!(out, "  {} {} changed since export", "!".yellow(), p.display());
    }
    for p in &report.skipped {
        let _ = writeln!(out, "  {} skipped {}", "-".dimmed(), p.display());
    }
    for u in &report.unreadable {
        let _ = writeln!(out, "  {} {}", "✗".red(), u);
    }
    let _ = writeln!(out);
    out
}

// ─── Run listing ─────────────────────────────────────────────────────────────

pub fn render_run_list(runs: &[PathBuf]) -> String {
    if runs.is_empty() {
        return format!("{}\n", "No previous exports found.".italic());
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", "PREVIOUS EXPORTS".bold().cyan());
    for r in runs {
        let _ = writeln!(out, "  {}", r.display());
    }
    out
}

// ─── Performance summary ─────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    source: String,
    calls: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// One row per operation and source.
pub fn render_perf_summary(report: &PerfReport) -> String {
    if report.timings.is_empty() {
        return String::new();
    }

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: t.operation.dimmed().to_string(),
            source: t.source.bold().to_string(),
            calls: t.calls.to_string(),
            rows: t.rows.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=4)).with(Alignment::right()))
        .to_string();

    let mut out = String::new();
    let _ = writeln!(out, "{}", "PERFORMANCE".bold().cyan());
    let _ = writeln!(out, "{table}");
    let _ = writeln!(
        out,
        "  Total: {} row(s) fetched  ·  {} statement(s) executed  ·  {} ms in queries",
        report.total_rows_fetched.to_string().bold(),
        report.total_statements_executed.to_string().bold(),
        format_duration(report.total_ms),
    );
    let _ = writeln!(out);
    out
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}
