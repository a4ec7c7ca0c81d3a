use crate::domain::ports::DataSource;
use crate::domain::report::BatchOutcome;
use crate::domain::row::Row;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, instrument};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// Totals for one kind of operation against one data source.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// Operation name: "query", "count" or "execute".
    pub operation: &'static str,
    /// Data source the operation ran against.
    pub source: String,
    pub calls: usize,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Rows fetched, or statements executed.
    pub rows: usize,
}

/// Accumulated performance timings for one export or import run.
///
/// `timings` holds one entry per (operation, source) pair and stays the same
/// size however many pages a run reads.
///
/// Shared by every decorator created for the run via `Arc<Mutex<_>>`, so
/// concurrent group jobs feed the same report.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_rows_fetched: usize,
    pub total_statements_executed: usize,
    pub total_ms: u128,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Copy out of the shared handle. A poisoned lock yields an empty report.
    pub fn snapshot(report: &Arc<Mutex<Self>>) -> Self {
        report.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            r.total_ms += timing.duration_ms;
            match timing.operation {
                "query" => r.total_rows_fetched += timing.rows,
                "execute" => r.total_statements_executed += timing.rows,
                _ => {}
            }
            match r
                .timings
                .iter_mut()
                .find(|t| t.operation == timing.operation && t.source == timing.source)
            {
                Some(t) => {
                    t.calls += timing.calls;
                    t.rows += timing.rows;
                    t.duration_ms += timing.duration_ms;
                }
                None => r.timings.push(timing),
            }
        }
    }
}

// ─── MonitoringDataSource ────────────────────────────────────────────────────

/// Decorator: wraps any `DataSource`, measures wall time per call, and
/// appends the result to the shared `PerfReport`.
pub struct MonitoringDataSource {
    inner: Arc<dyn DataSource>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringDataSource {
    pub fn new(inner: Arc<dyn DataSource>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }

    fn record(&self, operation: &'static str, start: Instant, rows: usize) {
        PerfReport::record(
            &self.report,
            OpTiming {
                operation,
                source: self.inner.name().to_string(),
                calls: 1,
                duration_ms: start.elapsed().as_millis(),
                rows,
            },
        );
    }
}

#[async_trait]
impl DataSource for MonitoringDataSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(name = "query", skip(self, sql), fields(db = %self.inner.name()), level = "debug")]
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let start = Instant::now();
        let rows = self.inner.query(sql).await?;
        debug!(rows = rows.len(), duration_ms = start.elapsed().as_millis() as u64, "query completed");
        self.record("query", start, rows.len());
        Ok(rows)
    }

    async fn count(&self, from_clause: &str) -> Result<u64> {
        let start = Instant::now();
        let n = self.inner.count(from_clause).await?;
        self.record("count", start, 0);
        Ok(n)
    }

    #[instrument(
        name = "execute_batch",
        skip(self, statements),
        fields(db = %self.inner.name(), statements = statements.len()),
        level = "info"
    )]
    async fn execute_batch(&self, statements: &[String]) -> BatchOutcome {
        let start = Instant::now();
        let outcome = self.inner.execute_batch(statements).await;
        self.record("execute", start, outcome.executed);
        outcome
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{posts, MemorySource};

    #[tokio::test]
    async fn records_rows_and_statements() {
        let inner = Arc::new(MemorySource::new().with_table("wp_posts", posts(3, "product")));
        let report = PerfReport::new();
        let src = MonitoringDataSource::new(inner, Arc::clone(&report));

        src.query("SELECT * FROM `wp_posts` ORDER BY ID").await.unwrap();
        src.count("`wp_posts`").await.unwrap();
        src.execute_batch(&["INSERT INTO x (a) VALUES ('1');".to_string()])
            .await;

        let snap = PerfReport::snapshot(&report);
        assert_eq!(snap.timings.len(), 3);
        assert_eq!(snap.total_rows_fetched, 3);
        assert_eq!(snap.total_statements_executed, 1);
        assert_eq!(src.name(), "memory");
    }

    #[tokio::test]
    async fn repeated_queries_fold_into_one_entry() {
        let inner = Arc::new(MemorySource::new().with_table("wp_posts", posts(5, "product")));
        let report = PerfReport::new();
        let src = MonitoringDataSource::new(inner, Arc::clone(&report));

        for offset in [0, 2, 4] {
            src.query(&format!("SELECT * FROM `wp_posts` LIMIT 2 OFFSET {offset}"))
                .await
                .unwrap();
        }

        let snap = PerfReport::snapshot(&report);
        assert_eq!(snap.timings.len(), 1);
        assert_eq!(snap.timings[0].operation, "query");
        assert_eq!(snap.timings[0].calls, 3);
        assert_eq!(snap.timings[0].rows, 5);
        assert_eq!(snap.total_rows_fetched, 5);
    }
}
