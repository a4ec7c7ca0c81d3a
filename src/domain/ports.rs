use crate::domain::{
    error::MigrationError,
    report::{BatchOutcome, ExportReport},
    row::Row,
};
use crate::infrastructure::config::DbConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Port: a relational data source (implemented by MySqlDataSource)
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short description used as the origin of log lines ("shop@db1").
    fn name(&self) -> &str;

    /// Run a parameterless query and return every row of its result.
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// `SELECT COUNT(*) FROM <from_clause>`.
    async fn count(&self, from_clause: &str) -> Result<u64>;

    /// Execute each statement in turn. A failing statement is recorded in the
    /// outcome and does not stop the ones after it.
    async fn execute_batch(&self, statements: &[String]) -> BatchOutcome;

    /// Release the underlying connection. Idempotent.
    async fn close(&self);
}

/// Port: opens a fresh data source per job (implemented by MySqlConnector)
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &DbConfig) -> Result<Arc<dyn DataSource>>;
}

/// Port: sequential destination for generated SQL text (implemented by
/// FileSplitter and StreamSink)
pub trait StatementSink: Send {
    /// Write one complete logical unit (a statement or a header block),
    /// then apply any size policy. A unit is never split.
    fn write_unit(&mut self, text: &str) -> Result<(), MigrationError>;

    fn write_header(&mut self, header: &str) -> Result<(), MigrationError> {
        self.write_unit(header)
    }

    fn write_statement(&mut self, statement: &str) -> Result<(), MigrationError> {
        self.write_unit(statement)
    }

    /// Write a block marker. Markers are not size-checked, and the most
    /// recent one is repeated at the top of any file opened afterwards.
    fn write_marker(&mut self, marker: &str) -> Result<(), MigrationError>;

    /// Total bytes accepted so far, across every file.
    fn bytes_written(&self) -> u64;

    /// Flush and close; returns the files produced (empty for streams).
    fn finish(&mut self) -> Result<Vec<PathBuf>, MigrationError>;
}

/// Port: run-report formatting (implemented by JsonWriter)
pub trait OutputWriter: Send + Sync {
    /// Serializes the report to a string
    fn format(&self, report: &ExportReport) -> Result<String>;
    /// File name written at the run root (e.g. "manifest.json")
    fn file_name(&self) -> &'static str;
}
