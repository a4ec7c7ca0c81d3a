//! Error types the engine reasons about.
//!
//! Ports return `anyhow::Result` (any driver, any fake); the engine maps
//! those failures into [`MigrationError`] so each job can tell a fatal
//! connectivity or filesystem problem from a recoverable query failure.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    /// Could not open a connection. Fatal to the owning job.
    #[error("Connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// A query failed mid-stream. Rows produced before the failure are
    /// already written and stay written.
    #[error("Query for {origin} failed after {rows_produced} row(s): {message}")]
    Query {
        origin: String,
        rows_produced: u64,
        message: String,
    },

    /// Directory or file could not be created or written. Fatal to the owning job.
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Caller broke a precondition (empty row, empty table name, …).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    pub fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        MigrationError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn connection(target: impl Into<String>, err: &anyhow::Error) -> Self {
        MigrationError::Connection {
            target: target.into(),
            message: format!("{:#}", err),
        }
    }

    /// `true` for failures that end the whole job rather than one stage.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MigrationError::Query { .. })
    }
}
