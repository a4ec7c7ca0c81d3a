use tracing::{debug, info};

use crate::domain::error::MigrationError;
use crate::domain::ports::DataSource;
use crate::domain::row::Row;
use crate::infrastructure::db::sql_utils::paginate;

/// One page of a paginated result.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub offset: u64,
    pub limit: u64,
    pub rows: Vec<Row>,
}

/// Pulls an ordered query's result set in fixed-size pages.
///
/// At most one page is held in memory. The stream ends at the first page
/// that comes back empty; a failing page ends it with
/// [`MigrationError::Query`], carrying how many rows were already produced.
pub struct ChunkedReader<'a> {
    source: &'a dyn DataSource,
    base_query: String,
    page_size: u64,
    offset: u64,
    produced: u64,
    total: Option<u64>,
    origin: String,
    done: bool,
}

impl<'a> ChunkedReader<'a> {
    pub fn new(source: &'a dyn DataSource, base_query: impl Into<String>, page_size: u64) -> Self {
        Self {
            source,
            base_query: base_query.into(),
            page_size: page_size.max(1),
            offset: 0,
            produced: 0,
            total: None,
            origin: source.name().to_string(),
            done: false,
        }
    }

    /// Expected row count, used for percentage progress only.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Label used in progress lines and errors (usually the table name).
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Fetch the next page. `Ok(None)` once the result set is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, MigrationError> {
        if self.done {
            return Ok(None);
        }

        let sql = paginate(&self.base_query, self.page_size, self.offset);
        let rows = match self.source.query(&sql).await {
            Ok(rows) => rows,
            Err(e) => {
                self.done = true;
                return Err(MigrationError::Query {
                    origin: self.origin.clone(),
                    rows_produced: self.produced,
                    message: format!("{:#}", e),
                });
            }
        };

        if rows.is_empty() {
            self.done = true;
            debug!(origin = %self.origin, rows = self.produced, "pagination finished");
            return Ok(None);
        }

        let chunk = Chunk {
            offset: self.offset,
            limit: self.page_size,
            rows,
        };
        self.offset += self.page_size;
        self.produced += chunk.rows.len() as u64;
        self.log_progress();
        Ok(Some(chunk))
    }

    fn log_progress(&self) {
        match self.total {
            Some(total) if total > 0 => {
                let pct = (self.produced as f64 / total as f64 * 100.0).min(100.0);
                info!(
                    "{}: processed {} / {} rows ({:.2}%)",
                    self.origin, self.produced, total, pct
                );
            }
            _ => info!("{}: processed {} rows", self.origin, self.produced),
        }
    }
}
