use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::domain::ports::{Connector, DataSource};
use crate::domain::report::{BatchOutcome, StatementFailure};
use crate::domain::row::Row;
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::dialect::{Dialect, MysqlDialect};
use crate::infrastructure::db::row_mapper::row_to_row;

/// `DataSource` backed by a single-connection sqlx MySQL pool.
///
/// Every query goes through `sqlx::raw_sql`, i.e. the text protocol: the
/// statements it runs are built as text and carry no bind parameters.
pub struct MySqlDataSource {
    pool: MySqlPool,
    name: String,
    dialect: Arc<dyn Dialect>,
}

/// Connect to the database described in `cfg` and return a `MySqlDataSource`.
pub async fn connect(cfg: &DbConfig) -> Result<MySqlDataSource> {
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(cfg.connect_options())
        .await
        .with_context(|| format!("Failed to connect to {}", cfg.describe()))?;

    debug!("Connected to {}", cfg.describe());

    Ok(MySqlDataSource {
        pool,
        name: format!("{}@{}", cfg.dbname, cfg.host),
        dialect: Arc::new(MysqlDialect),
    })
}

#[async_trait]
impl DataSource for MySqlDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("Executing: {}", sql);

        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Query failed on {}", self.name))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            result.push(row_to_row(row, self.dialect.as_ref())?);
        }
        Ok(result)
    }

    async fn count(&self, from_clause: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", from_clause);
        let rows = self.query(&sql).await?;
        let text = rows
            .first()
            .and_then(|r| r.text("n"))
            .ok_or_else(|| anyhow!("COUNT(*) returned no value: {}", sql))?;
        text.trim()
            .parse::<u64>()
            .with_context(|| format!("COUNT(*) returned a non-integer: {}", text))
    }

    async fn execute_batch(&self, statements: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (index, stmt) in statements.iter().enumerate() {
            match sqlx::raw_sql(stmt).execute(&self.pool).await {
                Ok(_) => outcome.executed += 1,
                Err(e) => {
                    error!(db = %self.name, index, error = %e, "statement failed");
                    outcome
                        .failures
                        .push(StatementFailure::new(index, stmt, e.to_string()));
                }
            }
        }
        outcome
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!("Closed connection to {}", self.name);
        }
    }
}

/// Opens one `MySqlDataSource` per call; each group job owns its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, cfg: &DbConfig) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(connect(cfg).await?))
    }
}
