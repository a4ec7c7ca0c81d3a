//! In-memory `DataSource` used by the application tests.
//!
//! Understands just enough of the generated SQL to be useful: the first
//! `` FROM `table` `` picks the table, a single `col IN ('a', 'b')` WHERE
//! clause filters rows, and a trailing `LIMIT n OFFSET m` pages them.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::domain::ports::{Connector, DataSource};
use crate::domain::report::{BatchOutcome, StatementFailure};
use crate::domain::row::Row;
use crate::infrastructure::config::DbConfig;

#[derive(Default)]
pub struct MemorySource {
    tables: BTreeMap<String, Vec<Row>>,
    /// Tables whose queries fail once `n` rows have been served from them.
    fail_after: BTreeMap<String, usize>,
    served: Mutex<BTreeMap<String, usize>>,
    pub executed: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(name.to_string(), rows);
        self
    }

    pub fn failing_after(mut self, name: &str, rows: usize) -> Self {
        self.fail_after.insert(name.to_string(), rows);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn select(&self, sql: &str) -> Result<Vec<Row>> {
        let table = table_of(sql).ok_or_else(|| anyhow::anyhow!("no FROM in {}", sql))?;
        let rows = self.tables.get(&table).cloned().unwrap_or_default();
        let rows = match in_filter(sql) {
            Some((col, values)) => rows
                .into_iter()
                .filter(|r| r.text(&col).map(|v| values.contains(&v)).unwrap_or(false))
                .collect(),
            None => rows,
        };
        Ok(rows)
    }
}

#[async_trait]
impl DataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(sql.to_string());
        let rows = self.select(sql)?;
        let (limit, offset) = limit_offset(sql).unwrap_or((rows.len(), 0));
        let page: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

        if let Some(table) = table_of(sql) {
            if let Some(&max) = self.fail_after.get(&table) {
                let mut served = self.served.lock().unwrap();
                let n = served.entry(table.clone()).or_default();
                if *n >= max {
                    bail!("lost connection while reading {}", table);
                }
                *n += page.len();
            }
        }
        Ok(page)
    }

    async fn count(&self, from_clause: &str) -> Result<u64> {
        Ok(self.select(&format!("SELECT * FROM {}", from_clause))?.len() as u64)
    }

    async fn execute_batch(&self, statements: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut log = self.executed.lock().unwrap();
        for (i, s) in statements.iter().enumerate() {
            if s.contains("FAIL") {
                outcome
                    .failures
                    .push(StatementFailure::new(i, s, "rejected by fake"));
            } else {
                log.push(s.clone());
                outcome.executed += 1;
            }
        }
        outcome
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Hands out the same source on every connect; refuses when built with `None`.
pub struct MemoryConnector(pub Option<Arc<MemorySource>>);

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, cfg: &DbConfig) -> Result<Arc<dyn DataSource>> {
        match &self.0 {
            Some(src) => Ok(Arc::clone(src) as Arc<dyn DataSource>),
            None => bail!("connection refused by {}", cfg.host),
        }
    }
}

fn table_of(sql: &str) -> Option<String> {
    let start = sql.find("FROM `")? + "FROM `".len();
    let len = sql[start..].find('`')?;
    Some(sql[start..start + len].to_string())
}

fn limit_offset(sql: &str) -> Option<(usize, usize)> {
    let idx = sql.rfind(" LIMIT ")?;
    let mut parts = sql[idx..].split_whitespace().skip(1);
    let limit = parts.next()?.parse().ok()?;
    parts.next()?;
    let offset = parts.next()?.parse().ok()?;
    Some((limit, offset))
}

/// `WHERE [alias.]col IN ('a', 'b')` with quoted literals only.
fn in_filter(sql: &str) -> Option<(String, Vec<String>)> {
    let where_at = sql.find(" WHERE ")? + " WHERE ".len();
    let clause = &sql[where_at..];
    let in_at = clause.find(" IN (")?;
    let col = clause[..in_at].trim();
    if col.contains(' ') || col.starts_with('(') {
        return None;
    }
    let col = col.rsplit('.').next()?.to_string();
    let list = &clause[in_at + " IN (".len()..];
    let list = &list[..list.find(')')?];
    let mut values = Vec::new();
    for v in list.split(", ") {
        let v = v.trim();
        values.push(v.strip_prefix('\'')?.strip_suffix('\'')?.replace("\\'", "'"));
    }
    Some((col, values))
}

/// `n` rows of a `posts`-like table with ids 1..=n.
pub fn posts(n: usize, post_type: &str) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            Row::new()
                .with("ID", i.to_string())
                .with("post_title", format!("Item {}", i))
                .with("post_type", post_type)
        })
        .collect()
}
