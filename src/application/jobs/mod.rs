//! Per-group export jobs and the pipeline they share.
//!
//! A job reads its tables stage by stage (parents before dependents),
//! turns every row into a statement for the destination prefix, and writes
//! the statements into the sink it was handed.

pub mod orders;
pub mod products;
pub mod taxonomies;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::reader::ChunkedReader;
use crate::application::statement::StatementGenerator;
use crate::domain::error::MigrationError;
use crate::domain::group::{Selection, TableGroup};
use crate::domain::ports::{DataSource, StatementSink};
use crate::domain::row::Row;
use crate::domain::value_objects::{TableName, TablePrefix, WriteMode};
use crate::infrastructure::db::dialect::{MysqlDialect, QueryDialect};
use crate::infrastructure::db::sql_utils::{build_count_from, build_in_clause, build_select_query};

// ─── Context ─────────────────────────────────────────────────────────────────

/// Everything a job needs besides its sink.
pub struct JobContext {
    pub source: Arc<dyn DataSource>,
    pub source_db: String,
    pub src_prefix: TablePrefix,
    pub dst_prefix: TablePrefix,
    pub mode: WriteMode,
    pub page_size: u64,
    pub selection: Selection,
    pub generated_at: DateTime<Local>,
}

/// Totals a job reports back to the orchestrator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobStats {
    pub rows: u64,
    pub statements: u64,
    /// Stages that failed without stopping the job.
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait GroupJob: Send + Sync {
    fn group(&self) -> TableGroup;

    /// Write the whole group into `sink`. An `Err` is always fatal to the
    /// job; recoverable stage failures end up in `JobStats::warnings`.
    async fn run(
        &self,
        ctx: &JobContext,
        sink: &mut dyn StatementSink,
    ) -> Result<JobStats, MigrationError>;
}

pub fn job_for(group: TableGroup) -> Box<dyn GroupJob> {
    match group {
        TableGroup::Products => Box::new(products::ProductsJob),
        TableGroup::Taxonomies => Box::new(taxonomies::TaxonomiesJob),
        TableGroup::Users => Box::new(users::UsersJob),
        TableGroup::Orders => Box::new(orders::OrdersJob),
    }
}

// ─── IdSet ───────────────────────────────────────────────────────────────────

/// Identifiers collected by one stage and consumed by its dependents.
/// Keeps first-seen order and ignores duplicates.
#[derive(Debug, Default, Clone)]
pub struct IdSet {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.seen.insert(id.clone()) {
            self.ids.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn batches(&self, size: usize) -> impl Iterator<Item = &[String]> {
        self.ids.chunks(size.max(1))
    }
}

// ─── Stage description ───────────────────────────────────────────────────────

/// One table read of a stage: `SELECT * FROM <prefix><table> [WHERE …] ORDER BY …`.
pub struct TableExport<'q> {
    /// Base table name, without prefix.
    pub table: &'q str,
    pub where_clause: Option<String>,
    pub order_by: &'q [&'q str],
    /// Column whose values are collected into the caller's `IdSet`.
    pub collect: Option<&'q str>,
}

impl<'q> TableExport<'q> {
    pub fn new(table: &'q str, order_by: &'q [&'q str]) -> Self {
        Self {
            table,
            where_clause: None,
            order_by,
            collect: None,
        }
    }

    pub fn filter(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    pub fn collect(mut self, column: &'q str) -> Self {
        self.collect = Some(column);
        self
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Reader → generator → sink plumbing shared by every job.
pub struct Pipeline<'a> {
    ctx: &'a JobContext,
    sink: &'a mut dyn StatementSink,
    generator: StatementGenerator,
    dialect: MysqlDialect,
    stats: JobStats,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a JobContext, sink: &'a mut dyn StatementSink) -> Self {
        Self {
            ctx,
            sink,
            generator: StatementGenerator::new(ctx.mode),
            dialect: MysqlDialect,
            stats: JobStats::default(),
        }
    }

    pub fn ctx(&self) -> &'a JobContext {
        self.ctx
    }

    pub fn dialect(&self) -> &dyn QueryDialect {
        &self.dialect
    }

    pub fn sink(&mut self) -> &mut dyn StatementSink {
        &mut *self.sink
    }

    pub fn source_table(&self, base: &str) -> TableName {
        self.ctx.src_prefix.table(base)
    }

    pub fn dest_table(&self, base: &str) -> TableName {
        self.ctx.dst_prefix.table(base)
    }

    /// Header block written as the first bytes of the group's output.
    pub fn write_header(&mut self, group: TableGroup) -> Result<(), MigrationError> {
        let header = format!(
            "-- {} Export Generated on {}\n\
             -- Source DB: {} (prefix: {})\n\
             -- Destination prefix: {}\n\
             -- Export Mode: {}\n\n",
            group.label(),
            self.ctx.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.ctx.source_db,
            self.ctx.src_prefix,
            self.ctx.dst_prefix,
            self.ctx.mode,
        );
        self.sink.write_header(&header)
    }

    /// Generate and write one statement for `row` into `table`.
    pub fn emit(&mut self, table: &TableName, row: &Row) -> Result<(), MigrationError> {
        let stmt = self.generator.generate(table, row)?;
        self.sink.write_statement(&stmt)?;
        self.stats.statements += 1;
        Ok(())
    }

    pub fn count_rows(&mut self, n: usize) {
        self.stats.rows += n as u64;
    }

    /// Turn a recoverable failure into a warning; pass fatal ones through.
    pub fn absorb(&mut self, err: MigrationError) -> Result<(), MigrationError> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!("{}", err);
        self.stats.warnings.push(err.to_string());
        Ok(())
    }

    /// Stream one table into the sink, collecting ids when asked.
    pub async fn export_table(
        &mut self,
        spec: TableExport<'_>,
        mut ids: Option<&mut IdSet>,
    ) -> Result<(), MigrationError> {
        let src = self.source_table(spec.table);
        let dst = self.dest_table(spec.table);
        let base = build_select_query(
            "*",
            &src,
            None,
            spec.where_clause.as_deref(),
            spec.order_by,
            &self.dialect,
        );
        let count_from = build_count_from(&src, spec.where_clause.as_deref(), &self.dialect);
        let mut reader = open_reader(self.ctx, base, &count_from, src.as_str()).await;

        loop {
            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return self.absorb(e),
            };
            self.count_rows(chunk.rows.len());
            for row in &chunk.rows {
                if let (Some(col), Some(set)) = (spec.collect, ids.as_deref_mut()) {
                    if let Some(id) = row.text(col) {
                        set.insert(id);
                    }
                }
                self.emit(&dst, row)?;
            }
        }
        Ok(())
    }

    /// Stream the rows of `table` whose `key_column` is in `keys`, one
    /// `IN (…)` batch of `page_size` keys at a time.
    pub async fn export_dependent(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &IdSet,
        order_by: &[&str],
        mut collect: Option<(&str, &mut IdSet)>,
    ) -> Result<(), MigrationError> {
        if keys.is_empty() {
            debug!("No parent ids, skipping {}", self.source_table(table));
            return Ok(());
        }
        let batch_size = usize::try_from(self.ctx.page_size).unwrap_or(usize::MAX);
        for batch in keys.batches(batch_size) {
            let mut spec = TableExport::new(table, order_by)
                .filter(build_in_clause(key_column, batch, &self.dialect));
            let ids = match collect.as_mut() {
                Some((col, set)) => {
                    spec = spec.collect(*col);
                    Some(&mut **set)
                }
                None => None,
            };
            self.export_table(spec, ids).await?;
        }
        Ok(())
    }

    pub fn finish(self) -> JobStats {
        self.stats
    }
}

/// Paginated reader over `base_query`, with the row total when the count
/// query succeeds.
pub async fn open_reader<'a>(
    ctx: &'a JobContext,
    base_query: String,
    count_from: &str,
    origin: &str,
) -> ChunkedReader<'a> {
    let source = ctx.source.as_ref();
    let reader = ChunkedReader::new(source, base_query, ctx.page_size).with_origin(origin);
    match source.count(count_from).await {
        Ok(total) => reader.with_total(total),
        Err(e) => {
            debug!("Row count unavailable for {}: {:#}", origin, e);
            reader
        }
    }
}

/// `'a', 'b'` list of string literals for fixed `IN (…)` filters.
pub(crate) fn literal_list(values: &[&str], dialect: &dyn QueryDialect) -> String {
    values
        .iter()
        .map(|v| dialect.sql_literal(&serde_json::Value::String(v.to_string())))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::application::testing::MemorySource;
    use chrono::TimeZone;

    pub fn context(source: Arc<MemorySource>, mode: WriteMode, page_size: u64) -> JobContext {
        JobContext {
            source,
            source_db: "shop".into(),
            src_prefix: TablePrefix("wp_".into()),
            dst_prefix: TablePrefix("wc_".into()),
            mode,
            page_size,
            selection: Selection::default(),
            generated_at: Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::splitter::StreamSink;
    use crate::application::testing::{posts, MemorySource};

    #[test]
    fn id_set_dedupes_and_batches() {
        let mut ids = IdSet::new();
        for id in ["1", "2", "1", "3", "4", "5"] {
            ids.insert(id);
        }
        assert_eq!(ids.len(), 5);
        let batches: Vec<usize> = ids.batches(2).map(|b| b.len()).collect();
        assert_eq!(batches, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn header_lists_run_metadata() {
        let ctx = fixtures::context(Arc::new(MemorySource::new()), WriteMode::Update, 10);
        let mut sink = StreamSink::new(Vec::new());
        {
            let mut p = Pipeline::new(&ctx, &mut sink);
            p.write_header(TableGroup::Orders).unwrap();
        }
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            out,
            "-- Orders Export Generated on 2024-03-05 14:07:09\n\
             -- Source DB: shop (prefix: wp_)\n\
             -- Destination prefix: wc_\n\
             -- Export Mode: update\n\n"
        );
    }

    #[tokio::test]
    async fn failing_stage_becomes_warning() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("wp_posts", posts(5, "product"))
                .failing_after("wp_posts", 2),
        );
        let ctx = fixtures::context(source, WriteMode::Append, 2);
        let mut sink = StreamSink::new(Vec::new());
        let mut p = Pipeline::new(&ctx, &mut sink);
        p.export_table(TableExport::new("posts", &["ID"]), None)
            .await
            .unwrap();
        let stats = p.finish();
        assert_eq!(stats.statements, 2);
        assert_eq!(stats.warnings.len(), 1);
        assert!(stats.warnings[0].contains("wp_posts"));
    }

    #[tokio::test]
    async fn dependent_rows_follow_collected_ids() {
        let meta = vec![
            Row::new().with("meta_id", "1").with("post_id", "1"),
            Row::new().with("meta_id", "2").with("post_id", "9"),
            Row::new().with("meta_id", "3").with("post_id", "3"),
        ];
        let source = Arc::new(MemorySource::new().with_table("wp_postmeta", meta));
        let ctx = fixtures::context(source, WriteMode::Append, 1);
        let mut ids = IdSet::new();
        ids.insert("1");
        ids.insert("3");

        let mut sink = StreamSink::new(Vec::new());
        let mut p = Pipeline::new(&ctx, &mut sink);
        p.export_dependent("postmeta", "post_id", &ids, &["meta_id"], None)
            .await
            .unwrap();
        assert_eq!(p.finish().statements, 2);
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains("INSERT INTO wc_postmeta"));
        assert!(!out.contains("'9'"));
    }
}
