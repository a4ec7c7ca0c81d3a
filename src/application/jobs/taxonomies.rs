use async_trait::async_trait;
use tracing::debug;

use super::{literal_list, open_reader, GroupJob, IdSet, JobContext, JobStats, Pipeline};
use crate::application::tagger::BlockTagger;
use crate::domain::error::MigrationError;
use crate::domain::group::TableGroup;
use crate::domain::ports::StatementSink;
use crate::domain::taxonomy::TaxonomyBlock;
use crate::infrastructure::db::dialect::QueryDialect;

const TERM_COLUMNS: &[&str] = &["term_id", "name", "slug", "term_group"];
const TERM_TAXONOMY_COLUMNS: &[&str] = &[
    "term_taxonomy_id",
    "term_id",
    "taxonomy",
    "description",
    "parent",
    "count",
];

/// Product categories, tags and attribute terms as one tagged stream.
///
/// Each joined term row becomes a `terms` and a `term_taxonomy` statement.
/// Category term meta closes the categories block.
pub struct TaxonomiesJob;

/// WHERE clause selecting the taxonomies of `blocks`; `None` if empty.
fn taxonomy_filter(blocks: &[TaxonomyBlock], dialect: &dyn QueryDialect) -> Option<String> {
    let mut names = Vec::new();
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            TaxonomyBlock::ProductCategories => names.push("product_cat"),
            TaxonomyBlock::ProductTags => names.push("product_tag"),
            TaxonomyBlock::ProductAttributes => parts.push("tt.taxonomy LIKE 'pa\\_%'".to_string()),
        }
    }
    if !names.is_empty() {
        parts.insert(0, format!("tt.taxonomy IN ({})", literal_list(&names, dialect)));
    }
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(format!("({})", parts.join(" OR "))),
    }
}

#[async_trait]
impl GroupJob for TaxonomiesJob {
    fn group(&self) -> TableGroup {
        TableGroup::Taxonomies
    }

    async fn run(
        &self,
        ctx: &JobContext,
        sink: &mut dyn StatementSink,
    ) -> Result<JobStats, MigrationError> {
        let mut p = Pipeline::new(ctx, sink);
        p.write_header(TableGroup::Taxonomies)?;

        let blocks: Vec<TaxonomyBlock> = ctx.selection.taxonomy_blocks().into_iter().collect();
        let Some(filter) = taxonomy_filter(&blocks, p.dialect()) else {
            return Ok(p.finish());
        };

        let terms = p.source_table("terms");
        let term_taxonomy = p.source_table("term_taxonomy");
        let from = format!(
            "{} t JOIN {} tt ON tt.term_id = t.term_id WHERE {}",
            p.dialect().quote_ident(terms.as_str()),
            p.dialect().quote_ident(term_taxonomy.as_str()),
            filter
        );
        let base = format!(
            "SELECT t.term_id, t.name, t.slug, t.term_group, tt.term_taxonomy_id, \
             tt.taxonomy, tt.description, tt.parent, tt.count FROM {} \
             ORDER BY tt.taxonomy, t.term_id",
            from
        );

        let dst_terms = p.dest_table("terms");
        let dst_term_taxonomy = p.dest_table("term_taxonomy");
        let mut tagger = BlockTagger::new();
        let mut category_ids = IdSet::new();
        let mut reader = open_reader(ctx, base, &from, terms.as_str()).await;

        loop {
            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    p.absorb(e)?;
                    break;
                }
            };
            p.count_rows(chunk.rows.len());
            for row in &chunk.rows {
                let taxonomy = row.text("taxonomy").unwrap_or_default();
                if tagger.tag(&taxonomy, p.sink())?.is_none() {
                    debug!(taxonomy = %taxonomy, "skipping term outside any block");
                    continue;
                }
                if taxonomy == "product_cat" {
                    if let Some(id) = row.text("term_id") {
                        category_ids.insert(id);
                    }
                }
                p.emit(&dst_terms, &row.project(TERM_COLUMNS))?;
                p.emit(&dst_term_taxonomy, &row.project(TERM_TAXONOMY_COLUMNS))?;
            }
        }

        if ctx.selection.categories && !category_ids.is_empty() {
            if let Some(block) = tagger.enter(TaxonomyBlock::ProductCategories) {
                p.sink().write_marker(&block.marker())?;
            }
            p.export_dependent("termmeta", "term_id", &category_ids, &["meta_id"], None)
                .await?;
        }

        Ok(p.finish())
    }
}
