use async_trait::async_trait;

use super::{literal_list, GroupJob, IdSet, JobContext, JobStats, Pipeline, TableExport};
use crate::domain::error::MigrationError;
use crate::domain::group::TableGroup;
use crate::domain::ports::StatementSink;

/// Products and variations, their meta and term links. Attachments and
/// their meta follow when selected.
pub struct ProductsJob;

#[async_trait]
impl GroupJob for ProductsJob {
    fn group(&self) -> TableGroup {
        TableGroup::Products
    }

    async fn run(
        &self,
        ctx: &JobContext,
        sink: &mut dyn StatementSink,
    ) -> Result<JobStats, MigrationError> {
        let mut p = Pipeline::new(ctx, sink);
        p.write_header(TableGroup::Products)?;

        if ctx.selection.products {
            let mut product_ids = IdSet::new();
            let types = literal_list(&["product", "product_variation"], p.dialect());
            p.export_table(
                TableExport::new("posts", &["ID"])
                    .filter(format!("post_type IN ({})", types))
                    .collect("ID"),
                Some(&mut product_ids),
            )
            .await?;
            p.export_dependent("postmeta", "post_id", &product_ids, &["meta_id"], None)
                .await?;
            p.export_dependent(
                "term_relationships",
                "object_id",
                &product_ids,
                &["object_id", "term_taxonomy_id"],
                None,
            )
            .await?;
        }

        if ctx.selection.attachments {
            let mut attachment_ids = IdSet::new();
            let types = literal_list(&["attachment"], p.dialect());
            p.export_table(
                TableExport::new("posts", &["ID"])
                    .filter(format!("post_type IN ({})", types))
                    .collect("ID"),
                Some(&mut attachment_ids),
            )
            .await?;
            p.export_dependent("postmeta", "post_id", &attachment_ids, &["meta_id"], None)
                .await?;
        }

        Ok(p.finish())
    }
}
