use async_trait::async_trait;

use super::{literal_list, GroupJob, IdSet, JobContext, JobStats, Pipeline, TableExport};
use crate::domain::error::MigrationError;
use crate::domain::group::TableGroup;
use crate::domain::ports::StatementSink;

/// Orders → order meta → order items → item meta.
pub struct OrdersJob;

#[async_trait]
impl GroupJob for OrdersJob {
    fn group(&self) -> TableGroup {
        TableGroup::Orders
    }

    async fn run(
        &self,
        ctx: &JobContext,
        sink: &mut dyn StatementSink,
    ) -> Result<JobStats, MigrationError> {
        let mut p = Pipeline::new(ctx, sink);
        p.write_header(TableGroup::Orders)?;

        let mut order_ids = IdSet::new();
        let types = literal_list(&["shop_order"], p.dialect());
        p.export_table(
            TableExport::new("posts", &["ID"])
                .filter(format!("post_type IN ({})", types))
                .collect("ID"),
            Some(&mut order_ids),
        )
        .await?;
        p.export_dependent("postmeta", "post_id", &order_ids, &["meta_id"], None)
            .await?;

        let mut item_ids = IdSet::new();
        p.export_dependent(
            "woocommerce_order_items",
            "order_id",
            &order_ids,
            &["order_item_id"],
            Some(("order_item_id", &mut item_ids)),
        )
        .await?;
        p.export_dependent(
            "woocommerce_order_itemmeta",
            "order_item_id",
            &item_ids,
            &["meta_id"],
            None,
        )
        .await?;

        Ok(p.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::fixtures::context;
    use crate::application::splitter::StreamSink;
    use crate::application::testing::{posts, MemorySource};
    use crate::domain::row::Row;
    use crate::domain::value_objects::WriteMode;
    use std::sync::Arc;

    fn source() -> MemorySource {
        let mut all = posts(2, "shop_order");
        all.push(Row::new().with("ID", "3").with("post_type", "product"));
        MemorySource::new()
            .with_table("wp_posts", all)
            .with_table(
                "wp_postmeta",
                vec![
                    Row::new().with("meta_id", "1").with("post_id", "1"),
                    Row::new().with("meta_id", "2").with("post_id", "3"),
                ],
            )
            .with_table(
                "wp_woocommerce_order_items",
                vec![
                    Row::new().with("order_item_id", "10").with("order_id", "1"),
                    Row::new().with("order_item_id", "11").with("order_id", "2"),
                    Row::new().with("order_item_id", "12").with("order_id", "3"),
                ],
            )
            .with_table(
                "wp_woocommerce_order_itemmeta",
                vec![
                    Row::new().with("meta_id", "100").with("order_item_id", "10"),
                    Row::new().with("meta_id", "101").with("order_item_id", "12"),
                ],
            )
    }

    #[tokio::test]
    async fn cascade_follows_collected_ids() {
        let ctx = context(Arc::new(source()), WriteMode::Append, 1);
        let mut sink = StreamSink::new(Vec::new());
        let stats = OrdersJob.run(&ctx, &mut sink).await.unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();

        // 2 orders, 1 meta, 2 items, 1 item meta
        assert_eq!(stats.statements, 6);
        assert!(out.contains("INSERT INTO wc_woocommerce_order_itemmeta (meta_id, order_item_id) VALUES ('100', '10');"));
        assert!(!out.contains("'101'"));
        assert!(!out.contains("'12'"));
        assert!(stats.warnings.is_empty());
    }

    #[tokio::test]
    async fn failed_stage_does_not_stop_later_stages() {
        let source = source().failing_after("wp_postmeta", 0);
        let ctx = context(Arc::new(source), WriteMode::Append, 10);
        let mut sink = StreamSink::new(Vec::new());
        let stats = OrdersJob.run(&ctx, &mut sink).await.unwrap();

        assert_eq!(stats.warnings.len(), 1);
        assert!(stats.warnings[0].contains("wp_postmeta"));
        // orders, items and item meta still exported
        assert_eq!(stats.statements, 5);
    }
}
