use async_trait::async_trait;

use super::{GroupJob, IdSet, JobContext, JobStats, Pipeline, TableExport};
use crate::domain::error::MigrationError;
use crate::domain::group::TableGroup;
use crate::domain::ports::StatementSink;

/// Accounts and their meta. With `customers` alone only accounts whose
/// capabilities mention `customer` are exported.
pub struct UsersJob;

/// Subquery filter for customer accounts. A substring match on the
/// serialized capabilities value, so it is best-effort.
fn customer_filter(p: &Pipeline<'_>) -> String {
    let usermeta = p.source_table("usermeta");
    let cap_key = format!("{}capabilities", p.ctx().src_prefix);
    format!(
        "ID IN (SELECT user_id FROM {} WHERE meta_key = '{}' AND meta_value LIKE '%customer%')",
        p.dialect().quote_ident(usermeta.as_str()),
        p.dialect().escape_str(&cap_key)
    )
}

#[async_trait]
impl GroupJob for UsersJob {
    fn group(&self) -> TableGroup {
        TableGroup::Users
    }

    async fn run(
        &self,
        ctx: &JobContext,
        sink: &mut dyn StatementSink,
    ) -> Result<JobStats, MigrationError> {
        let mut p = Pipeline::new(ctx, sink);
        p.write_header(TableGroup::Users)?;

        let mut spec = TableExport::new("users", &["ID"]).collect("ID");
        if ctx.selection.customers_only() {
            spec = spec.filter(customer_filter(&p));
        }

        let mut user_ids = IdSet::new();
        p.export_table(spec, Some(&mut user_ids)).await?;
        p.export_dependent("usermeta", "user_id", &user_ids, &["umeta_id"], None)
            .await?;

        Ok(p.finish())
    }
}
