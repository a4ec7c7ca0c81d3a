use crate::domain::value_objects::TableName;
use crate::infrastructure::db::dialect::QueryDialect;
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Query builders
// ─────────────────────────────────────────────────────────────────────────────

/// Build `SELECT <columns> FROM <table> [alias] [WHERE …] ORDER BY …`.
///
/// `ORDER BY` is mandatory: offset pagination over an unordered result can
/// skip or repeat rows between pages, so callers must name a stable key.
pub fn build_select_query(
    columns: &str,
    table: &TableName,
    alias: Option<&str>,
    where_clause: Option<&str>,
    order_by: &[&str],
    dialect: &dyn QueryDialect,
) -> String {
    let mut q = format!("SELECT {} FROM {}", columns, dialect.quote_ident(&table.0));
    if let Some(a) = alias {
        q.push(' ');
        q.push_str(a);
    }
    if let Some(w) = where_clause {
        q.push_str(" WHERE ");
        q.push_str(w);
    }
    q.push_str(" ORDER BY ");
    q.push_str(&order_by.join(", "));
    q
}

/// Build the FROM/WHERE tail used for `SELECT COUNT(*) FROM …`.
pub fn build_count_from(
    table: &TableName,
    where_clause: Option<&str>,
    dialect: &dyn QueryDialect,
) -> String {
    match where_clause {
        Some(w) => format!("{} WHERE {}", dialect.quote_ident(&table.0), w),
        None => dialect.quote_ident(&table.0),
    }
}

/// Build `<column> IN ('1', '2', …)` from collected identifier values.
pub fn build_in_clause(column: &str, ids: &[String], dialect: &dyn QueryDialect) -> String {
    let values: Vec<String> = ids
        .iter()
        .map(|id| dialect.sql_literal(&Value::String(id.clone())))
        .collect();
    format!("{} IN ({})", column, values.join(", "))
}

/// Append offset pagination to an ordered base query.
pub fn paginate(base_query: &str, limit: u64, offset: u64) -> String {
    format!("{} LIMIT {} OFFSET {}", base_query, limit, offset)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
