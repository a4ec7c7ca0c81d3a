use std::sync::Arc;

use crate::domain::error::MigrationError;
use crate::domain::row::Row;
use crate::domain::value_objects::{TableName, WriteMode};
use crate::infrastructure::db::dialect::{MysqlDialect, QueryDialect};

// ─── Generation ──────────────────────────────────────────────────────────────

/// Turns one row into one SQL statement under a fixed write mode.
///
/// Pure and deterministic: the same table, row and mode always give the same
/// text. Every statement ends with `;\n` and occupies a single line.
#[derive(Clone)]
pub struct StatementGenerator {
    mode: WriteMode,
    dialect: Arc<dyn QueryDialect>,
}

impl StatementGenerator {
    pub fn new(mode: WriteMode) -> Self {
        Self::with_dialect(mode, Arc::new(MysqlDialect))
    }

    pub fn with_dialect(mode: WriteMode, dialect: Arc<dyn QueryDialect>) -> Self {
        Self { mode, dialect }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn generate(&self, table: &TableName, row: &Row) -> Result<String, MigrationError> {
        if table.as_str().is_empty() {
            return Err(MigrationError::InvalidInput(
                "statement target table is empty".into(),
            ));
        }
        if row.is_empty() {
            return Err(MigrationError::InvalidInput(format!(
                "row for {} has no columns",
                table
            )));
        }

        let d = self.dialect.as_ref();
        let columns: Vec<String> = row.iter().map(|(c, _)| d.ident(c)).collect();
        let values: Vec<String> = row.iter().map(|(_, v)| d.sql_literal(v)).collect();

        let verb = match self.mode {
            WriteMode::Overwrite => "REPLACE",
            WriteMode::Append | WriteMode::Update => "INSERT",
        };

        let mut stmt = format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            d.ident(table.as_str()),
            columns.join(", "),
            values.join(", ")
        );

        if self.mode == WriteMode::Update {
            let assignments: Vec<String> = columns
                .iter()
                .map(|c| format!("{c}=VALUES({c})"))
                .collect();
            stmt.push_str(" ON DUPLICATE KEY UPDATE ");
            stmt.push_str(&assignments.join(", "));
        }

        stmt.push_str(";\n");
        Ok(stmt)
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Split SQL text into complete statements.
///
/// Blank lines and `--` comment lines between statements are skipped. A
/// statement ends at the first line whose trimmed text ends with `;`.
/// Anything left after the last terminator is returned as the tail.
pub fn split_statements(text: &str) -> (Vec<String>, Option<String>) {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        if trimmed.ends_with(';') {
            statements.push(std::mem::take(&mut current).trim().to_string());
        }
    }

    let tail = current.trim();
    let tail = (!tail.is_empty()).then(|| tail.to_string());
    (statements, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn widget() -> Row {
        Row::new().with("id", "7").with("name", "Widget")
    }

    #[test]
    fn overwrite_uses_replace() {
        let stmt = StatementGenerator::new(WriteMode::Overwrite)
            .generate(&TableName("items".into()), &widget())
            .unwrap();
        assert_eq!(stmt, "REPLACE INTO items (id, name) VALUES ('7', 'Widget');\n");
    }

    #[test]
    fn append_is_plain_insert() {
        let stmt = StatementGenerator::new(WriteMode::Append)
            .generate(&TableName("items".into()), &widget())
            .unwrap();
        assert_eq!(stmt, "INSERT INTO items (id, name) VALUES ('7', 'Widget');\n");
    }

    #[test]
    fn update_assigns_every_column() {
        let stmt = StatementGenerator::new(WriteMode::Update)
            .generate(&TableName("items".into()), &widget())
            .unwrap();
        assert_eq!(
            stmt,
            "INSERT INTO items (id, name) VALUES ('7', 'Widget') \
             ON DUPLICATE KEY UPDATE id=VALUES(id), name=VALUES(name);\n"
        );
    }

    #[test]
    fn null_and_reserved_columns() {
        let row = Row::new()
            .with("meta_id", 1)
            .with("key", "a'b")
            .with("parent", Value::Null);
        let stmt = StatementGenerator::new(WriteMode::Append)
            .generate(&TableName("wp_postmeta".into()), &row)
            .unwrap();
        assert_eq!(
            stmt,
            "INSERT INTO wp_postmeta (meta_id, `key`, parent) VALUES ('1', 'a\\'b', NULL);\n"
        );
    }

    #[test]
    fn rejects_empty_row_and_table() {
        let g = StatementGenerator::new(WriteMode::Append);
        assert!(matches!(
            g.generate(&TableName("t".into()), &Row::new()),
            Err(MigrationError::InvalidInput(_))
        ));
        assert!(matches!(
            g.generate(&TableName(String::new()), &widget()),
            Err(MigrationError::InvalidInput(_))
        ));
    }

    #[test]
    fn multiline_values_stay_on_one_line() {
        let row = Row::new().with("post_content", "a\nb;\n");
        let stmt = StatementGenerator::new(WriteMode::Append)
            .generate(&TableName("wp_posts".into()), &row)
            .unwrap();
        assert_eq!(stmt.matches('\n').count(), 1);
        let (parsed, tail) = split_statements(&stmt);
        assert_eq!(parsed.len(), 1);
        assert!(tail.is_none());
    }

    #[test]
    fn split_skips_comments_and_reports_tail() {
        let text = "-- header\n\nINSERT INTO a (x) VALUES ('1');\n\
                    -- BEGIN PRODUCT TAGS\nINSERT INTO a (x) VALUES ('2');\nINSERT INTO a (x) VAL";
        let (stmts, tail) = split_statements(text);
        assert_eq!(
            stmts,
            vec![
                "INSERT INTO a (x) VALUES ('1');",
                "INSERT INTO a (x) VALUES ('2');"
            ]
        );
        assert_eq!(tail.as_deref(), Some("INSERT INTO a (x) VAL"));
    }

    #[test]
    fn split_joins_multiline_statements() {
        let (stmts, tail) = split_statements("INSERT INTO a\n(x) VALUES ('1');\n");
        assert_eq!(stmts, vec!["INSERT INTO a\n(x) VALUES ('1');"]);
        assert!(tail.is_none());
    }
}
