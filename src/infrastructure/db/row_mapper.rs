use anyhow::Result;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row as _};

use crate::domain::row::Row;
use crate::infrastructure::db::dialect::RowDecoder;

/// Convert a sqlx `MySqlRow` into a domain [`Row`].
///
/// Columns are kept in result order. `decoder` is the dialect-specific
/// `RowDecoder` that turns a column index into the right `serde_json::Value`.
pub fn row_to_row(row: &MySqlRow, decoder: &dyn RowDecoder) -> Result<Row> {
    let mut out = Row::new();
    for col in row.columns() {
        let value = decoder.decode_column(row, col.ordinal())?;
        out.push(col.name(), value);
    }
    Ok(out)
}
