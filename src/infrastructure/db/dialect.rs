use anyhow::Result;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::Row as _;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// SQL dialect: identifier quoting and literal formatting.
///
/// The interface is pure string manipulation with no sqlx dependency, so the
/// statement generator and the query builders can share it.
pub trait QueryDialect: Send + Sync {
    /// Return the driver name as a lowercase string. Used for log and
    /// header metadata only.
    fn name(&self) -> &'static str;

    /// Quote an identifier only when it has to be: bare when it is a plain
    /// `[A-Za-z_][A-Za-z0-9_]*` word that is not reserved, quoted otherwise.
    fn ident(&self, s: &str) -> String {
        if is_plain_identifier(s) && !self.is_reserved(s) {
            s.to_string()
        } else {
            self.quote_ident(s)
        }
    }

    /// Unconditionally quote an identifier.
    fn quote_ident(&self, s: &str) -> String;

    /// `true` if `word` must be quoted when used as an identifier.
    fn is_reserved(&self, word: &str) -> bool;

    /// Format a JSON `Value` as an SQL literal.
    /// - NULL          → `NULL`
    /// - String        → `'escaped'`
    /// - Number / Bool → quoted text (`'7'`, `'1'`); the server coerces
    /// - Object/Array  → quoted JSON text
    fn sql_literal(&self, val: &Value) -> String {
        match val {
            Value::Null => "NULL".to_string(),
            Value::String(s) => format!("'{}'", self.escape_str(s)),
            Value::Bool(b) => if *b { "'1'" } else { "'0'" }.to_string(),
            Value::Number(n) => format!("'{}'", n),
            Value::Array(_) | Value::Object(_) => {
                let json_str = serde_json::to_string(val).unwrap_or_default();
                format!("'{}'", self.escape_str(&json_str))
            }
        }
    }

    /// Escape the body of a string literal.
    fn escape_str(&self, s: &str) -> String;
}

/// Row decoder: read every column of a driver row into a `serde_json::Value`.
///
/// Lives in infrastructure only: callers outside this module receive
/// `Value`s, never raw driver rows.
pub trait RowDecoder: Send + Sync {
    fn decode_column(&self, row: &MySqlRow, idx: usize) -> Result<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// MySQL / MariaDB
// ─────────────────────────────────────────────────────────────────────────────

pub struct MysqlDialect;

/// Reserved words likely to show up as column names in exported tables.
const MYSQL_RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHANGE", "CHECK",
    "COLUMN", "CONDITION", "CREATE", "CROSS", "DATABASE", "DEFAULT", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "EXISTS", "FOR", "FROM", "FULLTEXT", "GROUP", "HAVING", "IN",
    "INDEX", "INSERT", "INTERVAL", "INTO", "IS", "JOIN", "KEY", "KEYS", "LEFT", "LIKE", "LIMIT",
    "LOCK", "MATCH", "NOT", "NULL", "ON", "OPTION", "OR", "ORDER", "OUTER", "PRIMARY", "RANGE",
    "READ", "REFERENCES", "RENAME", "REPLACE", "RIGHT", "SELECT", "SET", "SHOW", "TABLE",
    "THEN", "TO", "UNION", "UNIQUE", "UPDATE", "USAGE", "USE", "USING", "VALUES", "WHEN",
    "WHERE", "WITH", "WRITE",
];

impl QueryDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn is_reserved(&self, word: &str) -> bool {
        let upper = word.to_ascii_uppercase();
        MYSQL_RESERVED.contains(&upper.as_str())
    }

    /// Backslash escaping as understood by MySQL without
    /// `NO_BACKSLASH_ESCAPES`. Line breaks are escaped as well, so every
    /// generated statement occupies exactly one line.
    fn escape_str(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 8);
        for ch in s.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out
    }
}

impl RowDecoder for MysqlDialect {
    /// Queries run over the text protocol, so every non-NULL value arrives
    /// as text regardless of its column type (DATETIME zero dates included).
    /// Binary payloads that are not valid UTF-8 are decoded lossily.
    fn decode_column(&self, row: &MySqlRow, idx: usize) -> Result<Value> {
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(v) => Ok(v.map_or(Value::Null, Value::String)),
            Err(_) => {
                let bytes: Option<Vec<u8>> = row.try_get_unchecked(idx)?;
                Ok(bytes.map_or(Value::Null, |b| {
                    Value::String(String::from_utf8_lossy(&b).into_owned())
                }))
            }
        }
    }
}

/// Combined supertrait, so callers only store one object.
pub trait Dialect: QueryDialect + RowDecoder {}
impl Dialect for MysqlDialect {}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
