use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Newtype for fully-qualified (prefixed) table names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(pub String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// SHA-256 hex fingerprint of an exported file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Returns the raw hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Table-name prefix shared by every table of one installation (`wp_`, `shop_`, …).
///
/// Source and destination prefixes differ when migrating between installs;
/// [`TablePrefix::table`] is the only place a prefix and a base name are joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePrefix(pub String);

impl TablePrefix {
    pub fn table(&self, base: &str) -> TableName {
        TableName(format!("{}{}", self.0, base))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TablePrefix {
    fn default() -> Self {
        TablePrefix("wp_".to_string())
    }
}

impl fmt::Display for TablePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Conflict policy applied to every statement generated during one run.
///
/// | Variant     | Statement                                   | Re-run effect      |
/// |-------------|---------------------------------------------|--------------------|
/// | `Append`    | `INSERT INTO …`                             | duplicates / fails |
/// | `Overwrite` | `REPLACE INTO …`                            | idempotent         |
/// | `Update`    | `INSERT INTO … ON DUPLICATE KEY UPDATE …`   | idempotent         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
    Update,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Overwrite => "overwrite",
            WriteMode::Update => "update",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "overwrite" => Ok(WriteMode::Overwrite),
            "update" => Ok(WriteMode::Update),
            other => Err(format!(
                "unknown write mode '{}' (expected append, overwrite or update)",
                other
            )),
        }
    }
}

/// How export output is delivered.
///
/// `Progress` writes size-split files per group under a timestamped run
/// directory. `Direct` streams every group, in order, into one writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMethod {
    #[default]
    Progress,
    Direct,
}

impl FromStr for OutputMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "progress" => Ok(OutputMethod::Progress),
            "direct" => Ok(OutputMethod::Direct),
            other => Err(format!(
                "unknown output method '{}' (expected progress or direct)",
                other
            )),
        }
    }
}
