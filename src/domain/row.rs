use serde::Serialize;
use serde_json::Value;

/// One result tuple, columns kept in the order the data source returned them.
///
/// Unlike a `BTreeMap`, insertion order is preserved so generated statements
/// list columns exactly as the source table declares them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy in fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// First value stored under `column`, if any.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Value of `column` rendered as plain text. `NULL` and missing columns
    /// both yield `None`.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// New row holding only `columns`, in the order given. Columns absent
    /// from `self` become `NULL`.
    pub fn project(&self, columns: &[&str]) -> Row {
        columns
            .iter()
            .map(|c| (c.to_string(), self.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row {
            columns: iter.into_iter().collect(),
        }
    }
}
