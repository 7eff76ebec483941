//! Fetched rows.

use std::sync::Arc;

use super::value::{PkValue, SqlValue};

/// Name of the primary key column every copied table carries.
pub const ID_COLUMN: &str = "id";

/// One record as fetched from the source: column names with their values, in
/// the order the source returned them.
///
/// The column list is shared between all rows of a fetch, so cloning a row
/// only copies its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(columns.into(), values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The shared column list.
    pub fn column_set(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column`, if the row has that column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.position(column).map(|i| &self.values[i])
    }

    /// Set `column` to NULL. Returns false if the row has no such column.
    pub fn set_null(&mut self, column: &str) -> bool {
        match self.position(column) {
            Some(i) => {
                self.values[i] = SqlValue::Null;
                true
            }
            None => false,
        }
    }

    /// The primary key value.
    pub fn id(&self) -> Option<&SqlValue> {
        self.get(ID_COLUMN)
    }

    /// The primary key in key form.
    pub fn key(&self) -> Option<PkValue> {
        self.id().and_then(SqlValue::as_key)
    }

    /// The primary key rendered for log lines.
    pub fn display_id(&self) -> String {
        match self.id() {
            Some(v) => v.to_string(),
            None => "<no id>".to_string(),
        }
    }

    /// Whether `other` has exactly the same columns in the same order.
    pub fn same_columns(&self, other: &Row) -> bool {
        Arc::ptr_eq(&self.columns, &other.columns) || self.columns == other.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_bu() -> Row {
        Row::from_pairs([
            ("id", SqlValue::Int(1)),
            ("name", SqlValue::from("Pune office")),
            ("state_id", SqlValue::Int(77)),
        ])
    }

    #[test]
    fn test_get_and_id() {
        let row = client_bu();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("state_id"), Some(&SqlValue::Int(77)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.key(), Some(PkValue::Int(1)));
        assert_eq!(row.display_id(), "1");
    }

    #[test]
    fn test_set_null_on_clone_leaves_original() {
        let original = client_bu();
        let mut cleaned = original.clone();
        assert!(cleaned.set_null("state_id"));
        assert!(!cleaned.set_null("city_id"));
        assert_eq!(cleaned.get("state_id"), Some(&SqlValue::Null));
        assert_eq!(original.get("state_id"), Some(&SqlValue::Int(77)));
        assert!(original.same_columns(&cleaned));
    }

    #[test]
    fn test_display_id_without_id() {
        let row = Row::from_pairs([("code", "MH")]);
        assert_eq!(row.display_id(), "<no id>");
        assert_eq!(row.key(), None);
    }
}
