//! Statement results.

use serde::Serialize;

use crate::value::Value;

/// Rows returned by a select, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Output column names.
    pub columns: Vec<String>,
    /// Rows in output column order.
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Create a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value at a row and named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let i = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(i))
    }

    /// All values of a named column.
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(i) => self.rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }
}
