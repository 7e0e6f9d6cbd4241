//! Typed, parameterised statements.

use crate::catalog::TableRef;
use crate::value::Value;

/// Row predicate over named columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq(String, Value),
    /// Text column equals text, ignoring case.
    EqIgnoreCase(String, String),
    /// Column differs from value. Null never matches.
    Ne(String, Value),
    /// All predicates hold.
    And(Vec<Filter>),
}

impl Filter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    /// `UPPER(column) = UPPER(text)`.
    pub fn eq_ignore_case(column: impl Into<String>, text: impl Into<String>) -> Self {
        Filter::EqIgnoreCase(column.into(), text.into())
    }

    /// `column <> value`.
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(column.into(), value.into())
    }

    /// Conjunction with another predicate.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

/// `SELECT columns FROM table WHERE filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Table or view to read.
    pub table: TableRef,
    /// Output columns; all when `None`.
    pub columns: Option<Vec<String>>,
    /// Row predicate.
    pub filter: Option<Filter>,
}

impl Select {
    /// Select every column of every row.
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: None,
            filter: None,
        }
    }

    /// Restrict the output columns.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a predicate, combined with any existing one.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }
}

/// `INSERT INTO table (columns) VALUES (values)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table or view.
    pub table: TableRef,
    /// Column assignments. Omitted columns take their default.
    pub values: Vec<(String, Value)>,
}

impl Insert {
    /// Insert into a table.
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            values: Vec::new(),
        }
    }

    /// Assign a column.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Whether a column is assigned (case-insensitive).
    pub fn assigns(&self, column: &str) -> bool {
        self.values.iter().any(|(c, _)| c.eq_ignore_ascii_case(column))
    }
}

/// `DELETE FROM table WHERE filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: TableRef,
    /// Row predicate; all rows when `None`.
    pub filter: Option<Filter>,
}

impl Delete {
    /// Delete every row of a table.
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            filter: None,
        }
    }

    /// Add a predicate, combined with any existing one.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_combine_into_conjunction() {
        let select = Select::new(TableRef::new("mac", "credential"))
            .filter(Filter::eq("sensitivity_id", 1i64))
            .filter(Filter::eq("compartment_id", 2i64))
            .filter(Filter::ne("credential_id", 0i64));

        match select.filter {
            Some(Filter::And(filters)) => assert_eq!(filters.len(), 3),
            other => panic!("expected conjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_assigns_ignores_case() {
        let insert = Insert::new(TableRef::new("mac", "marking")).value("Sensitivity_Id", 1i64);
        assert!(insert.assigns("SENSITIVITY_ID"));
        assert!(!insert.assigns("MARKING_ID"));
    }
}
