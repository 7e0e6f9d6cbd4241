//! Filter evaluation for statement execution.

use std::collections::HashMap;

use super::Filter;
use crate::catalog::TableDef;
use crate::error::Error;
use crate::value::Value;

/// A filter with column names resolved to positions and values converted
/// to the column types.
#[derive(Debug, Clone)]
pub enum BoundFilter {
    /// Column at position equals value.
    Eq(usize, Value),
    /// Text column at position equals upper-cased text.
    EqIgnoreCase(usize, String),
    /// Column at position differs from value.
    Ne(usize, Value),
    /// All predicates hold.
    And(Vec<BoundFilter>),
}

impl BoundFilter {
    /// Resolve a filter against a table's columns.
    pub fn bind(filter: &Filter, table: &TableDef) -> Result<Self, Error> {
        let position = |column: &str| {
            table.column_index(column).ok_or_else(|| Error::UnknownColumn {
                table: table.qualified_name(),
                column: column.to_string(),
            })
        };
        let convert = |i: usize, value: &Value| {
            let column = &table.columns[i];
            column
                .column_type
                .convert(value.clone())
                .ok_or_else(|| Error::InvalidData(format!(
                    "cannot compare {}.{} ({}) with {}",
                    table.qualified_name(),
                    column.name,
                    column.column_type,
                    value.type_name()
                )))
        };

        Ok(match filter {
            Filter::Eq(column, value) => {
                let i = position(column)?;
                BoundFilter::Eq(i, convert(i, value)?)
            }
            Filter::EqIgnoreCase(column, text) => {
                BoundFilter::EqIgnoreCase(position(column)?, text.to_uppercase())
            }
            Filter::Ne(column, value) => {
                let i = position(column)?;
                BoundFilter::Ne(i, convert(i, value)?)
            }
            Filter::And(filters) => BoundFilter::And(
                filters
                    .iter()
                    .map(|f| Self::bind(f, table))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Evaluate against a row. Comparisons with null are false.
    pub fn matches(&self, row: &[Value]) -> bool {
        match self {
            BoundFilter::Eq(i, value) => match row.get(*i) {
                Some(Value::Null) | None => false,
                Some(v) => v == value,
            },
            BoundFilter::EqIgnoreCase(i, text) => match row.get(*i) {
                Some(Value::String(s)) => s.to_uppercase() == *text,
                _ => false,
            },
            BoundFilter::Ne(i, value) => match row.get(*i) {
                Some(Value::Null) | None => false,
                Some(v) => !value.is_null() && v != value,
            },
            BoundFilter::And(filters) => filters.iter().all(|f| f.matches(row)),
        }
    }

    /// Equality conjuncts usable for an index lookup, by column position.
    pub fn equalities(&self) -> HashMap<usize, &Value> {
        let mut out = HashMap::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'f>(&'f self, out: &mut HashMap<usize, &'f Value>) {
        match self {
            BoundFilter::Eq(i, value) if !value.is_null() => {
                out.insert(*i, value);
            }
            BoundFilter::And(filters) => filters.iter().for_each(|f| f.collect_equalities(out)),
            _ => {}
        }
    }
}
