//! Statement executor.
//!
//! Runs typed statements against a transaction. Equality predicates that
//! cover an index are answered through the index; everything else is a scan
//! of the table's rows.

use tracing::debug;

use super::filter::BoundFilter;
use super::view::{self, ViewContext};
use super::{Delete, Insert, ResultSet, Select};
use crate::catalog::{IndexDef, Object, SchemaSet, TableDef, TableKind};
use crate::constraint::{index, ConstraintValidator};
use crate::error::{ConstraintError, Error};
use crate::storage::{Record, Transaction};
use crate::value::Value;

/// A row id and the row's values in column order.
pub type Row = (u64, Vec<Value>);

/// Executes statements against one catalog snapshot.
pub struct StatementExecutor<'s> {
    schemas: &'s SchemaSet,
    context: Option<&'s dyn ViewContext>,
}

impl<'s> StatementExecutor<'s> {
    /// Create an executor without session context. Session-local tables are
    /// empty and marking ids cannot be rendered.
    pub fn new(schemas: &'s SchemaSet) -> Self {
        Self {
            schemas,
            context: None,
        }
    }

    /// Create an executor that reads session-local state from `context`.
    pub fn with_context(schemas: &'s SchemaSet, context: &'s dyn ViewContext) -> Self {
        Self {
            schemas,
            context: Some(context),
        }
    }

    /// The catalog snapshot.
    pub fn schemas(&self) -> &'s SchemaSet {
        self.schemas
    }

    /// Run a select over a table or view.
    pub fn select(&self, tx: &Transaction<'_>, select: &Select) -> Result<ResultSet, Error> {
        match self.schemas.object(&select.table)? {
            Object::Table(table) => self.select_table(tx, table, select),
            Object::View(def) => view::execute(self, tx, def, select),
        }
    }

    /// Run a select expected to yield at most one row of one column.
    ///
    /// Returns `None` for no rows and fails when more than one row matches.
    pub fn select_value(&self, tx: &Transaction<'_>, select: &Select) -> Result<Option<Value>, Error> {
        let result = self.select(tx, select)?;
        match result.rows.len() {
            0 => Ok(None),
            1 => Ok(result.rows.into_iter().next().and_then(|r| r.into_iter().next())),
            n => Err(Error::InvalidData(format!(
                "expected at most one row from {}, got {}",
                select.table, n
            ))),
        }
    }

    fn select_table(
        &self,
        tx: &Transaction<'_>,
        table: &TableDef,
        select: &Select,
    ) -> Result<ResultSet, Error> {
        let filter = select
            .filter
            .as_ref()
            .map(|f| BoundFilter::bind(f, table))
            .transpose()?;
        let rows = self.scan(tx, table, filter.as_ref())?;
        project(table, select.columns.as_deref(), rows.into_iter().map(|(_, r)| r))
    }

    /// Rows of a table matching a filter, in row id order.
    pub fn scan(
        &self,
        tx: &Transaction<'_>,
        table: &TableDef,
        filter: Option<&BoundFilter>,
    ) -> Result<Vec<Row>, Error> {
        let rows: Vec<Row> = match table.kind {
            TableKind::SessionMarkings => self.session_rows(),
            TableKind::Base => match filter.and_then(|f| choose_index(table, f)) {
                Some((idx, key)) => {
                    let mut rows = Vec::new();
                    for row_id in index::lookup(tx, idx, &key)? {
                        if let Some(record) = tx.get_record(table.id, row_id)? {
                            rows.push((row_id, record.values));
                        }
                    }
                    rows
                }
                None => tx
                    .scan_records(table.id)?
                    .into_iter()
                    .map(|(id, record)| (id, record.values))
                    .collect(),
            },
        };

        Ok(match filter {
            Some(f) => rows.into_iter().filter(|(_, r)| f.matches(r)).collect(),
            None => rows,
        })
    }

    fn session_rows(&self) -> Vec<Row> {
        self.context
            .map(|c| c.session_markings())
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (i as u64 + 1, vec![Value::from(id)]))
            .collect()
    }

    pub(crate) fn context(&self) -> Option<&'s dyn ViewContext> {
        self.context
    }

    /// Insert a row into a table and return its identity (the row id).
    ///
    /// Omitted columns take their default, identity columns take the row id.
    pub fn insert(&self, tx: &mut Transaction<'_>, insert: &Insert) -> Result<u64, Error> {
        let table = match self.schemas.object(&insert.table)? {
            Object::Table(table) => table,
            Object::View(view) => {
                return Err(Error::Unsupported(format!(
                    "view {} is read-only",
                    view.table_ref()
                )))
            }
        };
        if table.kind != TableKind::Base {
            return Err(Error::Unsupported(format!(
                "{} is session-local",
                table.qualified_name()
            )));
        }

        let mut assigned: Vec<Option<Value>> = vec![None; table.columns.len()];
        for (name, value) in &insert.values {
            let i = table.column_index(name).ok_or_else(|| Error::UnknownColumn {
                table: table.qualified_name(),
                column: name.clone(),
            })?;
            let column = &table.columns[i];
            if assigned[i].is_some() {
                return Err(Error::InvalidData(format!(
                    "column {} assigned twice",
                    column.name
                )));
            }
            if column.identity {
                return Err(Error::Unsupported(format!(
                    "identity column {}.{} cannot be assigned",
                    table.qualified_name(),
                    column.name
                )));
            }
            assigned[i] = Some(convert(table, i, value.clone())?);
        }

        let row_id = tx.next_row_id(table.id)?;
        let mut row = Vec::with_capacity(table.columns.len());
        for (i, (column, value)) in table.columns.iter().zip(assigned).enumerate() {
            let value = match value {
                Some(v) => v,
                None if column.identity => Value::from(row_id),
                None => match &column.default {
                    Some(default) => convert(table, i, default.clone())?,
                    None => Value::Null,
                },
            };
            row.push(value);
        }

        ConstraintValidator::new(self.schemas).validate_insert(tx, table, &row)?;
        index::insert_entries(tx, table, row_id, &row)?;
        tx.put_record(table.id, row_id, &Record::new(row))?;

        debug!(table = %table.qualified_name(), row_id, "row inserted");
        Ok(row_id)
    }

    /// Delete matching rows from a table. Returns the number of rows removed.
    pub fn delete(&self, tx: &mut Transaction<'_>, delete: &Delete) -> Result<usize, Error> {
        let table = self.schemas.table(&delete.table)?;
        if table.kind != TableKind::Base {
            return Err(Error::Unsupported(format!(
                "{} is session-local",
                table.qualified_name()
            )));
        }
        let filter = delete
            .filter
            .as_ref()
            .map(|f| BoundFilter::bind(f, table))
            .transpose()?;

        let rows = self.scan(tx, table, filter.as_ref())?;
        self.remove_rows(tx, table, &rows)?;
        debug!(table = %table.qualified_name(), rows = rows.len(), "rows deleted");
        Ok(rows.len())
    }

    fn remove_rows(&self, tx: &mut Transaction<'_>, table: &TableDef, rows: &[Row]) -> Result<(), Error> {
        let validator = ConstraintValidator::new(self.schemas);
        for (row_id, values) in rows {
            // Earlier removals are visible to the check through the overlay.
            index::remove_entries(tx, table, *row_id, values)?;
            tx.remove_record(table.id, *row_id);
            validator.validate_delete(tx, table, *row_id, values)?;
        }
        Ok(())
    }

    /// Remove every row and index entry of a table, ignoring foreign keys.
    /// Used when the table itself is dropped.
    pub fn truncate(&self, tx: &mut Transaction<'_>, table: &TableDef) -> Result<usize, Error> {
        let rows = tx.scan_records(table.id)?;
        for (row_id, _) in &rows {
            tx.remove_record(table.id, *row_id);
        }
        for idx in &table.indexes {
            index::clear(tx, idx)?;
        }
        Ok(rows.len())
    }
}

/// Convert a value to the type of the column at position `i`.
fn convert(table: &TableDef, i: usize, value: Value) -> Result<Value, Error> {
    let column = &table.columns[i];
    let actual = value.type_name();
    column.column_type.convert(value).ok_or_else(|| {
        ConstraintError::TypeMismatch {
            table: table.qualified_name(),
            column: column.name.clone(),
            expected: column.column_type.to_string(),
            actual: actual.to_string(),
        }
        .into()
    })
}

/// Pick the index whose columns are all bound by equality, preferring
/// unique indexes and then the widest key.
fn choose_index<'t, 'f>(
    table: &'t TableDef,
    filter: &'f BoundFilter,
) -> Option<(&'t IndexDef, Vec<&'f Value>)> {
    let equalities = filter.equalities();
    if equalities.is_empty() {
        return None;
    }
    table
        .indexes
        .iter()
        .filter_map(|idx| {
            let key = idx
                .columns
                .iter()
                .map(|c| table.column_index(c).and_then(|i| equalities.get(&i).copied()))
                .collect::<Option<Vec<&'f Value>>>()?;
            Some((idx, key))
        })
        .max_by_key(|(idx, key)| (idx.unique, key.len()))
}

/// Project rows of a table onto the requested columns.
fn project(
    table: &TableDef,
    columns: Option<&[String]>,
    rows: impl Iterator<Item = Vec<Value>>,
) -> Result<ResultSet, Error> {
    let positions: Vec<usize> = match columns {
        None => (0..table.columns.len()).collect(),
        Some(names) => names
            .iter()
            .map(|n| {
                table.column_index(n).ok_or_else(|| Error::UnknownColumn {
                    table: table.qualified_name(),
                    column: n.clone(),
                })
            })
            .collect::<Result<_, _>>()?,
    };
    let names = positions.iter().map(|&i| table.columns[i].name.clone()).collect();
    let rows = rows
        .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(ResultSet::new(names, rows))
}
