//! Constraint validation logic.
//!
//! The ConstraintValidator checks the constraints of a table before a row
//! is written or removed. Values are expected to be converted to their
//! column types already.

use crate::catalog::{ConstraintDef, ForeignKeyDef, IndexDef, SchemaSet, TableDef};
use crate::error::{ConstraintError, Error};
use crate::storage::{key, Transaction};
use crate::value::Value;

use super::index;

/// Constraint validator for enforcing table constraints.
pub struct ConstraintValidator<'a> {
    schemas: &'a SchemaSet,
}

impl<'a> ConstraintValidator<'a> {
    /// Create a new constraint validator.
    pub fn new(schemas: &'a SchemaSet) -> Self {
        Self { schemas }
    }

    /// Validate all constraints for an insert.
    ///
    /// Checks:
    /// - Not-null columns
    /// - Unique indexes (a key containing null never conflicts). Each key
    ///   is claimed on the transaction and rechecked when it commits.
    /// - Foreign keys (the referenced row must exist, or the value is the
    ///   constraint's reserved value)
    pub fn validate_insert(
        &self,
        tx: &mut Transaction<'_>,
        table: &TableDef,
        values: &[Value],
    ) -> Result<(), Error> {
        for (column, value) in table.columns.iter().zip(values) {
            if value.is_null() && !column.nullable {
                return Err(ConstraintError::NotNullViolation {
                    table: table.qualified_name(),
                    column: column.name.clone(),
                }
                .into());
            }
        }

        for idx in table.indexes.iter().filter(|i| i.unique) {
            self.check_unique(tx, table, idx, values)?;
        }

        for fk in table.foreign_keys() {
            self.check_foreign_key(tx, table, fk, values)?;
        }

        Ok(())
    }

    /// Validate that a row may be removed: no other row may still reference
    /// it through a foreign key.
    pub fn validate_delete(
        &self,
        tx: &Transaction<'_>,
        table: &TableDef,
        row_id: u64,
        values: &[Value],
    ) -> Result<(), Error> {
        let target = table.table_ref();
        for referencing in self.schemas.tables() {
            for fk in referencing.foreign_keys().filter(|fk| fk.references == target) {
                let ref_values = column_values(table, &fk.ref_columns, values)?;
                if ref_values.iter().any(|v| v.is_null()) {
                    continue;
                }
                let fk_index = referencing
                    .index(&fk.index)
                    .ok_or_else(|| Error::ObjectNotFound(fk.index.clone()))?;
                let rows = index::lookup(tx, fk_index, &ref_values)?;
                let self_reference = referencing.id == table.id && rows.iter().all(|r| *r == row_id);
                if !rows.is_empty() && !self_reference {
                    return Err(ConstraintError::ForeignKeyViolation {
                        constraint: fk.name.clone(),
                        table: referencing.qualified_name(),
                        value: display_values(&ref_values),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_unique(
        &self,
        tx: &mut Transaction<'_>,
        table: &TableDef,
        idx: &IndexDef,
        values: &[Value],
    ) -> Result<(), Error> {
        let key_values = index::index_values(table, idx, values)?;
        if key_values.iter().any(|v| v.is_null()) {
            return Ok(());
        }
        if !index::lookup(tx, idx, &key_values)?.is_empty() {
            return Err(unique_violation(table, idx, &key_values).into());
        }
        tx.claim_unique(
            key::index_value_prefix(idx.id, &key_values),
            unique_violation(table, idx, &key_values),
        );
        Ok(())
    }

    fn check_foreign_key(
        &self,
        tx: &Transaction<'_>,
        table: &TableDef,
        fk: &ForeignKeyDef,
        values: &[Value],
    ) -> Result<(), Error> {
        let fk_values = column_values(table, &fk.columns, values)?;
        if fk_values.iter().any(|v| v.is_null()) {
            return Ok(());
        }
        if let (Some(reserved), [value]) = (&fk.reserved, fk_values.as_slice()) {
            if reserved == *value {
                return Ok(());
            }
        }

        let referenced = self.schemas.table(&fk.references)?;
        let ref_index = referenced
            .index(&fk.ref_index)
            .ok_or_else(|| Error::ObjectNotFound(fk.ref_index.clone()))?;
        if index::lookup(tx, ref_index, &fk_values)?.is_empty() {
            return Err(ConstraintError::ForeignKeyViolation {
                constraint: fk.name.clone(),
                table: table.qualified_name(),
                value: display_values(&fk_values),
            }
            .into());
        }
        Ok(())
    }
}

fn column_values<'v>(
    table: &TableDef,
    columns: &[String],
    values: &'v [Value],
) -> Result<Vec<&'v Value>, Error> {
    columns
        .iter()
        .map(|c| {
            table
                .column_index(c)
                .and_then(|i| values.get(i))
                .ok_or_else(|| Error::UnknownColumn {
                    table: table.qualified_name(),
                    column: c.clone(),
                })
        })
        .collect()
}

fn display_values(values: &[&Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn unique_violation(table: &TableDef, idx: &IndexDef, key_values: &[&Value]) -> ConstraintError {
    let constraint = table
        .constraints
        .iter()
        .find_map(|c| match c {
            ConstraintDef::PrimaryKey { name, index, .. } | ConstraintDef::Unique { name, index, .. }
                if *index == idx.name =>
            {
                Some(name.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| idx.name.clone());
    ConstraintError::UniqueViolation {
        constraint,
        table: table.qualified_name(),
        value: display_values(key_values),
    }
}

