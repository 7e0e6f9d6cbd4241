//! Row tagging on write.
//!
//! An insert through a security view is rewritten into an insert into the
//! shadow table with the row's marking id in `MARKING_ID`. The marking is
//! resolved (created if new) before the rewrite. Deletes through a security
//! view are scoped the same way, one active marking at a time.

use super::error::{MacError, MacResult};
use super::label::Marking;
use super::{MAC_SCHEMA, MARKING, MARKING_ID};
use crate::catalog::{Object, SchemaSet, TableDef, TableRef, ViewDef};
use crate::error::Error;
use crate::query::{Filter, Insert};
use crate::value::Value;

/// Where a user insert lands.
#[derive(Debug, Clone, Copy)]
pub enum WriteTarget<'a> {
    /// An ordinary table; the row is written unchanged.
    Table(&'a TableDef),
    /// A security view; the row is tagged and written to the shadow table.
    Restricted {
        /// The security view named by the insert.
        view: &'a ViewDef,
        /// Its shadow table.
        shadow: &'a TableDef,
    },
}

/// Route a user insert.
///
/// A marking may only accompany an insert into a restricted table. The
/// label store and shadow schemas are never written directly, and callers
/// never supply the marking columns themselves.
pub fn write_target<'a>(
    schemas: &'a SchemaSet,
    insert: &Insert,
    marking: Option<&Marking>,
) -> MacResult<WriteTarget<'a>> {
    let table = match schemas.object(&insert.table)? {
        Object::Table(table) => table,
        Object::View(view) => {
            let Some(shadow) = view.shadow() else {
                check_marking_allowed(marking, &insert.table)?;
                return Err(Error::Unsupported(format!("view {} is read-only", insert.table)).into());
            };
            for column in [MARKING_ID, MARKING] {
                if insert.assigns(column) {
                    return Err(MacError::ProtectedObject(format!(
                        "column {} of {}",
                        column,
                        view.table_ref()
                    )));
                }
            }
            return Ok(WriteTarget::Restricted {
                view,
                shadow: schemas.table(shadow)?,
            });
        }
    };

    check_marking_allowed(marking, &insert.table)?;
    check_writable(schemas, &table.table_ref())?;
    Ok(WriteTarget::Table(table))
}

/// Fail if a user may not write the object directly.
pub fn check_writable(schemas: &SchemaSet, table: &TableRef) -> MacResult<()> {
    if table.schema == MAC_SCHEMA || schemas.is_shadow_schema(&table.schema) {
        return Err(MacError::ProtectedObject(table.to_string()));
    }
    Ok(())
}

fn check_marking_allowed(marking: Option<&Marking>, table: &TableRef) -> MacResult<()> {
    match marking {
        Some(_) => Err(MacError::MarkingOnUnrestrictedTable(table.to_string())),
        None => Ok(()),
    }
}

/// Rewrite an insert into a security view as an insert into its shadow
/// table carrying the marking's identity.
pub fn tag_insert(insert: &Insert, shadow: &TableDef, marking: &Marking) -> MacResult<Insert> {
    let Some(marking_id) = marking.id() else {
        return Err(MacError::UnresolvedMarking(shadow.qualified_name()));
    };
    let mut tagged = Insert::new(shadow.table_ref());
    tagged.values = insert.values.clone();
    Ok(tagged.value(MARKING_ID, Value::from(marking_id)))
}

/// A security-view delete filter, applied to the rows of one marking.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkingScope {
    /// The filter's `MARKING` predicates reject this marking.
    Excluded,
    /// Delete the marking's rows that match this shadow table filter.
    Rows(Option<Filter>),
}

/// Evaluate the `MARKING` predicates of a view filter against one rendered
/// marking and keep the rest for the shadow table.
pub fn scope_to_marking(filter: Option<&Filter>, rendered: &str) -> MarkingScope {
    match filter.map(|f| split_marking(f, rendered)) {
        None => MarkingScope::Rows(None),
        Some(None) => MarkingScope::Excluded,
        Some(Some(rest)) => MarkingScope::Rows(rest),
    }
}

/// `None` when the marking is rejected, otherwise the non-marking remainder.
fn split_marking(filter: &Filter, rendered: &str) -> Option<Option<Filter>> {
    let is_marking = |column: &str| column.trim().eq_ignore_ascii_case(MARKING);
    match filter {
        Filter::Eq(column, value) if is_marking(column) => {
            (value.as_str() == Some(rendered)).then_some(None)
        }
        Filter::EqIgnoreCase(column, text) if is_marking(column) => {
            text.to_uppercase().eq(&rendered.to_uppercase()).then_some(None)
        }
        Filter::Ne(column, value) if is_marking(column) => {
            (!value.is_null() && value.as_str() != Some(rendered)).then_some(None)
        }
        Filter::And(filters) => {
            let mut rest = Vec::with_capacity(filters.len());
            for filter in filters {
                rest.extend(split_marking(filter, rendered)?);
            }
            Some(match rest.len() {
                0 => None,
                1 => rest.pop(),
                _ => Some(Filter::And(rest)),
            })
        }
        other => Some(Some(other.clone())),
    }
}
