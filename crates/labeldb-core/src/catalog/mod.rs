//! Relational catalog for LabelDB.
//!
//! The catalog stores schemas, tables, indexes, constraints, and views.
//! Identifiers are case-insensitive and stored upper case.

mod catalog;
mod column;
mod constraint;
mod schema;
mod table;
mod view;

pub use catalog::{Catalog, CatalogUpdate, Object, SchemaSet};
pub use column::{ColumnDef, ColumnType};
pub use constraint::{ConstraintDef, ForeignKeyDef, ForeignKeySpec, IndexDef, IndexSpec, UniqueSpec};
pub use schema::{RegularSchema, RestrictedSchema, Schema, SchemaKind};
pub use table::{TableDef, TableDefinition, TableKind, TableRef};
pub use view::{JoinClause, Projection, ViewDef, ViewKind, ViewQuery};

/// Normalize an identifier: trimmed, upper case.
pub fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}
