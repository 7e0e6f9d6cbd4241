//! Schemas: regular and restricted.
//!
//! A regular schema owns tables and views directly. A restricted schema
//! holds only security views and owns a regular *shadow* schema to which it
//! delegates table, index, and constraint storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{TableDef, ViewDef};
use crate::error::Error;

/// Kind of schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Ordinary schema.
    Regular,
    /// Schema under mandatory access control.
    Restricted,
}

/// An ordinary schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularSchema {
    /// Schema id.
    pub id: u64,
    /// Schema name.
    pub name: String,
    tables: BTreeMap<String, TableDef>,
    views: BTreeMap<String, ViewDef>,
}

impl RegularSchema {
    /// Create an empty schema.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    /// Whether any child object (table, view, index, constraint) has this name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.tables.contains_key(name)
            || self.views.contains_key(name)
            || self
                .tables
                .values()
                .any(|t| t.owned_names().any(|n| n == name))
    }

    /// Fail if a child object already has this name.
    pub fn check_unique_name(&self, name: &str) -> Result<(), Error> {
        if self.contains_name(name) {
            return Err(Error::ObjectExists(format!("{}.{}", self.name, name)));
        }
        Ok(())
    }

    /// Add a table. Its name and the names of its indexes and constraints
    /// must be unused in this schema.
    pub fn add_table(&mut self, table: TableDef) -> Result<(), Error> {
        self.check_unique_name(&table.name)?;
        for owned in table.owned_names() {
            self.check_unique_name(owned)?;
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Add a view.
    pub fn add_view(&mut self, view: ViewDef) -> Result<(), Error> {
        self.check_unique_name(&view.name)?;
        self.views.insert(view.name.clone(), view);
        Ok(())
    }

    /// Find a table.
    pub fn find_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Find a table for modification.
    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.get_mut(name)
    }

    /// Find a view.
    pub fn find_view(&self, name: &str) -> Option<&ViewDef> {
        self.views.get(name)
    }

    /// Remove a table.
    pub fn remove_table(&mut self, name: &str) -> Result<TableDef, Error> {
        self.tables
            .remove(name)
            .ok_or_else(|| Error::ObjectNotFound(format!("{}.{}", self.name, name)))
    }

    /// Remove a view.
    pub fn remove_view(&mut self, name: &str) -> Result<ViewDef, Error> {
        self.views
            .remove(name)
            .ok_or_else(|| Error::ObjectNotFound(format!("{}.{}", self.name, name)))
    }

    /// All tables, by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// All views, by name.
    pub fn views(&self) -> impl Iterator<Item = &ViewDef> {
        self.views.values()
    }
}

/// A schema under mandatory access control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictedSchema {
    /// Schema id.
    pub id: u64,
    /// Schema name.
    pub name: String,
    shadow: RegularSchema,
    views: BTreeMap<String, ViewDef>,
}

impl RestrictedSchema {
    /// Create an empty restricted schema with its shadow schema.
    pub fn new(id: u64, name: impl Into<String>, shadow: RegularSchema) -> Self {
        Self {
            id,
            name: name.into(),
            shadow,
            views: BTreeMap::new(),
        }
    }

    /// The shadow schema holding physical tables.
    pub fn shadow(&self) -> &RegularSchema {
        &self.shadow
    }

    /// The shadow schema, for modification.
    pub fn shadow_mut(&mut self) -> &mut RegularSchema {
        &mut self.shadow
    }

    /// Add a security view. Views share the name space of the restricted
    /// schema only; their shadow tables live in the shadow schema.
    pub fn add_view(&mut self, view: ViewDef) -> Result<(), Error> {
        if self.views.contains_key(&view.name) {
            return Err(Error::ObjectExists(format!("{}.{}", self.name, view.name)));
        }
        self.views.insert(view.name.clone(), view);
        Ok(())
    }

    /// Find a security view.
    pub fn find_view(&self, name: &str) -> Option<&ViewDef> {
        self.views.get(name)
    }

    /// Remove a security view.
    pub fn remove_view(&mut self, name: &str) -> Result<ViewDef, Error> {
        self.views
            .remove(name)
            .ok_or_else(|| Error::ObjectNotFound(format!("{}.{}", self.name, name)))
    }

    /// Shadow table backing a view.
    pub fn shadow_table(&self, view: &ViewDef) -> Option<&TableDef> {
        view.shadow().and_then(|s| self.shadow.find_table(&s.name))
    }

    /// All security views, by name.
    pub fn views(&self) -> impl Iterator<Item = &ViewDef> {
        self.views.values()
    }
}

/// A schema of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schema {
    /// Ordinary schema.
    Regular(RegularSchema),
    /// Restricted schema.
    Restricted(RestrictedSchema),
}

impl Schema {
    /// Schema name.
    pub fn name(&self) -> &str {
        match self {
            Schema::Regular(s) => &s.name,
            Schema::Restricted(s) => &s.name,
        }
    }

    /// Schema id.
    pub fn id(&self) -> u64 {
        match self {
            Schema::Regular(s) => s.id,
            Schema::Restricted(s) => s.id,
        }
    }

    /// Kind of schema.
    pub fn kind(&self) -> SchemaKind {
        match self {
            Schema::Regular(_) => SchemaKind::Regular,
            Schema::Restricted(_) => SchemaKind::Restricted,
        }
    }

    /// Whether the schema is restricted.
    pub fn is_restricted(&self) -> bool {
        matches!(self, Schema::Restricted(_))
    }

    /// The restricted variant, if any.
    pub fn as_restricted(&self) -> Option<&RestrictedSchema> {
        match self {
            Schema::Restricted(s) => Some(s),
            Schema::Regular(_) => None,
        }
    }

    /// The restricted variant for modification, if any.
    pub fn as_restricted_mut(&mut self) -> Option<&mut RestrictedSchema> {
        match self {
            Schema::Restricted(s) => Some(s),
            Schema::Regular(_) => None,
        }
    }

    /// Table visible under this schema's name. Restricted schemas expose no
    /// tables, only views.
    pub fn find_table(&self, name: &str) -> Option<&TableDef> {
        match self {
            Schema::Regular(s) => s.find_table(name),
            Schema::Restricted(_) => None,
        }
    }

    /// View visible under this schema's name.
    pub fn find_view(&self, name: &str) -> Option<&ViewDef> {
        match self {
            Schema::Regular(s) => s.find_view(name),
            Schema::Restricted(s) => s.find_view(name),
        }
    }

    /// Add a view.
    pub fn add_view(&mut self, view: ViewDef) -> Result<(), Error> {
        match self {
            Schema::Regular(s) => s.add_view(view),
            Schema::Restricted(s) => s.add_view(view),
        }
    }

    /// Remove a view.
    pub fn remove_view(&mut self, name: &str) -> Result<ViewDef, Error> {
        match self {
            Schema::Regular(s) => s.remove_view(name),
            Schema::Restricted(s) => s.remove_view(name),
        }
    }

    /// Names of tables and views visible under this schema's name.
    pub fn object_names(&self) -> Vec<String> {
        match self {
            Schema::Regular(s) => s
                .tables()
                .map(|t| t.name.clone())
                .chain(s.views().map(|v| v.name.clone()))
                .collect(),
            Schema::Restricted(s) => s.views().map(|v| v.name.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, IndexDef, TableKind};

    fn table(name: &str, index: &str) -> TableDef {
        TableDef {
            id: 1,
            schema: "S".into(),
            name: name.into(),
            kind: TableKind::Base,
            columns: vec![ColumnDef::new("ID", ColumnType::Int64)],
            indexes: vec![IndexDef {
                id: 2,
                name: index.into(),
                columns: vec!["ID".into()],
                unique: false,
            }],
            constraints: Vec::new(),
        }
    }

    #[test]
    fn test_names_unique_across_children() {
        let mut schema = RegularSchema::new(1, "S");
        schema.add_table(table("A", "IDX_A")).unwrap();

        // Same table name
        assert!(matches!(
            schema.add_table(table("A", "IDX_OTHER")),
            Err(Error::ObjectExists(_))
        ));
        // Index name collides with an existing index
        assert!(schema.add_table(table("B", "IDX_A")).is_err());
        // Table name collides with an existing index
        assert!(schema.add_table(table("IDX_A", "IDX_C")).is_err());
    }

    #[test]
    fn test_restricted_schema_hides_tables() {
        let mut shadow = RegularSchema::new(2, "R_SHADOW");
        shadow.add_table(table("DOCS", "IDX")).unwrap();
        let schema = Schema::Restricted(RestrictedSchema::new(1, "R", shadow));

        assert!(schema.find_table("DOCS").is_none());
        assert!(schema.as_restricted().unwrap().shadow().find_table("DOCS").is_some());
        assert_eq!(schema.kind(), SchemaKind::Restricted);
    }
}
