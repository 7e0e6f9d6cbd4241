//! Table definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{normalize, ColumnDef, ConstraintDef, ForeignKeySpec, IndexDef, IndexSpec, UniqueSpec};

/// Schema-qualified reference to a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub name: String,
}

impl TableRef {
    /// Create a reference, normalizing both identifiers.
    pub fn new(schema: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            schema: normalize(schema.as_ref()),
            name: normalize(name.as_ref()),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Where a table's rows come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    /// Rows live in storage.
    #[default]
    Base,
    /// Rows are the active markings of the executing session.
    SessionMarkings,
}

/// A logical table definition, as submitted to `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns in order.
    pub columns: Vec<ColumnDef>,
    /// Primary key columns.
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    /// Unique keys.
    #[serde(default)]
    pub unique: Vec<UniqueSpec>,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Foreign keys, added after the table is materialized.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,
    /// Row source.
    #[serde(default)]
    pub kind: TableKind,
}

impl TableDefinition {
    /// Create a definition with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            unique: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            kind: TableKind::Base,
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a unique key.
    pub fn with_unique<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.unique.push(UniqueSpec {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Whether a column with this name exists (case-insensitive).
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Upper-case every identifier in the definition.
    pub fn normalized(mut self) -> Self {
        self.name = normalize(&self.name);
        for column in &mut self.columns {
            column.name = normalize(&column.name);
        }
        if let Some(pk) = &mut self.primary_key {
            pk.iter_mut().for_each(|c| *c = normalize(c));
        }
        for unique in &mut self.unique {
            unique.name = unique.name.as_deref().map(normalize);
            unique.columns.iter_mut().for_each(|c| *c = normalize(c));
        }
        for index in &mut self.indexes {
            index.name = normalize(&index.name);
            index.columns.iter_mut().for_each(|c| *c = normalize(c));
        }
        for fk in &mut self.foreign_keys {
            fk.name = normalize(&fk.name);
            fk.columns.iter_mut().for_each(|c| *c = normalize(c));
            fk.references = TableRef::new(&fk.references.schema, &fk.references.name);
            fk.ref_columns.iter_mut().for_each(|c| *c = normalize(c));
        }
        self
    }
}

/// A materialized table in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Physical table id (key prefix of its rows).
    pub id: u64,
    /// Owning schema.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Row source.
    pub kind: TableKind,
    /// Columns in order.
    pub columns: Vec<ColumnDef>,
    /// Secondary indexes.
    pub indexes: Vec<IndexDef>,
    /// Constraints.
    pub constraints: Vec<ConstraintDef>,
}

impl TableDef {
    /// Reference to this table.
    pub fn table_ref(&self) -> TableRef {
        TableRef {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    /// `SCHEMA.NAME`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Position of a column (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Find a column (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Find an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Find an index keyed exactly on the given columns.
    pub fn index_on(&self, columns: &[String]) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.is_on(columns))
    }

    /// Find a unique index keyed exactly on the given columns.
    pub fn unique_index_on(&self, columns: &[String]) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.unique && i.is_on(columns))
    }

    /// Foreign keys declared on this table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &super::ForeignKeyDef> {
        self.constraints.iter().filter_map(|c| match c {
            ConstraintDef::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    /// Names of every index and constraint owned by this table.
    pub fn owned_names(&self) -> impl Iterator<Item = &str> {
        self.indexes
            .iter()
            .map(|i| i.name.as_str())
            .chain(self.constraints.iter().map(|c| c.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    #[test]
    fn test_table_ref_normalizes() {
        let r = TableRef::new("secret", " Docs ");
        assert_eq!(r.schema, "SECRET");
        assert_eq!(r.name, "DOCS");
        assert_eq!(r.to_string(), "SECRET.DOCS");
    }

    #[test]
    fn test_definition_normalized() {
        let def = TableDefinition::new("docs")
            .with_column(ColumnDef::new("id", ColumnType::Int64))
            .with_column(ColumnDef::new("Body", ColumnType::Text))
            .with_primary_key(["id"])
            .normalized();

        assert_eq!(def.name, "DOCS");
        assert!(def.has_column("body"));
        assert_eq!(def.columns[1].name, "BODY");
        assert_eq!(def.primary_key, Some(vec!["ID".to_string()]));
    }
}
