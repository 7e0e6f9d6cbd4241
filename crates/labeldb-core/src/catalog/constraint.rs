//! Index and constraint definitions.

use serde::{Deserialize, Serialize};

use super::TableRef;
use crate::value::Value;

/// A secondary index over one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Physical index id (key prefix of its entries).
    pub id: u64,
    /// Index name, unique within the schema.
    pub name: String,
    /// Indexed columns in key order.
    pub columns: Vec<String>,
    /// Whether the index rejects duplicate keys.
    pub unique: bool,
}

impl IndexDef {
    /// Whether this index is keyed exactly on the given columns.
    pub fn is_on(&self, columns: &[String]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// A foreign key from columns of one table to a unique key of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Index on the referencing columns.
    pub index: String,
    /// Referenced table.
    pub references: TableRef,
    /// Referenced columns.
    pub ref_columns: Vec<String>,
    /// Unique index on the referenced columns used for lookups.
    pub ref_index: String,
    /// A single-column value accepted without a referenced row.
    #[serde(default)]
    pub reserved: Option<Value>,
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintDef {
    /// Primary key, backed by a unique index.
    PrimaryKey {
        /// Constraint name.
        name: String,
        /// Key columns.
        columns: Vec<String>,
        /// Backing unique index.
        index: String,
    },
    /// Unique key, backed by a unique index.
    Unique {
        /// Constraint name.
        name: String,
        /// Key columns.
        columns: Vec<String>,
        /// Backing unique index.
        index: String,
    },
    /// Foreign key.
    ForeignKey(ForeignKeyDef),
}

impl ConstraintDef {
    /// Constraint name.
    pub fn name(&self) -> &str {
        match self {
            ConstraintDef::PrimaryKey { name, .. } => name,
            ConstraintDef::Unique { name, .. } => name,
            ConstraintDef::ForeignKey(fk) => &fk.name,
        }
    }
}

/// Declaration of a unique key in a table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueSpec {
    /// Constraint name. Generated if absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Key columns.
    pub columns: Vec<String>,
}

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
}

/// Declaration of a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references: TableRef,
    /// Referenced columns.
    pub ref_columns: Vec<String>,
    /// A single-column value accepted without a referenced row.
    #[serde(default)]
    pub reserved: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_on_ignores_case() {
        let index = IndexDef {
            id: 1,
            name: "IDX".into(),
            columns: vec!["SENSITIVITY_ID".into(), "COMPARTMENT_ID".into()],
            unique: true,
        };
        assert!(index.is_on(&["sensitivity_id".into(), "compartment_id".into()]));
        assert!(!index.is_on(&["SENSITIVITY_ID".into()]));
    }

    #[test]
    fn test_constraint_name() {
        let pk = ConstraintDef::PrimaryKey {
            name: "PK_T".into(),
            columns: vec!["ID".into()],
            index: "PK_T_INDEX".into(),
        };
        assert_eq!(pk.name(), "PK_T");
    }
}
