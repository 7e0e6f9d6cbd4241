//! View definitions.

use serde::{Deserialize, Serialize};

use super::TableRef;

/// One output column of a view query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// A source column under an alias.
    Column {
        /// Source column.
        column: String,
        /// Output name.
        alias: String,
    },
    /// A marking id rendered to its canonical text form.
    RenderMarking {
        /// Source column holding the marking id.
        column: String,
        /// Output name.
        alias: String,
    },
}

impl Projection {
    /// Output column name.
    pub fn alias(&self) -> &str {
        match self {
            Projection::Column { alias, .. } => alias,
            Projection::RenderMarking { alias, .. } => alias,
        }
    }

    /// Source column name.
    pub fn source_column(&self) -> &str {
        match self {
            Projection::Column { column, .. } => column,
            Projection::RenderMarking { column, .. } => column,
        }
    }
}

/// Inner equi-join of the source against another table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    /// Joined table.
    pub table: TableRef,
    /// Column of the source table.
    pub left_column: String,
    /// Column of the joined table.
    pub right_column: String,
}

/// The stored query behind a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// Source table.
    pub source: TableRef,
    /// Output columns.
    pub projections: Vec<Projection>,
    /// Optional inner join; a source row without a join partner is dropped.
    pub join: Option<JoinClause>,
}

impl ViewQuery {
    /// Output column names.
    pub fn column_names(&self) -> Vec<String> {
        self.projections.iter().map(|p| p.alias().to_string()).collect()
    }
}

/// Kind of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewKind {
    /// Plain read-only view.
    Regular,
    /// Security view of a restricted table; writes go to the shadow table.
    Restricted {
        /// Physical shadow table.
        shadow: TableRef,
    },
}

/// A view in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDef {
    /// View id.
    pub id: u64,
    /// Owning schema.
    pub schema: String,
    /// View name.
    pub name: String,
    /// Kind of view.
    pub kind: ViewKind,
    /// Query producing the rows.
    pub query: ViewQuery,
}

impl ViewDef {
    /// Reference to this view.
    pub fn table_ref(&self) -> TableRef {
        TableRef {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    /// Output column names.
    pub fn column_names(&self) -> Vec<String> {
        self.query.column_names()
    }

    /// Shadow table backing a restricted view.
    pub fn shadow(&self) -> Option<&TableRef> {
        match &self.kind {
            ViewKind::Restricted { shadow } => Some(shadow),
            ViewKind::Regular => None,
        }
    }
}
