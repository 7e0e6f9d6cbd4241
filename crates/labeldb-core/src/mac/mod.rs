//! Mandatory access control.
//!
//! Rows of a restricted table carry a marking (a sensitivity and a set of
//! compartments). A session sees a row only when the row's marking is among
//! the session's active markings, and a principal may only activate
//! markings their credentials cover.
//!
//! Label state is ordinary relational data in the [`MAC_SCHEMA`] schema;
//! its tables are defined by the bundled `mac-init.json` script.

pub mod dominance;
pub mod error;
pub mod grant;
pub mod label;
pub mod session;
pub mod store;
pub mod system;
pub mod tagging;
pub mod transform;

use serde::Deserialize;
use tracing::info;

pub use dominance::DominanceOrder;
pub use error::{MacError, MacResult};
pub use label::{Compartment, Identity, Marking, Sensitivity, EMPTY_MARKING_ID};
pub use session::{Session, SessionContext};
pub use system::{SystemSessions, SystemTransaction};

use crate::catalog::{CatalogUpdate, TableDefinition};
use crate::error::Error;

/// Schema holding the label store.
pub const MAC_SCHEMA: &str = "MAC";

/// Hidden marking column of every shadow table.
pub const MARKING_ID: &str = "MARKING_ID";

/// Rendered marking column of every security view.
pub const MARKING: &str = "MARKING";

const INIT_SCRIPT: &str = include_str!("mac-init.json");

/// References to the label store tables.
pub mod tables {
    use super::MAC_SCHEMA;
    use crate::catalog::TableRef;

    /// `MAC.SENSITIVITY`.
    pub fn sensitivity() -> TableRef {
        TableRef::new(MAC_SCHEMA, "SENSITIVITY")
    }

    /// `MAC.COMPARTMENT`.
    pub fn compartment() -> TableRef {
        TableRef::new(MAC_SCHEMA, "COMPARTMENT")
    }

    /// `MAC.CREDENTIAL`.
    pub fn credential() -> TableRef {
        TableRef::new(MAC_SCHEMA, "CREDENTIAL")
    }

    /// `MAC.USER_CREDENTIAL`.
    pub fn user_credential() -> TableRef {
        TableRef::new(MAC_SCHEMA, "USER_CREDENTIAL")
    }

    /// `MAC.MARKING`.
    pub fn marking() -> TableRef {
        TableRef::new(MAC_SCHEMA, "MARKING")
    }

    /// `MAC.MARKING_COMPARTMENT`.
    pub fn marking_compartment() -> TableRef {
        TableRef::new(MAC_SCHEMA, "MARKING_COMPARTMENT")
    }

    /// `MAC.SESSION_MARKING`, the executing session's active markings.
    pub fn session_marking() -> TableRef {
        TableRef::new(MAC_SCHEMA, "SESSION_MARKING")
    }
}

#[derive(Deserialize)]
struct InitScript {
    schema: String,
    tables: Vec<TableDefinition>,
}

/// Create the label store schema and tables. Returns `false` if the schema
/// already exists.
pub fn install(upd: &mut CatalogUpdate<'_>) -> Result<bool, Error> {
    let script: InitScript =
        serde_json::from_str(INIT_SCRIPT).map_err(|e| Error::Deserialization(e.to_string()))?;
    if upd.schemas().contains_schema(&script.schema) {
        return Ok(false);
    }

    upd.create_regular_schema(&script.schema)?;
    for table in script.tables {
        upd.create_table(&script.schema, table)?;
    }
    info!(schema = %script.schema, "label store installed");
    Ok(true)
}
