//! LabelDB Core - Relational storage with mandatory access control.
//!
//! This crate provides a small relational engine (storage, catalog,
//! constraints, statements) and the access-control layer built on it:
//! labels, credentials, restricted tables, and sessions.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod config;
pub mod constraint;
pub mod database;
pub mod error;
pub mod mac;
pub mod query;
pub mod storage;
pub mod value;

pub use catalog::{
    Catalog, ColumnDef, ColumnType, SchemaKind, TableDefinition, TableRef, ViewDef, ViewQuery,
};
pub use config::{DatabaseConfig, MacConfig};
pub use constraint::ConstraintValidator;
pub use database::Database;
pub use error::{ConstraintError, Error};
pub use mac::{
    Compartment, DominanceOrder, MacError, MacResult, Marking, Sensitivity, Session,
    EMPTY_MARKING_ID,
};
pub use query::{Delete, Filter, Insert, ResultSet, Select};
pub use storage::{StorageConfig, StorageEngine, Transaction};
pub use value::Value;
