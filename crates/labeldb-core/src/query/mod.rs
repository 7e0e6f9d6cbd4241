//! Statement engine for LabelDB.
//!
//! This module runs typed select, insert, and delete statements against a
//! transaction, including views joined against session-local tables.

mod executor;
mod filter;
mod result;
mod statement;
mod view;

pub use executor::{Row, StatementExecutor};
pub use filter::BoundFilter;
pub use result::ResultSet;
pub use statement::{Delete, Filter, Insert, Select};
pub use view::ViewContext;
