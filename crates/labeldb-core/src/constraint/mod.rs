//! Constraint enforcement module.
//!
//! This module provides constraint validation and index maintenance:
//! - Not-null columns
//! - Unique keys (single and composite), backed by unique indexes
//! - Foreign keys, with an optional reserved value that needs no referenced row

pub mod index;
mod validator;

pub use validator::ConstraintValidator;
