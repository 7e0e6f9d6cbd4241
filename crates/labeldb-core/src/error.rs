//! Core error types.

use thiserror::Error;

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Key decoding error.
    #[error("invalid key format")]
    InvalidKey,

    /// Schema does not exist.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// Table, view, index or constraint does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A schema already holds an object with this name.
    #[error("object already exists: {0}")]
    ObjectExists(String),

    /// Column is not part of the table.
    #[error("unknown column {column} in {table}")]
    UnknownColumn {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintError),

    /// Operation not supported on this object.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Constraint violations raised while writing rows.
#[derive(Debug, Error)]
pub enum ConstraintError {
    /// Unique or primary key violation.
    #[error("unique constraint {constraint} on {table} violated by ({value})")]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
        /// Qualified table name.
        table: String,
        /// Offending value(s).
        value: String,
    },

    /// Referenced row does not exist.
    #[error("foreign key {constraint} on {table} has no referenced row for ({value})")]
    ForeignKeyViolation {
        /// Constraint name.
        constraint: String,
        /// Qualified table name.
        table: String,
        /// Offending value(s).
        value: String,
    },

    /// Null written to a non-nullable column.
    #[error("column {table}.{column} may not be null")]
    NotNullViolation {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Value cannot be converted to the column type.
    #[error("column {table}.{column} expects {expected}, got {actual}")]
    TypeMismatch {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared column type.
        expected: String,
        /// Type of the supplied value.
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownColumn {
            table: "PUBLIC.T".into(),
            column: "X".into(),
        };
        assert_eq!(err.to_string(), "unknown column X in PUBLIC.T");

        let err: Error = ConstraintError::NotNullViolation {
            table: "MAC.MARKING".into(),
            column: "SENSITIVITY_ID".into(),
        }
        .into();
        assert!(err.to_string().contains("MAC.MARKING.SENSITIVITY_ID"));
    }
}
