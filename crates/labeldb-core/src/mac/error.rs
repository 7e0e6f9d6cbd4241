//! Access-control error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by labels, grants, and restricted tables.
#[derive(Debug, Error)]
pub enum MacError {
    /// Marking text does not follow `SENSITIVITY/COMPARTMENT[/...]`.
    #[error("malformed marking '{text}': {reason}")]
    MalformedMarking {
        /// Offending input.
        text: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A granted credential needs a sensitivity and exactly one compartment.
    #[error("invalid grant '{0}': a credential needs a sensitivity and exactly one compartment")]
    InvalidGrant(String),

    /// A marking was supplied for a table that is not restricted.
    #[error("table {0} is not restricted and takes no marking")]
    MarkingOnUnrestrictedTable(String),

    /// A row reached a shadow table without a resolved marking.
    #[error("row for {0} has no resolved marking")]
    UnresolvedMarking(String),

    /// A label could not be found or created.
    #[error("could not resolve identity of {kind} '{name}'")]
    IdentityResolutionFailure {
        /// Label kind (sensitivity, compartment, marking).
        kind: &'static str,
        /// Label text.
        name: String,
    },

    /// The principal lacks a credential the marking requires.
    #[error("{principal} is not cleared for {marking}")]
    NotCleared {
        /// Principal name.
        principal: String,
        /// Marking text.
        marking: String,
    },

    /// The object is reachable only through the engine.
    #[error("{0} is protected")]
    ProtectedObject(String),

    /// The system transaction lock could not be acquired in time.
    #[error("system transaction not available within {0:?}")]
    SystemTransactionTimeout(Duration),

    /// Engine error.
    #[error(transparent)]
    Engine(#[from] crate::error::Error),
}

impl MacError {
    /// Create a malformed-marking error.
    pub fn malformed(text: &str, reason: impl Into<String>) -> Self {
        MacError::MalformedMarking {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<crate::error::ConstraintError> for MacError {
    fn from(err: crate::error::ConstraintError) -> Self {
        MacError::Engine(err.into())
    }
}

/// Result type for access-control operations.
pub type MacResult<T> = Result<T, MacError>;
