//! Error types for the collaboration core
//!
//! Three failure classes surface to callers:
//! - **Protocol**: the caller broke a precondition (double submission,
//!   acknowledging with nothing outstanding, ...). Never swallowed.
//! - **InvariantViolation**: a transaction's completion check failed. The
//!   history has already been rolled back when this is returned.
//! - **MissingData**: revisions must be fetched from the authority and
//!   redelivered. Recoverable.

use crate::protocol::Revision;
use thiserror::Error;

/// Errors produced by the collaboration core
#[derive(Error, Debug)]
pub enum CollabError {
    /// Caller precondition violation
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Global history invariant broken; state was rolled back
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Revisions `start..=end` are missing and must be redelivered
    #[error("Missing revisions {start}..={end}")]
    MissingData { start: Revision, end: Revision },

    /// A transaction was opened while another one is still running
    #[error("Transaction already in progress")]
    Reentrant,

    /// Malformed or non-composable changeset
    #[error("Invalid changeset: {0}")]
    InvalidChangeset(String),

    /// Persisted state or wire payload could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Record source failure during history restore
    #[error("Record source error: {0}")]
    Source(String),
}

/// Result type alias for collaboration operations
pub type Result<T> = std::result::Result<T, CollabError>;

impl CollabError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        CollabError::Protocol(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        CollabError::InvariantViolation(msg.into())
    }

    pub fn changeset(msg: impl Into<String>) -> Self {
        CollabError::InvalidChangeset(msg.into())
    }
}
