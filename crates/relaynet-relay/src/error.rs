//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay routing errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// The routing table has been shut down
    #[error("Routing table is closed")]
    Closed,

    /// Connection is already attached
    #[error("Duplicate connection: {0}")]
    DuplicateConnection(String),

    /// Connection id is not tracked by the table
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// No connected transport for the relay
    #[error("No connection available for relay {0}")]
    NoConnection(String),

    /// Relay not known to the table
    #[error("Relay not found: {0}")]
    NotFound(String),

    /// Transport write failed
    #[error("Write failed: {0}")]
    Write(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] relaynet_core::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// True when the table is in a state that will not accept the call
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, RelayError::Closed)
    }
}
