//! Error types for the alert audit trail.

use crowd_proto::AlertId;
use thiserror::Error;

/// Errors that can occur while recording or querying alert history.
#[derive(Debug, Error)]
pub enum AuditError {
    /// No entry exists for the alert id.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The unknown alert id.
        id: AlertId,
    },

    /// The alert already carries a resolution.
    #[error("alert already resolved: {id}")]
    AlreadyResolved {
        /// The resolved alert id.
        id: AlertId,
    },

    /// An entry with the same alert id was logged twice.
    #[error("alert already logged: {id}")]
    DuplicateAlert {
        /// The duplicated alert id.
        id: AlertId,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
