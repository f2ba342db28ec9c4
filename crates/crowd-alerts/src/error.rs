//! Error types for the crowd-alerts crate.

use crowd_audit::AuditError;
use crowd_density::DensityError;
use crowd_proto::{AlertId, Permission, ProtoError};
use thiserror::Error;

/// Errors returned by alerting operations.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The alert id is unknown.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The unknown alert id.
        id: AlertId,
    },

    /// The alert was already resolved.
    #[error("alert already resolved: {id}")]
    AlreadyResolved {
        /// The resolved alert id.
        id: AlertId,
    },

    /// Emergency mode is already on.
    #[error("emergency mode already active (triggered by {trigger_area_id})")]
    EmergencyAlreadyActive {
        /// The area that triggered the running emergency.
        trigger_area_id: String,
    },

    /// Emergency mode is off.
    #[error("emergency mode is not active")]
    EmergencyNotActive,

    /// The caller lacks a required permission.
    #[error("permission denied: {admin_id} lacks {permission}")]
    PermissionDenied {
        /// The caller.
        admin_id: String,
        /// The missing permission.
        permission: Permission,
    },

    /// A notification configuration was rejected.
    #[error("invalid notification config: {reason}")]
    InvalidConfig {
        /// Why the config was rejected.
        reason: String,
    },

    /// The audit trail failed.
    #[error("audit error: {0}")]
    Audit(AuditError),

    /// Topology or reading error.
    #[error(transparent)]
    Density(#[from] DensityError),

    /// Data model validation failed.
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

impl From<AuditError> for AlertError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::AlertNotFound { id } => Self::AlertNotFound { id },
            AuditError::AlreadyResolved { id } => Self::AlreadyResolved { id },
            other => Self::Audit(other),
        }
    }
}

impl AlertError {
    pub(crate) fn denied(admin_id: &str, permission: Permission) -> Self {
        Self::PermissionDenied {
            admin_id: admin_id.to_string(),
            permission,
        }
    }
}

/// Result type for alerting operations.
pub type Result<T> = std::result::Result<T, AlertError>;
