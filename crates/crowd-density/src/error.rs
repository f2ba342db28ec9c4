//! Error types for the crowd-density crate.

use thiserror::Error;

/// Errors raised by the density layer.
#[derive(Debug, Error)]
pub enum DensityError {
    /// Venue or threshold configuration is invalid. Fatal at startup.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A reading or request referenced an area that is not registered.
    #[error("unknown area: {id}")]
    UnknownArea {
        /// The unregistered area id.
        id: String,
    },

    /// A reading carried an unusable density value.
    #[error("invalid reading: {reason}")]
    InvalidReading {
        /// Why the reading was rejected.
        reason: String,
    },
}

impl DensityError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result type for density operations.
pub type Result<T> = std::result::Result<T, DensityError>;
