//! Error types for the crowd-proto crate.

use thiserror::Error;

/// Errors raised while constructing or parsing shared model values.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A value failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An enum value could not be parsed from text.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// The enum being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// Result type for proto operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_validation() {
        let err = ProtoError::Validation("capacity must be positive".to_string());
        assert_eq!(err.to_string(), "validation error: capacity must be positive");
    }

    #[test]
    fn error_display_unknown_variant() {
        let err = ProtoError::UnknownVariant {
            kind: "channel",
            value: "fax".to_string(),
        };
        assert_eq!(err.to_string(), "unknown channel: fax");
    }
}
