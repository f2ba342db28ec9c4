//! Error types for crowdwatch.

use thiserror::Error;

/// Errors raised by the crowdwatch commands.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The venue configuration is unusable. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command-line argument could not be interpreted.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Alerting pipeline error.
    #[error(transparent)]
    Alert(#[from] crowd_alerts::AlertError),

    /// Audit trail error.
    #[error(transparent)]
    Audit(#[from] crowd_audit::AuditError),
}

/// Result type for crowdwatch commands.
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_config() {
        let err = WatchError::Config("no areas defined".to_string());
        assert_eq!(err.to_string(), "configuration error: no areas defined");
    }

    #[test]
    fn alert_errors_are_transparent() {
        let err: WatchError = crowd_alerts::AlertError::EmergencyNotActive.into();
        assert_eq!(err.to_string(), "emergency mode is not active");
    }
}
