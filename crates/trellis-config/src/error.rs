//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration document failed.
    #[error("failed to read configuration file")]
    Io {
        /// Path of the document.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configuration document was not valid JSON for the model.
    #[error("failed to parse configuration file")]
    Parse {
        /// Path of the document.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// An environment override could not be parsed.
    #[error("invalid environment override")]
    InvalidOverride {
        /// Environment variable name.
        variable: String,
        /// Raw value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn config_error_messages_are_constant() {
        let cases = vec![
            (
                ConfigError::Io {
                    path: PathBuf::from("trellis.json"),
                    source: io::Error::other("io"),
                },
                "failed to read configuration file",
                true,
            ),
            (
                ConfigError::InvalidField {
                    section: "bridge",
                    field: "poll_interval_ms",
                    value: Some("0".to_string()),
                    reason: "must be positive",
                },
                "invalid configuration field",
                false,
            ),
            (
                ConfigError::InvalidOverride {
                    variable: "TRELLIS_POLL_INTERVAL_MS".to_string(),
                    value: "soon".to_string(),
                    reason: "expected an unsigned integer",
                },
                "invalid environment override",
                false,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }
}
