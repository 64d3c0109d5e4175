//! Error types for the session bridge.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use trellis_config::ConfigError;
use trellis_telemetry::TelemetryError;

/// Primary error type for bridge lifecycle operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The worker did not signal readiness in time.
    #[error("worker startup timed out")]
    StartupTimedOut {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    WorkerSpawn {
        /// Requested thread name.
        thread_name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked {
        /// Name of the worker thread.
        thread_name: String,
    },
    /// Caller-supplied input could not be read.
    #[error("failed to read input")]
    ReadInput {
        /// Path of the input.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The bridge configuration was rejected.
    #[error("invalid bridge configuration")]
    Config {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Setting up metrics failed.
    #[error("failed to initialise bridge metrics")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn bridge_error_messages_are_constant() {
        let cases = vec![
            (
                BridgeError::StartupTimedOut { timeout_ms: 5_000 },
                "worker startup timed out",
                false,
            ),
            (
                BridgeError::WorkerSpawn {
                    thread_name: "trellis-worker".to_string(),
                    source: io::Error::other("spawn"),
                },
                "failed to spawn worker thread",
                true,
            ),
            (
                BridgeError::ReadInput {
                    path: PathBuf::from("demo.torrent"),
                    source: io::Error::from(io::ErrorKind::NotFound),
                },
                "failed to read input",
                true,
            ),
            (
                BridgeError::Config {
                    source: ConfigError::InvalidField {
                        section: "bridge",
                        field: "poll_interval_ms",
                        value: Some("0".to_string()),
                        reason: "must be positive",
                    },
                },
                "invalid bridge configuration",
                true,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }
}
