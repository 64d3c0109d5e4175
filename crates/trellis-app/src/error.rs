//! # Design
//!
//! - Constant error messages with the failing operation as a context field.
//! - Source errors are kept, not re-logged at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: trellis_config::ConfigError,
    },
    /// Logging could not be installed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: trellis_telemetry::TelemetryError,
    },
    /// The bridge failed to start or stop.
    #[error("bridge operation failed")]
    Bridge {
        /// Operation identifier.
        operation: &'static str,
        /// Source bridge error.
        source: trellis_bridge::BridgeError,
    },
    /// An event could not be rendered.
    #[error("event serialisation failed")]
    Serialize {
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// The blocking shutdown task did not complete.
    #[error("shutdown task failed")]
    ShutdownTask {
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: trellis_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: trellis_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn bridge(operation: &'static str, source: trellis_bridge::BridgeError) -> Self {
        Self::Bridge { operation, source }
    }
}
