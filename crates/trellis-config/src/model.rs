//! Typed configuration documents.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trellis_core::{Credentials, Server};
use trellis_telemetry::LogFormat;

use crate::defaults;

/// Runtime configuration for a session bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Time the caller waits for the worker to signal readiness.
    pub startup_timeout_ms: u64,
    /// Interval between engine ticks.
    pub poll_interval_ms: u64,
    /// Event bus broadcast and replay capacity.
    pub event_bus_capacity: usize,
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Logging setup.
    pub logging: LoggingSettings,
    /// Server to install right after startup, if any.
    pub server: Option<ServerProfile>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: defaults::STARTUP_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            thread_name: defaults::THREAD_NAME.to_string(),
            logging: LoggingSettings::default(),
            server: None,
        }
    }
}

impl BridgeConfig {
    /// Startup handshake timeout.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Engine tick interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Logging section of the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level directive used when `RUST_LOG` is absent.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
        }
    }
}

/// Connection profile as stored in configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerProfile {
    /// Display name.
    pub name: String,
    /// Host name or address.
    pub address: String,
    /// RPC port.
    pub port: u16,
    /// RPC path.
    pub api_path: String,
    /// Whether to use HTTPS.
    pub https: bool,
    /// PEM certificate trusted in addition to the system roots.
    pub self_signed_certificate: Option<String>,
    /// PEM client certificate and key.
    pub client_certificate: Option<String>,
    /// Whether HTTP authentication is sent.
    pub authentication: bool,
    /// Login name.
    pub username: String,
    /// Secret.
    pub password: String,
    /// Seconds between periodic updates.
    pub update_interval_secs: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            port: defaults::SERVER_PORT,
            api_path: defaults::SERVER_API_PATH.to_string(),
            https: false,
            self_signed_certificate: None,
            client_certificate: None,
            authentication: false,
            username: String::new(),
            password: String::new(),
            update_interval_secs: defaults::UPDATE_INTERVAL_SECS,
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ServerProfile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerProfile")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("api_path", &self.api_path)
            .field("https", &self.https)
            .field("authentication", &self.authentication)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl From<ServerProfile> for Server {
    fn from(profile: ServerProfile) -> Self {
        let credentials = profile.authentication.then(|| Credentials {
            username: profile.username,
            password: profile.password,
        });
        Self {
            name: profile.name,
            address: profile.address,
            port: profile.port,
            api_path: profile.api_path,
            https: profile.https,
            self_signed_certificate: profile.self_signed_certificate,
            client_certificate: profile.client_certificate,
            credentials,
            update_interval: Duration::from_secs(profile.update_interval_secs),
            timeout: Duration::from_secs(profile.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() -> anyhow::Result<()> {
        let config: BridgeConfig = serde_json::from_str(r#"{"poll_interval_ms": 100}"#)?;
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.startup_timeout(), Duration::from_secs(5));
        assert_eq!(config.thread_name, "trellis-worker");
        assert!(config.server.is_none());
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<BridgeConfig>(r#"{"poll_interval": 100}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn profile_converts_credentials_only_when_enabled() {
        let profile = ServerProfile {
            name: "nas".to_string(),
            address: "nas.local".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            ..ServerProfile::default()
        };
        let server = Server::from(profile.clone());
        assert!(server.credentials.is_none());
        assert_eq!(server.url(), "http://nas.local:9091/transmission/rpc");

        let server = Server::from(ServerProfile {
            authentication: true,
            ..profile
        });
        assert_eq!(
            server.credentials.map(|credentials| credentials.username),
            Some("admin".to_string())
        );
    }

    #[test]
    fn profile_debug_hides_password() {
        let profile = ServerProfile {
            password: "hunter2".to_string(),
            ..ServerProfile::default()
        };
        assert!(!format!("{profile:?}").contains("hunter2"));
    }
}
