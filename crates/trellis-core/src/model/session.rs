use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connectivity of the session to the remote daemon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// Handshake with the daemon in progress.
    Connecting,
    /// Connected and receiving updates.
    Connected,
}

/// Classification of the last connection failure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcError {
    /// No error recorded.
    #[default]
    NoError,
    /// The daemon did not answer in time.
    TimedOut,
    /// Transport-level failure.
    ConnectionError,
    /// Credentials were rejected.
    AuthenticationError,
    /// The daemon answered with something unparseable.
    ParseError,
    /// The daemon speaks a newer protocol than supported.
    ServerIsTooNew,
    /// The daemon speaks an older protocol than supported.
    ServerIsTooOld,
}

impl RpcError {
    /// Whether this value describes an actual failure.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::NoError)
    }
}

/// Username and password for daemons behind HTTP authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Secret; redacted from `Debug` output.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection profile handed to the engine by `set_server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// Display name of the profile.
    pub name: String,
    /// Host name or address of the daemon.
    pub address: String,
    /// TCP port of the RPC endpoint.
    pub port: u16,
    /// Path of the RPC endpoint, e.g. `/transmission/rpc`.
    pub api_path: String,
    /// Whether to use HTTPS.
    pub https: bool,
    /// PEM encoded certificate trusted in addition to the system roots.
    pub self_signed_certificate: Option<String>,
    /// PEM encoded client certificate and key.
    pub client_certificate: Option<String>,
    /// HTTP authentication, when required.
    pub credentials: Option<Credentials>,
    /// Interval between periodic state updates.
    pub update_interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Server {
    /// Base URL of the RPC endpoint described by this profile.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.address, self.port, self.api_path)
    }
}

/// Transfer counters for one accounting period.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Bytes downloaded.
    pub downloaded: i64,
    /// Bytes uploaded.
    pub uploaded: i64,
    /// Active time in seconds.
    pub duration: i64,
    /// Number of daemon sessions counted.
    pub session_count: i32,
}

/// Aggregate transfer statistics reported by the daemon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Current download speed in bytes per second.
    pub download_speed: i64,
    /// Current upload speed in bytes per second.
    pub upload_speed: i64,
    /// Counters for the current daemon session.
    pub current_session: SessionStats,
    /// Cumulative counters.
    pub total: SessionStats,
}
