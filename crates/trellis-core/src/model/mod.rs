//! Core session domain types and DTOs shared across the workspace.

mod session;
mod torrent;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use session::{ConnectionState, Credentials, RpcError, Server, ServerStats, SessionStats};
pub use torrent::{
    FileSnapshot, PeerSnapshot, TorrentChange, TorrentSnapshot, TorrentStatus, TrackerSnapshot,
    TrackerStatus,
};

/// Identifier the remote daemon assigns to a torrent.
///
/// Stable for the lifetime of the torrent and never reused for another live
/// torrent while it exists.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TorrentId(pub i32);

impl fmt::Display for TorrentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Identifier of a tracker within a single torrent.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackerId(pub i32);

impl fmt::Display for TrackerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Bandwidth priority for torrents, and download priority for files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Served after everything else.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Served first.
    High,
}

/// How a per-torrent ratio or idle-seeding limit is resolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitMode {
    /// Follow the session-wide setting.
    #[default]
    Global,
    /// Use the torrent's own value.
    Single,
    /// Never stop seeding.
    Unlimited,
}

/// Direction of a queue move applied to a set of torrents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMove {
    /// Move to the front of the queue.
    Top,
    /// Move one position towards the front.
    Up,
    /// Move one position towards the back.
    Down,
    /// Move to the back of the queue.
    Bottom,
}

/// Request payload for adding a torrent from `.torrent` metainfo bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTorrentFile {
    /// Bencoded metainfo read from the caller-supplied file.
    pub metainfo: Vec<u8>,
    /// Directory the daemon should download into.
    pub download_directory: String,
    /// File indices that should not be downloaded.
    pub unwanted_files: Vec<u32>,
    /// File indices downloaded with high priority.
    pub high_priority_files: Vec<u32>,
    /// File indices downloaded with low priority.
    pub low_priority_files: Vec<u32>,
    /// Renames applied right after admission, keyed by original path.
    pub renamed_files: BTreeMap<String, String>,
    /// Bandwidth priority of the new torrent.
    pub bandwidth_priority: Priority,
    /// Whether the torrent starts immediately.
    pub start: bool,
}

/// Request payload for adding a torrent from a magnet link or URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTorrentLink {
    /// Magnet URI, HTTP(S) URL, or info hash.
    pub link: String,
    /// Directory the daemon should download into.
    pub download_directory: String,
    /// Bandwidth priority of the new torrent.
    pub bandwidth_priority: Priority,
    /// Whether the torrent starts immediately.
    pub start: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&TorrentId(17))?, "17");
        let tracker: TrackerId = serde_json::from_str("3")?;
        assert_eq!(tracker, TrackerId(3));
        assert_eq!(TorrentId(5).to_string(), "5");
        Ok(())
    }

    #[test]
    fn defaults_match_daemon_defaults() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(LimitMode::default(), LimitMode::Global);
        let link = AddTorrentLink::default();
        assert!(!link.start);
        assert_eq!(link.bandwidth_priority, Priority::Normal);
    }
}
