//! Notification payloads published by the bridge.

use chrono::{DateTime, Utc};
use trellis_core::{
    CollectionDelta, ConnectionState, FileSnapshot, PeerSnapshot, RpcError,
    ServerSettingsSnapshot, ServerStats, TorrentId, TorrentSnapshot,
};

/// Identifier assigned to each published notification.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed notifications surfaced to observers and bus subscribers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The session is about to drop its connection.
    AboutToDisconnect,
    /// Connectivity changed.
    ConnectionStateChanged {
        /// New connection state.
        state: ConnectionState,
    },
    /// Connection error state changed.
    ErrorChanged {
        /// Error classification.
        error: RpcError,
        /// Short message.
        message: String,
        /// Detailed diagnostic text.
        detailed_message: String,
    },
    /// Authoritative session settings arrived.
    ServerSettingsChanged {
        /// Full settings copy.
        settings: ServerSettingsSnapshot,
    },
    /// Incremental change of the torrent list.
    TorrentsUpdated {
        /// Torrent list delta.
        delta: CollectionDelta<TorrentSnapshot>,
    },
    /// Incremental change of one torrent's files.
    TorrentFilesUpdated {
        /// Parent torrent.
        torrent_id: TorrentId,
        /// File list delta.
        delta: CollectionDelta<FileSnapshot>,
    },
    /// Incremental change of one torrent's peers.
    TorrentPeersUpdated {
        /// Parent torrent.
        torrent_id: TorrentId,
        /// Peer list delta.
        delta: CollectionDelta<PeerSnapshot>,
    },
    /// Fresh transfer statistics.
    ServerStatsUpdated {
        /// Statistics copy.
        stats: ServerStats,
    },
    /// A torrent was admitted by the daemon.
    TorrentAdded {
        /// New torrent id.
        torrent_id: TorrentId,
        /// Info hash.
        hash_string: String,
        /// Display name.
        name: String,
    },
    /// A torrent finished downloading.
    TorrentFinished {
        /// Finished torrent id.
        torrent_id: TorrentId,
        /// Info hash.
        hash_string: String,
        /// Display name.
        name: String,
    },
    /// An add request matched an existing torrent.
    TorrentAddDuplicate,
    /// An add request failed.
    TorrentAddError,
    /// A file inside a torrent was renamed.
    TorrentFileRenamed {
        /// Parent torrent.
        torrent_id: TorrentId,
        /// Previous path.
        file_path: String,
        /// New name.
        new_name: String,
    },
    /// Free space of the default download directory.
    DownloadDirFreeSpace {
        /// Available bytes.
        bytes: i64,
    },
    /// Result of a free-space query for a path.
    FreeSpaceForPath {
        /// Queried path.
        path: String,
        /// Whether the daemon answered.
        success: bool,
        /// Available bytes when `success` is true.
        bytes: i64,
    },
}

impl Event {
    /// Machine-friendly discriminator for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AboutToDisconnect => "about_to_disconnect",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::ErrorChanged { .. } => "error_changed",
            Self::ServerSettingsChanged { .. } => "server_settings_changed",
            Self::TorrentsUpdated { .. } => "torrents_updated",
            Self::TorrentFilesUpdated { .. } => "torrent_files_updated",
            Self::TorrentPeersUpdated { .. } => "torrent_peers_updated",
            Self::ServerStatsUpdated { .. } => "server_stats_updated",
            Self::TorrentAdded { .. } => "torrent_added",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentAddDuplicate => "torrent_add_duplicate",
            Self::TorrentAddError => "torrent_add_error",
            Self::TorrentFileRenamed { .. } => "torrent_file_renamed",
            Self::DownloadDirFreeSpace { .. } => "download_dir_free_space",
            Self::FreeSpaceForPath { .. } => "free_space_for_path",
        }
    }

    /// Whether the event reports the outcome of an add request.
    #[must_use]
    pub const fn is_add_outcome(&self) -> bool {
        matches!(
            self,
            Self::TorrentAdded { .. } | Self::TorrentAddDuplicate | Self::TorrentAddError
        )
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_maps_variants() {
        assert_event_kind(&Event::AboutToDisconnect, "about_to_disconnect");
        assert_event_kind(
            &Event::ConnectionStateChanged {
                state: ConnectionState::Connected,
            },
            "connection_state_changed",
        );
        assert_event_kind(
            &Event::TorrentsUpdated {
                delta: CollectionDelta::default(),
            },
            "torrents_updated",
        );
        assert_event_kind(
            &Event::TorrentFilesUpdated {
                torrent_id: TorrentId(1),
                delta: CollectionDelta::default(),
            },
            "torrent_files_updated",
        );
        assert_event_kind(
            &Event::FreeSpaceForPath {
                path: "/srv".into(),
                success: false,
                bytes: 0,
            },
            "free_space_for_path",
        );
        assert_event_kind(&Event::TorrentAddError, "torrent_add_error");
    }

    #[test]
    fn add_outcomes_are_classified() {
        assert!(Event::TorrentAddDuplicate.is_add_outcome());
        assert!(
            Event::TorrentAdded {
                torrent_id: TorrentId(3),
                hash_string: "abc".into(),
                name: "demo".into(),
            }
            .is_add_outcome()
        );
        assert!(!Event::AboutToDisconnect.is_add_outcome());
    }

    #[test]
    fn envelope_serializes_with_type_tag() -> anyhow::Result<()> {
        let envelope = EventEnvelope {
            id: 7,
            timestamp: Utc::now(),
            event: Event::DownloadDirFreeSpace { bytes: 1_024 },
        };
        let json = serde_json::to_value(&envelope)?;
        assert_eq!(json["id"], 7);
        assert_eq!(json["event"]["type"], "download_dir_free_space");
        assert_eq!(json["event"]["bytes"], 1_024);

        let back: EventEnvelope = serde_json::from_value(json)?;
        assert_eq!(back, envelope);
        Ok(())
    }

    fn assert_event_kind(event: &Event, expected: &str) {
        assert_eq!(event.kind(), expected);
    }
}
