//! Boundary between the bridge worker and a concrete session engine.

use async_trait::async_trait;

use crate::delta::IndexRange;
use crate::error::SessionResult;
use crate::model::{
    AddTorrentFile, AddTorrentLink, ConnectionState, FileSnapshot, PeerSnapshot, QueueMove,
    RpcError, Server, ServerStats, TorrentChange, TorrentId, TorrentSnapshot,
};
use crate::settings::{ServerSettingsSnapshot, SettingsChange};

/// Raw range notification for an ordered collection.
///
/// `removed` indexes the previous collection; `changed` indexes the current
/// collection without its last `added_count` items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeNotification {
    /// Ranges removed from the previous collection.
    pub removed: Vec<IndexRange>,
    /// Ranges of surviving items whose state changed.
    pub changed: Vec<IndexRange>,
    /// Number of items appended at the tail.
    pub added_count: usize,
}

impl RangeNotification {
    /// Notification that only reports changed items, by index.
    #[must_use]
    pub fn changed_indices<I>(indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self {
            removed: Vec::new(),
            changed: IndexRange::coalesce(indices),
            added_count: 0,
        }
    }
}

/// Change notification queued by an engine, drained through
/// [`SessionEngine::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The connection is about to be torn down.
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
    /// Authoritative session settings were received.
    ServerSettingsChanged,
    /// The torrent list changed.
    TorrentsUpdated(RangeNotification),
    /// A torrent's file list changed.
    TorrentFilesUpdated {
        /// Parent torrent.
        torrent_id: TorrentId,
        /// File ranges.
        update: RangeNotification,
    },
    /// A torrent's peer list changed.
    TorrentPeersUpdated {
        /// Parent torrent.
        torrent_id: TorrentId,
        /// Peer ranges.
        update: RangeNotification,
    },
    /// Transfer statistics were refreshed.
    ServerStatsUpdated,
    /// A torrent was admitted.
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
    /// Result of a free-space query for an arbitrary path.
    FreeSpaceForPath {
        /// Queried path.
        path: String,
        /// Whether the daemon could answer.
        success: bool,
        /// Available bytes when `success` is true.
        bytes: i64,
    },
}

/// Live session state owned by the worker thread.
///
/// Mutators return once the request has been issued; their outcome arrives
/// later as [`EngineEvent`]s. Accessors expose the engine's current collections
/// and must only be called on the worker.
#[async_trait]
pub trait SessionEngine: Send {
    /// Install a connection profile, disconnecting from any previous server.
    async fn set_server(&mut self, server: Server) -> SessionResult<()>;
    /// Forget the connection profile.
    async fn reset_server(&mut self) -> SessionResult<()>;
    /// Connect to the configured server.
    async fn connect(&mut self) -> SessionResult<()>;
    /// Drop the connection.
    async fn disconnect(&mut self) -> SessionResult<()>;
    /// Pause or resume periodic updates.
    async fn set_update_disabled(&mut self, disabled: bool) -> SessionResult<()>;
    /// Request an immediate refresh.
    async fn update_data(&mut self) -> SessionResult<()>;
    /// Drive timers and network callbacks; called on every poll interval.
    async fn tick(&mut self) -> SessionResult<()>;

    /// Apply one session-wide settings change.
    async fn apply_settings_change(&mut self, change: &SettingsChange) -> SessionResult<()>;

    /// Add a torrent from metainfo bytes.
    async fn add_torrent_file(&mut self, request: AddTorrentFile) -> SessionResult<()>;
    /// Add a torrent from a magnet link or URL.
    async fn add_torrent_link(&mut self, request: AddTorrentLink) -> SessionResult<()>;
    /// Start torrents, honouring the queue.
    async fn start_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()>;
    /// Start torrents, bypassing the queue.
    async fn start_torrents_now(&mut self, ids: &[TorrentId]) -> SessionResult<()>;
    /// Pause torrents.
    async fn pause_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()>;
    /// Remove torrents, optionally deleting their data.
    async fn remove_torrents(&mut self, ids: &[TorrentId], delete_files: bool)
    -> SessionResult<()>;
    /// Verify local data.
    async fn check_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()>;
    /// Ask trackers for more peers.
    async fn reannounce_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()>;
    /// Move torrents within the queue.
    async fn move_torrents(&mut self, ids: &[TorrentId], movement: QueueMove)
    -> SessionResult<()>;
    /// Change the download directory of torrents.
    async fn set_torrents_location(
        &mut self,
        ids: &[TorrentId],
        location: &str,
        move_files: bool,
    ) -> SessionResult<()>;
    /// Apply a property change to the torrent at `index` in [`Self::torrents`].
    async fn apply_torrent_change(
        &mut self,
        index: usize,
        change: &TorrentChange,
    ) -> SessionResult<()>;
    /// Rename a file or directory inside the torrent at `index`.
    async fn rename_torrent_file(
        &mut self,
        index: usize,
        file_path: &str,
        new_name: &str,
    ) -> SessionResult<()>;
    /// Query free space of the default download directory.
    async fn get_download_dir_free_space(&mut self) -> SessionResult<()>;
    /// Query free space of an arbitrary path.
    async fn get_free_space_for_path(&mut self, path: &str) -> SessionResult<()>;

    /// Drain queued change notifications.
    async fn poll_events(&mut self) -> SessionResult<Vec<EngineEvent>>;

    /// Current authoritative settings.
    fn settings(&self) -> &ServerSettingsSnapshot;
    /// Live ordered torrent collection.
    fn torrents(&self) -> &[TorrentSnapshot];
    /// Position of a torrent in [`Self::torrents`].
    fn torrent_index(&self, id: TorrentId) -> Option<usize>;
    /// Live file list of a torrent, if it exists.
    fn torrent_files(&self, id: TorrentId) -> Option<&[FileSnapshot]>;
    /// Live peer list of a torrent, if it exists.
    fn torrent_peers(&self, id: TorrentId) -> Option<&[PeerSnapshot]>;
    /// Latest transfer statistics.
    fn server_stats(&self) -> ServerStats;
    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;
    /// Last connection error.
    fn error(&self) -> RpcError;

    /// Look up a torrent by id.
    fn torrent(&self, id: TorrentId) -> Option<&TorrentSnapshot> {
        self.torrent_index(id)
            .and_then(|index| self.torrents().get(index))
    }

    /// Whether the engine is connected.
    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_indices_coalesce_into_ranges() {
        let update = RangeNotification::changed_indices([2, 3, 4, 9]);
        assert!(update.removed.is_empty());
        assert_eq!(update.added_count, 0);
        assert_eq!(
            update.changed,
            vec![IndexRange::new(2, 5), IndexRange::new(9, 10)]
        );
    }
}
