//! Command definitions marshalled from caller threads onto the worker.

use trellis_core::{
    AddTorrentFile, AddTorrentLink, QueueMove, Server, SettingsChange, TorrentChange, TorrentId,
};

/// One session operation with owned arguments, executed on the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Install a connection profile.
    SetServer(Box<Server>),
    /// Forget the connection profile.
    ResetServer,
    /// Connect to the configured server.
    Connect,
    /// Drop the connection.
    Disconnect,
    /// Pause or resume periodic updates.
    SetUpdateDisabled(bool),
    /// Force an immediate refresh.
    UpdateData,
    /// Apply a session-wide settings change.
    Settings(SettingsChange),
    /// Add a torrent from metainfo bytes.
    AddTorrentFile(Box<AddTorrentFile>),
    /// Add a torrent from a link.
    AddTorrentLink(Box<AddTorrentLink>),
    /// Start torrents, honouring the queue.
    StartTorrents(Vec<TorrentId>),
    /// Start torrents, bypassing the queue.
    StartTorrentsNow(Vec<TorrentId>),
    /// Pause torrents.
    PauseTorrents(Vec<TorrentId>),
    /// Remove torrents.
    RemoveTorrents {
        /// Torrents to remove.
        ids: Vec<TorrentId>,
        /// Whether downloaded data is deleted too.
        delete_files: bool,
    },
    /// Verify local data.
    CheckTorrents(Vec<TorrentId>),
    /// Reannounce to trackers.
    ReannounceTorrents(Vec<TorrentId>),
    /// Move torrents within the queue.
    MoveTorrents {
        /// Torrents to move.
        ids: Vec<TorrentId>,
        /// Direction of the move.
        movement: QueueMove,
    },
    /// Change the download directory of torrents.
    SetTorrentsLocation {
        /// Torrents to relocate.
        ids: Vec<TorrentId>,
        /// New directory.
        location: String,
        /// Whether existing data is moved.
        move_files: bool,
    },
    /// Change a property of one torrent, resolved by id on the worker.
    Torrent {
        /// Target torrent.
        id: TorrentId,
        /// Property change.
        change: TorrentChange,
    },
    /// Rename a file inside one torrent, resolved by id on the worker.
    RenameTorrentFile {
        /// Target torrent.
        id: TorrentId,
        /// Current path of the file or directory.
        file_path: String,
        /// New last path component.
        new_name: String,
    },
    /// Query free space of the default download directory.
    GetDownloadDirFreeSpace,
    /// Query free space of a path.
    GetFreeSpaceForPath(String),
    /// Disconnect, flush and stop the worker.
    Shutdown,
}

impl Command {
    /// Short identifier used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SetServer(_) => "set_server",
            Self::ResetServer => "reset_server",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::SetUpdateDisabled(_) => "set_update_disabled",
            Self::UpdateData => "update_data",
            Self::Settings(_) => "settings",
            Self::AddTorrentFile(_) => "add_torrent_file",
            Self::AddTorrentLink(_) => "add_torrent_link",
            Self::StartTorrents(_) => "start_torrents",
            Self::StartTorrentsNow(_) => "start_torrents_now",
            Self::PauseTorrents(_) => "pause_torrents",
            Self::RemoveTorrents { .. } => "remove_torrents",
            Self::CheckTorrents(_) => "check_torrents",
            Self::ReannounceTorrents(_) => "reannounce_torrents",
            Self::MoveTorrents { .. } => "move_torrents",
            Self::SetTorrentsLocation { .. } => "set_torrents_location",
            Self::Torrent { .. } => "torrent",
            Self::RenameTorrentFile { .. } => "rename_torrent_file",
            Self::GetDownloadDirFreeSpace => "get_download_dir_free_space",
            Self::GetFreeSpaceForPath(_) => "get_free_space_for_path",
            Self::Shutdown => "shutdown",
        }
    }

    /// Torrent the command is addressed to, for per-entity commands.
    #[must_use]
    pub const fn torrent_id(&self) -> Option<TorrentId> {
        match self {
            Self::Torrent { id, .. } | Self::RenameTorrentFile { id, .. } => Some(*id),
            _ => None,
        }
    }
}
