use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LimitMode, Priority, TorrentId, TrackerId};

/// Lifecycle state reported by the daemon for a torrent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// Stopped by the user.
    #[default]
    Paused,
    /// Transferring payload data.
    Downloading,
    /// Complete and uploading.
    Seeding,
    /// Waiting for a download slot.
    QueuedForDownloading,
    /// Waiting for a seeding slot.
    QueuedForSeeding,
    /// Waiting for a verification slot.
    QueuedForChecking,
    /// Verifying local data.
    Checking,
    /// Stopped because of an error.
    Errored,
}

/// Announce state of a tracker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Not announcing.
    #[default]
    Inactive,
    /// Idle until the next announce.
    WaitingForUpdate,
    /// Announce queued.
    QueuedForUpdate,
    /// Announce in flight.
    Updating,
}

/// Value copy of one tracker entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Tracker identifier within the torrent.
    pub id: TrackerId,
    /// Announce URL.
    pub announce: String,
    /// Registrable domain of the announce URL.
    pub site: String,
    /// Current announce state.
    pub status: TrackerStatus,
    /// Last error reported by the tracker.
    pub error_message: Option<String>,
    /// Peers returned by the last announce.
    pub peers: i32,
    /// Seeders reported by the last scrape.
    pub seeders: i32,
    /// Leechers reported by the last scrape.
    pub leechers: i32,
    /// Time of the next scheduled announce.
    pub next_update: Option<DateTime<Utc>>,
}

/// Value copy of one torrent at the moment of notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    /// Daemon-assigned identifier.
    pub id: TorrentId,
    /// Hex info hash.
    pub hash_string: String,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub status: TorrentStatus,
    /// Error text when `status` is `Errored`.
    pub error_string: Option<String>,
    /// Position in the download/seed queue.
    pub queue_position: i32,
    /// Size of all files in bytes.
    pub total_size: i64,
    /// Size of the wanted files in bytes.
    pub size_when_done: i64,
    /// Bytes still missing from the wanted files.
    pub left_until_done: i64,
    /// Completion ratio of the wanted files (0.0 to 1.0).
    pub percent_done: f64,
    /// Download speed in bytes per second.
    pub download_speed: i64,
    /// Upload speed in bytes per second.
    pub upload_speed: i64,
    /// Bytes downloaded over the torrent's lifetime.
    pub total_downloaded: i64,
    /// Bytes uploaded over the torrent's lifetime.
    pub total_uploaded: i64,
    /// Share ratio.
    pub ratio: f64,
    /// Estimated seconds until completion, when known.
    pub eta: Option<i64>,
    /// Number of connected peers.
    pub peers_connected: i32,
    /// Directory holding the payload.
    pub download_directory: String,
    /// When the torrent was added.
    pub added_date: Option<DateTime<Utc>>,
    /// When the torrent finished downloading.
    pub done_date: Option<DateTime<Utc>>,
    /// Bandwidth priority.
    pub bandwidth_priority: Priority,
    /// Whether the download limit applies.
    pub download_speed_limited: bool,
    /// Download limit in KiB/s.
    pub download_speed_limit: i32,
    /// Whether the upload limit applies.
    pub upload_speed_limited: bool,
    /// Upload limit in KiB/s.
    pub upload_speed_limit: i32,
    /// How the ratio limit is resolved.
    pub ratio_limit_mode: LimitMode,
    /// Ratio limit used in `Single` mode.
    pub ratio_limit: f64,
    /// Maximum peers for this torrent.
    pub peers_limit: i32,
    /// Whether session-wide speed limits also apply.
    pub honor_session_limits: bool,
    /// How the idle seeding limit is resolved.
    pub idle_seeding_limit_mode: LimitMode,
    /// Idle seeding limit in minutes used in `Single` mode.
    pub idle_seeding_limit: i32,
    /// Trackers attached to the torrent.
    pub trackers: Vec<TrackerSnapshot>,
}

impl TorrentSnapshot {
    /// Fresh snapshot with daemon defaults for everything but identity.
    #[must_use]
    pub fn new(id: TorrentId, hash_string: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            hash_string: hash_string.into(),
            name: name.into(),
            honor_session_limits: true,
            peers_limit: 50,
            ratio_limit: 2.0,
            idle_seeding_limit: 30,
            ..Self::default()
        }
    }

    /// Whether all wanted data is present.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.size_when_done > 0 && self.left_until_done == 0
    }
}

/// Value copy of one file inside a torrent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Index of the file within the torrent metainfo.
    pub index: u32,
    /// Path relative to the torrent's download directory.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// Bytes already downloaded.
    pub completed_size: i64,
    /// Whether the file is selected for download.
    pub wanted: bool,
    /// Download priority.
    pub priority: Priority,
}

/// Value copy of one connected peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    /// Remote address; unique among a torrent's peers.
    pub address: String,
    /// Client name advertised by the peer.
    pub client: String,
    /// Bytes per second received from the peer.
    pub download_speed: i64,
    /// Bytes per second sent to the peer.
    pub upload_speed: i64,
    /// Fraction of the torrent the peer holds.
    pub progress: f64,
    /// Transmission-style peer flag string.
    pub flags: String,
}

/// Mutation of a single torrent's properties.
#[derive(Debug, Clone, PartialEq)]
pub enum TorrentChange {
    /// Toggle the download speed limit.
    DownloadSpeedLimited(bool),
    /// Set the download speed limit in KiB/s.
    DownloadSpeedLimit(i32),
    /// Toggle the upload speed limit.
    UploadSpeedLimited(bool),
    /// Set the upload speed limit in KiB/s.
    UploadSpeedLimit(i32),
    /// Choose how the ratio limit is resolved.
    RatioLimitMode(LimitMode),
    /// Set the ratio limit.
    RatioLimit(f64),
    /// Set the maximum number of peers.
    PeersLimit(i32),
    /// Toggle whether session-wide limits apply.
    HonorSessionLimits(bool),
    /// Set the bandwidth priority.
    BandwidthPriority(Priority),
    /// Choose how the idle seeding limit is resolved.
    IdleSeedingLimitMode(LimitMode),
    /// Set the idle seeding limit in minutes.
    IdleSeedingLimit(i32),
    /// Select or deselect every file.
    FilesEnabled(bool),
    /// Select or deselect specific files.
    FilesWanted {
        /// File indices to update.
        files: Vec<u32>,
        /// New selection state.
        wanted: bool,
    },
    /// Set the download priority of specific files.
    FilesPriority {
        /// File indices to update.
        files: Vec<u32>,
        /// New priority.
        priority: Priority,
    },
    /// Append trackers by announce URL.
    AddTrackers(Vec<String>),
    /// Replace the announce URL of one tracker.
    SetTracker {
        /// Tracker to edit.
        tracker_id: TrackerId,
        /// New announce URL.
        announce: String,
    },
    /// Remove trackers by id.
    RemoveTrackers(Vec<TrackerId>),
    /// Toggle peer list reporting for the torrent.
    PeersEnabled(bool),
}

impl TorrentChange {
    /// Short identifier used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DownloadSpeedLimited(_) => "download_speed_limited",
            Self::DownloadSpeedLimit(_) => "download_speed_limit",
            Self::UploadSpeedLimited(_) => "upload_speed_limited",
            Self::UploadSpeedLimit(_) => "upload_speed_limit",
            Self::RatioLimitMode(_) => "ratio_limit_mode",
            Self::RatioLimit(_) => "ratio_limit",
            Self::PeersLimit(_) => "peers_limit",
            Self::HonorSessionLimits(_) => "honor_session_limits",
            Self::BandwidthPriority(_) => "bandwidth_priority",
            Self::IdleSeedingLimitMode(_) => "idle_seeding_limit_mode",
            Self::IdleSeedingLimit(_) => "idle_seeding_limit",
            Self::FilesEnabled(_) => "files_enabled",
            Self::FilesWanted { .. } => "files_wanted",
            Self::FilesPriority { .. } => "files_priority",
            Self::AddTrackers(_) => "add_trackers",
            Self::SetTracker { .. } => "set_tracker",
            Self::RemoveTrackers(_) => "remove_trackers",
            Self::PeersEnabled(_) => "peers_enabled",
        }
    }

    /// Apply the change to a torrent snapshot.
    ///
    /// Only properties carried by [`TorrentSnapshot`] are touched; file and
    /// peer changes and tracker additions (whose ids the daemon assigns) leave
    /// the snapshot as is.
    pub fn apply_to(&self, torrent: &mut TorrentSnapshot) {
        match self {
            Self::DownloadSpeedLimited(limited) => torrent.download_speed_limited = *limited,
            Self::DownloadSpeedLimit(limit) => torrent.download_speed_limit = *limit,
            Self::UploadSpeedLimited(limited) => torrent.upload_speed_limited = *limited,
            Self::UploadSpeedLimit(limit) => torrent.upload_speed_limit = *limit,
            Self::RatioLimitMode(mode) => torrent.ratio_limit_mode = *mode,
            Self::RatioLimit(limit) => torrent.ratio_limit = *limit,
            Self::PeersLimit(limit) => torrent.peers_limit = *limit,
            Self::HonorSessionLimits(honor) => torrent.honor_session_limits = *honor,
            Self::BandwidthPriority(priority) => torrent.bandwidth_priority = *priority,
            Self::IdleSeedingLimitMode(mode) => torrent.idle_seeding_limit_mode = *mode,
            Self::IdleSeedingLimit(limit) => torrent.idle_seeding_limit = *limit,
            Self::SetTracker {
                tracker_id,
                announce,
            } => {
                if let Some(tracker) = torrent
                    .trackers
                    .iter_mut()
                    .find(|tracker| tracker.id == *tracker_id)
                {
                    tracker.announce.clone_from(announce);
                }
            }
            Self::RemoveTrackers(ids) => {
                torrent.trackers.retain(|tracker| !ids.contains(&tracker.id));
            }
            Self::FilesEnabled(_)
            | Self::FilesWanted { .. }
            | Self::FilesPriority { .. }
            | Self::AddTrackers(_)
            | Self::PeersEnabled(_) => {}
        }
    }
}
