//! Session-wide daemon settings as a flat property set.
//!
//! Mutations flow through [`SettingsChange`], one variant per property, so the
//! caller-side shadow and the engine apply exactly the same update.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Days on which scheduled alternative speed limits are active.
///
/// Values mirror the daemon's day bitmask (Sunday is bit 0).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeSpeedLimitsDays {
    /// Sundays only.
    Sunday,
    /// Mondays only.
    Monday,
    /// Tuesdays only.
    Tuesday,
    /// Wednesdays only.
    Wednesday,
    /// Thursdays only.
    Thursday,
    /// Fridays only.
    Friday,
    /// Saturdays only.
    Saturday,
    /// Monday through Friday.
    Weekdays,
    /// Saturday and Sunday.
    Weekends,
    /// Every day.
    #[default]
    All,
}

impl AlternativeSpeedLimitsDays {
    /// Daemon bitmask for this value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Sunday => 1,
            Self::Monday => 1 << 1,
            Self::Tuesday => 1 << 2,
            Self::Wednesday => 1 << 3,
            Self::Thursday => 1 << 4,
            Self::Friday => 1 << 5,
            Self::Saturday => 1 << 6,
            Self::Weekdays => 0b0011_1110,
            Self::Weekends => 0b0100_0001,
            Self::All => 0b0111_1111,
        }
    }

    /// Parse a daemon bitmask; unknown combinations yield `None`.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        let days = match bits {
            1 => Self::Sunday,
            0b10 => Self::Monday,
            0b100 => Self::Tuesday,
            0b1000 => Self::Wednesday,
            0b1_0000 => Self::Thursday,
            0b10_0000 => Self::Friday,
            0b100_0000 => Self::Saturday,
            0b0011_1110 => Self::Weekdays,
            0b0100_0001 => Self::Weekends,
            0b0111_1111 => Self::All,
            _ => return None,
        };
        Some(days)
    }
}

/// Peer connection encryption policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    /// Accept plaintext and encrypted peers.
    Allowed,
    /// Prefer encrypted peers.
    #[default]
    Preferred,
    /// Only talk to encrypted peers.
    Required,
}

/// Value copy of every session-wide daemon property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServerSettingsSnapshot {
    /// Default download directory.
    pub download_directory: String,
    /// Whether newly added torrents start immediately.
    pub start_added_torrents: bool,
    /// Whether `.torrent` files are deleted after adding.
    pub trash_torrent_files: bool,
    /// Whether incomplete files get a `.part` suffix.
    pub rename_incomplete_files: bool,
    /// Whether incomplete data lives in a separate directory.
    pub incomplete_directory_enabled: bool,
    /// Directory for incomplete data.
    pub incomplete_directory: String,
    /// Whether the global seed ratio limit applies.
    pub ratio_limited: bool,
    /// Global seed ratio limit.
    pub ratio_limit: f64,
    /// Whether the global idle seeding limit applies.
    pub idle_seeding_limited: bool,
    /// Global idle seeding limit in minutes.
    pub idle_seeding_limit: i32,
    /// Whether the download queue is enforced.
    pub download_queue_enabled: bool,
    /// Maximum number of concurrently downloading torrents.
    pub download_queue_size: i32,
    /// Whether the seed queue is enforced.
    pub seed_queue_enabled: bool,
    /// Maximum number of concurrently seeding torrents.
    pub seed_queue_size: i32,
    /// Whether stalled torrents stop counting against the queue.
    pub idle_queue_limited: bool,
    /// Minutes without transfer before a torrent counts as stalled.
    pub idle_queue_limit: i32,
    /// Whether the global download limit applies.
    pub download_speed_limited: bool,
    /// Global download limit in KiB/s.
    pub download_speed_limit: i32,
    /// Whether the global upload limit applies.
    pub upload_speed_limited: bool,
    /// Global upload limit in KiB/s.
    pub upload_speed_limit: i32,
    /// Whether alternative speed limits are active.
    pub alternative_speed_limits_enabled: bool,
    /// Alternative download limit in KiB/s.
    pub alternative_download_speed_limit: i32,
    /// Alternative upload limit in KiB/s.
    pub alternative_upload_speed_limit: i32,
    /// Whether alternative limits follow a schedule.
    pub alternative_speed_limits_scheduled: bool,
    /// Start of the scheduled window.
    pub alternative_speed_limits_begin_time: NaiveTime,
    /// End of the scheduled window.
    pub alternative_speed_limits_end_time: NaiveTime,
    /// Days the schedule applies to.
    pub alternative_speed_limits_days: AlternativeSpeedLimitsDays,
    /// Incoming peer port.
    pub peer_port: u16,
    /// Whether the peer port is randomised on daemon start.
    pub random_port_enabled: bool,
    /// Whether UPnP/NAT-PMP port forwarding is requested.
    pub port_forwarding_enabled: bool,
    /// Peer encryption policy.
    pub encryption_mode: EncryptionMode,
    /// Whether µTP is enabled.
    pub utp_enabled: bool,
    /// Whether peer exchange is enabled.
    pub pex_enabled: bool,
    /// Whether the DHT is enabled.
    pub dht_enabled: bool,
    /// Whether local peer discovery is enabled.
    pub lpd_enabled: bool,
    /// Peer limit per torrent.
    pub maximum_peers_per_torrent: i32,
    /// Peer limit across all torrents.
    pub maximum_peers_globally: i32,
}

impl Default for ServerSettingsSnapshot {
    fn default() -> Self {
        Self {
            download_directory: String::new(),
            start_added_torrents: true,
            trash_torrent_files: false,
            rename_incomplete_files: false,
            incomplete_directory_enabled: false,
            incomplete_directory: String::new(),
            ratio_limited: false,
            ratio_limit: 2.0,
            idle_seeding_limited: false,
            idle_seeding_limit: 30,
            download_queue_enabled: true,
            download_queue_size: 5,
            seed_queue_enabled: false,
            seed_queue_size: 10,
            idle_queue_limited: true,
            idle_queue_limit: 30,
            download_speed_limited: false,
            download_speed_limit: 100,
            upload_speed_limited: false,
            upload_speed_limit: 100,
            alternative_speed_limits_enabled: false,
            alternative_download_speed_limit: 50,
            alternative_upload_speed_limit: 50,
            alternative_speed_limits_scheduled: false,
            alternative_speed_limits_begin_time: NaiveTime::from_hms_opt(9, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            alternative_speed_limits_end_time: NaiveTime::from_hms_opt(17, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            alternative_speed_limits_days: AlternativeSpeedLimitsDays::All,
            peer_port: 51413,
            random_port_enabled: false,
            port_forwarding_enabled: true,
            encryption_mode: EncryptionMode::Preferred,
            utp_enabled: true,
            pex_enabled: true,
            dht_enabled: true,
            lpd_enabled: false,
            maximum_peers_per_torrent: 50,
            maximum_peers_globally: 200,
        }
    }
}

macro_rules! settings_changes {
    ($($(#[$doc:meta])* $variant:ident($ty:ty) => $field:ident,)+) => {
        /// A single settings mutation; one variant per [`ServerSettingsSnapshot`] field.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "field", content = "value", rename_all = "snake_case")]
        pub enum SettingsChange {
            $($(#[$doc])* $variant($ty),)+
        }

        #[allow(clippy::clone_on_copy)]
        impl SettingsChange {
            /// Name of the property this change writes.
            #[must_use]
            pub const fn field_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($field),)+
                }
            }

            /// Write the carried value into `settings`.
            pub fn apply_to(&self, settings: &mut ServerSettingsSnapshot) {
                match self {
                    $(Self::$variant(value) => settings.$field = value.clone(),)+
                }
            }

            /// Changes that turn `from` into `to`, in declaration order.
            #[must_use]
            pub fn diff(from: &ServerSettingsSnapshot, to: &ServerSettingsSnapshot) -> Vec<Self> {
                let mut changes = Vec::new();
                $(
                    if from.$field != to.$field {
                        changes.push(Self::$variant(to.$field.clone()));
                    }
                )+
                changes
            }
        }
    };
}

settings_changes! {
    /// Set the default download directory.
    DownloadDirectory(String) => download_directory,
    /// Toggle starting torrents on add.
    StartAddedTorrents(bool) => start_added_torrents,
    /// Toggle deleting `.torrent` files after adding.
    TrashTorrentFiles(bool) => trash_torrent_files,
    /// Toggle the `.part` suffix for incomplete files.
    RenameIncompleteFiles(bool) => rename_incomplete_files,
    /// Toggle the incomplete directory.
    IncompleteDirectoryEnabled(bool) => incomplete_directory_enabled,
    /// Set the incomplete directory.
    IncompleteDirectory(String) => incomplete_directory,
    /// Toggle the global ratio limit.
    RatioLimited(bool) => ratio_limited,
    /// Set the global ratio limit.
    RatioLimit(f64) => ratio_limit,
    /// Toggle the global idle seeding limit.
    IdleSeedingLimited(bool) => idle_seeding_limited,
    /// Set the global idle seeding limit in minutes.
    IdleSeedingLimit(i32) => idle_seeding_limit,
    /// Toggle the download queue.
    DownloadQueueEnabled(bool) => download_queue_enabled,
    /// Set the download queue size.
    DownloadQueueSize(i32) => download_queue_size,
    /// Toggle the seed queue.
    SeedQueueEnabled(bool) => seed_queue_enabled,
    /// Set the seed queue size.
    SeedQueueSize(i32) => seed_queue_size,
    /// Toggle the stalled-torrent queue exemption.
    IdleQueueLimited(bool) => idle_queue_limited,
    /// Set the stalled-torrent threshold in minutes.
    IdleQueueLimit(i32) => idle_queue_limit,
    /// Toggle the global download limit.
    DownloadSpeedLimited(bool) => download_speed_limited,
    /// Set the global download limit in KiB/s.
    DownloadSpeedLimit(i32) => download_speed_limit,
    /// Toggle the global upload limit.
    UploadSpeedLimited(bool) => upload_speed_limited,
    /// Set the global upload limit in KiB/s.
    UploadSpeedLimit(i32) => upload_speed_limit,
    /// Toggle alternative speed limits.
    AlternativeSpeedLimitsEnabled(bool) => alternative_speed_limits_enabled,
    /// Set the alternative download limit in KiB/s.
    AlternativeDownloadSpeedLimit(i32) => alternative_download_speed_limit,
    /// Set the alternative upload limit in KiB/s.
    AlternativeUploadSpeedLimit(i32) => alternative_upload_speed_limit,
    /// Toggle the alternative limit schedule.
    AlternativeSpeedLimitsScheduled(bool) => alternative_speed_limits_scheduled,
    /// Set the start of the scheduled window.
    AlternativeSpeedLimitsBeginTime(NaiveTime) => alternative_speed_limits_begin_time,
    /// Set the end of the scheduled window.
    AlternativeSpeedLimitsEndTime(NaiveTime) => alternative_speed_limits_end_time,
    /// Set the scheduled days.
    AlternativeSpeedLimitsDays(AlternativeSpeedLimitsDays) => alternative_speed_limits_days,
    /// Set the incoming peer port.
    PeerPort(u16) => peer_port,
    /// Toggle peer port randomisation.
    RandomPortEnabled(bool) => random_port_enabled,
    /// Toggle port forwarding.
    PortForwardingEnabled(bool) => port_forwarding_enabled,
    /// Set the encryption policy.
    EncryptionMode(EncryptionMode) => encryption_mode,
    /// Toggle µTP.
    UtpEnabled(bool) => utp_enabled,
    /// Toggle peer exchange.
    PexEnabled(bool) => pex_enabled,
    /// Toggle the DHT.
    DhtEnabled(bool) => dht_enabled,
    /// Toggle local peer discovery.
    LpdEnabled(bool) => lpd_enabled,
    /// Set the per-torrent peer limit.
    MaximumPeersPerTorrent(i32) => maximum_peers_per_torrent,
    /// Set the global peer limit.
    MaximumPeersGlobally(i32) => maximum_peers_globally,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_daemon() {
        let settings = ServerSettingsSnapshot::default();
        assert_eq!(settings.peer_port, 51413);
        assert_eq!(settings.encryption_mode, EncryptionMode::Preferred);
        assert_eq!(
            settings.alternative_speed_limits_begin_time,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert!(settings.start_added_torrents);
    }

    #[test]
    fn change_writes_named_field() {
        let mut settings = ServerSettingsSnapshot::default();
        let change = SettingsChange::DownloadSpeedLimit(512);
        change.apply_to(&mut settings);
        assert_eq!(settings.download_speed_limit, 512);
        assert_eq!(change.field_name(), "download_speed_limit");

        SettingsChange::DownloadDirectory("/srv/data".to_string()).apply_to(&mut settings);
        assert_eq!(settings.download_directory, "/srv/data");
    }

    #[test]
    fn diff_reproduces_target() {
        let from = ServerSettingsSnapshot::default();
        let mut to = from.clone();
        to.dht_enabled = false;
        to.peer_port = 6881;
        to.alternative_speed_limits_days = AlternativeSpeedLimitsDays::Weekends;

        let changes = SettingsChange::diff(&from, &to);
        assert_eq!(changes.len(), 3);

        let mut rebuilt = from;
        for change in &changes {
            change.apply_to(&mut rebuilt);
        }
        assert_eq!(rebuilt, to);
    }

    #[test]
    fn day_bits_parse_back() {
        assert_eq!(
            AlternativeSpeedLimitsDays::from_bits(AlternativeSpeedLimitsDays::Weekdays.bits()),
            Some(AlternativeSpeedLimitsDays::Weekdays)
        );
        assert_eq!(AlternativeSpeedLimitsDays::from_bits(0b11), None);
    }

    #[test]
    fn change_serializes_with_field_tag() -> anyhow::Result<()> {
        let json = serde_json::to_value(SettingsChange::PeerPort(6881))?;
        assert_eq!(json["field"], "peer_port");
        assert_eq!(json["value"], 6881);
        Ok(())
    }
}
