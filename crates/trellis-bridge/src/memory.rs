//! In-memory session engine that behaves like a small daemon.
//!
//! Used for loopback operation and tests. Torrents live in memory, transfers
//! advance a fixed fraction per update cycle, and every mutation reports its
//! outcome through [`EngineEvent`]s exactly like a remote daemon would.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use trellis_core::{
    AddTorrentFile, AddTorrentLink, ConnectionState, EngineEvent, FileSnapshot, IndexRange,
    LimitMode, PeerSnapshot, Priority, QueueMove, RangeNotification, RpcError, Server,
    ServerSettingsSnapshot, ServerStats, SessionEngine, SessionError, SessionResult,
    SettingsChange, TorrentChange, TorrentId, TorrentSnapshot, TorrentStatus, TrackerId,
    TrackerSnapshot, TrackerStatus,
};
use url::{Host, Url};

/// Number of update cycles a download takes from start to finish.
const DOWNLOAD_STEPS: i64 = 4;
/// Payload size assumed when the metainfo or link does not tell.
const DEFAULT_TORRENT_SIZE: i64 = 64 * 1024 * 1024;
/// Free space reported for the download directory.
const DEFAULT_FREE_SPACE: i64 = 1 << 40;
/// Update interval used when the server profile has none.
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Daemon-like engine keeping all session state in memory.
pub struct MemoryEngine {
    server: Option<Server>,
    state: ConnectionState,
    error: RpcError,
    update_disabled: bool,
    last_update: Option<Instant>,
    settings: ServerSettingsSnapshot,
    torrents: Vec<TorrentSnapshot>,
    index: HashMap<TorrentId, usize>,
    files: HashMap<TorrentId, Vec<FileSnapshot>>,
    peers: HashMap<TorrentId, Vec<PeerSnapshot>>,
    peer_pool: Vec<PeerSnapshot>,
    next_id: i32,
    next_tracker_id: i32,
    reported: Vec<TorrentId>,
    dirty: HashSet<TorrentId>,
    stats: ServerStats,
    free_space: i64,
    pending: Vec<EngineEvent>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Engine with daemon default settings and no server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: None,
            state: ConnectionState::Disconnected,
            error: RpcError::NoError,
            update_disabled: false,
            last_update: None,
            settings: ServerSettingsSnapshot::default(),
            torrents: Vec::new(),
            index: HashMap::new(),
            files: HashMap::new(),
            peers: HashMap::new(),
            peer_pool: default_peer_pool(),
            next_id: 1,
            next_tracker_id: 0,
            reported: Vec::new(),
            dirty: HashSet::new(),
            stats: ServerStats::default(),
            free_space: DEFAULT_FREE_SPACE,
            pending: Vec::new(),
        }
    }

    /// Replace the initial session settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ServerSettingsSnapshot) -> Self {
        self.settings = settings;
        self
    }

    /// Peers reported for a torrent once peer reporting is enabled on it.
    #[must_use]
    pub fn with_peer_pool(mut self, peers: Vec<PeerSnapshot>) -> Self {
        self.peer_pool = peers;
        self
    }

    /// Free space reported for the download directory.
    #[must_use]
    pub const fn with_free_space(mut self, bytes: i64) -> Self {
        self.free_space = bytes;
        self
    }

    fn ensure_connected(&self, operation: &'static str) -> SessionResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected { operation })
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.pending
                .push(EngineEvent::ConnectionStateChanged { state });
        }
    }

    fn set_error(&mut self, error: RpcError, message: &str, detailed_message: String) {
        if self.error != error {
            self.error = error;
            self.pending.push(EngineEvent::ErrorChanged {
                error,
                message: message.to_string(),
                detailed_message,
            });
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .torrents
            .iter()
            .enumerate()
            .map(|(position, torrent)| (torrent.id, position))
            .collect();
    }

    fn update_interval(&self) -> Duration {
        self.server
            .as_ref()
            .map_or(DEFAULT_UPDATE_INTERVAL, |server| server.update_interval)
    }

    /// Queue a torrent list notification covering everything since the last one.
    ///
    /// Torrents are only ever appended or removed, so the survivors of the
    /// previously reported list form the prefix of the current one.
    fn sync_torrents(&mut self, force: bool) {
        let current: Vec<TorrentId> = self.torrents().iter().map(|torrent| torrent.id).collect();
        let live: HashSet<TorrentId> = current.iter().copied().collect();

        let removed = IndexRange::coalesce(
            self.reported
                .iter()
                .enumerate()
                .filter(|(_, id)| !live.contains(id))
                .map(|(position, _)| position),
        );
        let survivors = self.reported.iter().filter(|id| live.contains(id)).count();
        let changed = IndexRange::coalesce(
            current[..survivors]
                .iter()
                .enumerate()
                .filter(|(_, id)| self.dirty.contains(id))
                .map(|(position, _)| position),
        );
        let added_count = current.len() - survivors;

        self.dirty.clear();
        self.reported = current;
        if !force && removed.is_empty() && changed.is_empty() && added_count == 0 {
            return;
        }
        self.pending
            .push(EngineEvent::TorrentsUpdated(RangeNotification {
                removed,
                changed,
                added_count,
            }));
    }

    fn push_file_update(&mut self, torrent_id: TorrentId, changed: Vec<usize>) {
        if !changed.is_empty() {
            self.pending.push(EngineEvent::TorrentFilesUpdated {
                torrent_id,
                update: RangeNotification::changed_indices(changed),
            });
        }
    }

    /// Periodic update: advance transfers, promote the queue, report state.
    fn refresh(&mut self, advance: bool) {
        self.last_update = Some(Instant::now());
        let interval_secs = i64::try_from(self.update_interval().as_secs())
            .unwrap_or(i64::MAX)
            .max(1);

        let mut file_updates = Vec::new();
        let mut peer_updates = Vec::new();
        let mut finished = Vec::new();
        let mut downloaded = 0;
        let mut uploaded = 0;

        if advance {
            for torrent in &mut self.torrents {
                match torrent.status {
                    TorrentStatus::Downloading => {
                        let files = self.files.entry(torrent.id).or_default();
                        let step = (torrent.size_when_done / DOWNLOAD_STEPS).max(1);
                        let before = torrent.left_until_done;
                        let changed = advance_files(files, step);
                        recompute_sizes(torrent, files);
                        let advanced = before - torrent.left_until_done;
                        torrent.download_speed = advanced / interval_secs;
                        torrent.total_downloaded += advanced;
                        downloaded += advanced;
                        file_updates.push((torrent.id, changed));

                        if torrent.left_until_done == 0 {
                            torrent.status = TorrentStatus::Seeding;
                            torrent.download_speed = 0;
                            torrent.eta = None;
                            torrent.done_date = Some(Utc::now());
                            finished.push(EngineEvent::TorrentFinished {
                                torrent_id: torrent.id,
                                hash_string: torrent.hash_string.clone(),
                                name: torrent.name.clone(),
                            });
                        } else if torrent.download_speed > 0 {
                            torrent.eta = Some(torrent.left_until_done / torrent.download_speed);
                        }
                        if let Some(peers) = self.peers.get_mut(&torrent.id)
                            && !peers.is_empty()
                        {
                            let share = torrent.download_speed
                                / i64::try_from(peers.len()).unwrap_or(i64::MAX);
                            for peer in peers.iter_mut() {
                                peer.download_speed = share;
                            }
                            peer_updates.push((torrent.id, peers.len()));
                        }
                    }
                    TorrentStatus::Seeding => {
                        let step = (torrent.size_when_done / (DOWNLOAD_STEPS * 2)).max(1);
                        torrent.upload_speed = step / interval_secs;
                        torrent.total_uploaded += step;
                        uploaded += step;
                        torrent.ratio = ratio(torrent.total_uploaded, torrent.total_downloaded);
                        if seed_limit_reached(torrent, &self.settings) {
                            torrent.status = TorrentStatus::Paused;
                            torrent.upload_speed = 0;
                        }
                    }
                    TorrentStatus::Checking => torrent.status = TorrentStatus::Paused,
                    _ => continue,
                }
                for tracker in &mut torrent.trackers {
                    if tracker.status == TrackerStatus::QueuedForUpdate {
                        tracker.status = TrackerStatus::WaitingForUpdate;
                    }
                }
                self.dirty.insert(torrent.id);
            }
        }
        self.promote_queue();

        self.stats.download_speed = self.torrents.iter().map(|t| t.download_speed).sum();
        self.stats.upload_speed = self.torrents.iter().map(|t| t.upload_speed).sum();
        for session in [&mut self.stats.current_session, &mut self.stats.total] {
            session.downloaded += downloaded;
            session.uploaded += uploaded;
            if advance {
                session.duration += interval_secs;
            }
        }

        self.sync_torrents(true);
        for (torrent_id, changed) in file_updates {
            self.push_file_update(torrent_id, changed);
        }
        for (torrent_id, count) in peer_updates {
            self.pending.push(EngineEvent::TorrentPeersUpdated {
                torrent_id,
                update: RangeNotification {
                    changed: vec![IndexRange::new(0, count)],
                    ..RangeNotification::default()
                },
            });
        }
        self.pending.extend(finished);
        self.pending.push(EngineEvent::ServerStatsUpdated);
    }

    fn promote_queue(&mut self) {
        if !self.settings.download_queue_enabled {
            return;
        }
        let limit = usize::try_from(self.settings.download_queue_size).unwrap_or(0);
        let mut active = self
            .torrents
            .iter()
            .filter(|torrent| torrent.status == TorrentStatus::Downloading)
            .count();
        let mut order: Vec<usize> = (0..self.torrents.len()).collect();
        order.sort_by_key(|&position| self.torrents[position].queue_position);
        for position in order {
            if active >= limit {
                break;
            }
            let torrent = &mut self.torrents[position];
            if torrent.status == TorrentStatus::QueuedForDownloading {
                torrent.status = TorrentStatus::Downloading;
                self.dirty.insert(torrent.id);
                active += 1;
            }
        }
    }

    fn for_each_torrent<F>(&mut self, ids: &[TorrentId], mut mutate: F)
    where
        F: FnMut(&mut TorrentSnapshot),
    {
        for id in ids {
            if let Some(&position) = self.index.get(id) {
                let torrent = &mut self.torrents[position];
                mutate(torrent);
                self.dirty.insert(torrent.id);
            } else {
                debug!(torrent_id = %id, "ignoring unknown torrent in bulk operation");
            }
        }
        self.sync_torrents(false);
    }

    fn start(&mut self, ids: &[TorrentId], bypass_queue: bool) {
        let queue_limit = (self.settings.download_queue_enabled && !bypass_queue)
            .then(|| usize::try_from(self.settings.download_queue_size).unwrap_or(0));
        let mut active = self
            .torrents
            .iter()
            .filter(|torrent| torrent.status == TorrentStatus::Downloading)
            .count();
        self.for_each_torrent(ids, |torrent| {
            torrent.status = if torrent.left_until_done == 0 {
                TorrentStatus::Seeding
            } else if queue_limit.is_some_and(|limit| active >= limit) {
                TorrentStatus::QueuedForDownloading
            } else {
                active += 1;
                TorrentStatus::Downloading
            };
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn admit(
        &mut self,
        hash_string: String,
        name: String,
        download_directory: String,
        files: Vec<FileSnapshot>,
        trackers: Vec<String>,
        bandwidth_priority: Priority,
        start: bool,
    ) {
        if !self.is_connected() {
            warn!(%name, "add requested while disconnected");
            self.pending.push(EngineEvent::TorrentAddError);
            return;
        }
        if self
            .torrents
            .iter()
            .any(|torrent| torrent.hash_string.eq_ignore_ascii_case(&hash_string))
        {
            debug!(%hash_string, "torrent already present");
            self.pending.push(EngineEvent::TorrentAddDuplicate);
            return;
        }

        let id = TorrentId(self.next_id);
        self.next_id += 1;
        let mut torrent = TorrentSnapshot::new(id, hash_string, name);
        torrent.download_directory = if download_directory.is_empty() {
            self.settings.download_directory.clone()
        } else {
            download_directory
        };
        torrent.queue_position = i32::try_from(self.torrents.len()).unwrap_or(i32::MAX);
        torrent.added_date = Some(Utc::now());
        torrent.bandwidth_priority = bandwidth_priority;
        torrent.peers_limit = self.settings.maximum_peers_per_torrent;
        torrent.trackers = trackers
            .into_iter()
            .map(|announce| self.new_tracker(announce))
            .collect();
        recompute_sizes(&mut torrent, &files);

        let event = EngineEvent::TorrentAdded {
            torrent_id: id,
            hash_string: torrent.hash_string.clone(),
            name: torrent.name.clone(),
        };
        let file_count = files.len();
        self.torrents.push(torrent);
        self.index.insert(id, self.torrents.len() - 1);
        self.files.insert(id, files);
        if start {
            self.start(&[id], false);
        }
        self.sync_torrents(false);
        if file_count > 0 {
            self.pending.push(EngineEvent::TorrentFilesUpdated {
                torrent_id: id,
                update: RangeNotification {
                    added_count: file_count,
                    ..RangeNotification::default()
                },
            });
        }
        self.pending.push(event);
    }

    fn new_tracker(&mut self, announce: String) -> TrackerSnapshot {
        let id = TrackerId(self.next_tracker_id);
        self.next_tracker_id += 1;
        TrackerSnapshot {
            id,
            site: site_of(&announce),
            announce,
            status: TrackerStatus::WaitingForUpdate,
            ..TrackerSnapshot::default()
        }
    }

    fn apply_file_change(&mut self, torrent_id: TorrentId, change: &TorrentChange) -> Vec<usize> {
        let Some(files) = self.files.get_mut(&torrent_id) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (position, file) in files.iter_mut().enumerate() {
            let index = file.index;
            let updated = match change {
                TorrentChange::FilesEnabled(wanted) => {
                    std::mem::replace(&mut file.wanted, *wanted) != *wanted
                }
                TorrentChange::FilesWanted {
                    files: selection,
                    wanted,
                } if selection.contains(&index) => {
                    std::mem::replace(&mut file.wanted, *wanted) != *wanted
                }
                TorrentChange::FilesPriority {
                    files: selection,
                    priority,
                } if selection.contains(&index) => {
                    std::mem::replace(&mut file.priority, *priority) != *priority
                }
                _ => false,
            };
            if updated {
                changed.push(position);
            }
        }
        if let Some(&position) = self.index.get(&torrent_id) {
            recompute_sizes(&mut self.torrents[position], files);
        }
        changed
    }

    fn set_peers_enabled(&mut self, torrent_id: TorrentId, enabled: bool) {
        let previous = self.peers.get(&torrent_id).map_or(0, Vec::len);
        let peers = if enabled {
            self.peer_pool.clone()
        } else {
            Vec::new()
        };
        let added_count = peers.len();
        self.peers.insert(torrent_id, peers);
        if let Some(&position) = self.index.get(&torrent_id) {
            self.torrents[position].peers_connected = i32::try_from(added_count).unwrap_or(0);
        }
        let removed = if previous > 0 {
            vec![IndexRange::new(0, previous)]
        } else {
            Vec::new()
        };
        self.pending.push(EngineEvent::TorrentPeersUpdated {
            torrent_id,
            update: RangeNotification {
                removed,
                changed: Vec::new(),
                added_count,
            },
        });
    }
}

#[async_trait]
impl SessionEngine for MemoryEngine {
    async fn set_server(&mut self, server: Server) -> SessionResult<()> {
        self.disconnect().await?;
        debug!(server = %server.url(), "server configured");
        self.server = Some(server);
        self.set_error(RpcError::NoError, "", String::new());
        Ok(())
    }

    async fn reset_server(&mut self) -> SessionResult<()> {
        self.disconnect().await?;
        self.server = None;
        Ok(())
    }

    async fn connect(&mut self) -> SessionResult<()> {
        let Some(server) = &self.server else {
            return Err(SessionError::NoServer {
                operation: "connect",
            });
        };
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        let address = server.address.clone();
        self.set_state(ConnectionState::Connecting);
        if address.is_empty() || address.ends_with(".invalid") {
            self.set_error(
                RpcError::ConnectionError,
                "Connection error",
                format!("could not resolve host '{address}'"),
            );
            self.set_state(ConnectionState::Disconnected);
            return Ok(());
        }
        self.set_error(RpcError::NoError, "", String::new());
        self.set_state(ConnectionState::Connected);
        self.pending.push(EngineEvent::ServerSettingsChanged);
        self.refresh(false);
        Ok(())
    }

    async fn disconnect(&mut self) -> SessionResult<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        if self.state == ConnectionState::Connected {
            self.pending.push(EngineEvent::AboutToDisconnect);
        }
        self.state = ConnectionState::Disconnected;
        self.last_update = None;
        self.sync_torrents(false);
        self.pending.push(EngineEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
        });
        Ok(())
    }

    async fn set_update_disabled(&mut self, disabled: bool) -> SessionResult<()> {
        self.update_disabled = disabled;
        Ok(())
    }

    async fn update_data(&mut self) -> SessionResult<()> {
        self.ensure_connected("update_data")?;
        self.refresh(true);
        Ok(())
    }

    async fn tick(&mut self) -> SessionResult<()> {
        if !self.is_connected() || self.update_disabled {
            return Ok(());
        }
        let interval = self.update_interval();
        if self
            .last_update
            .is_none_or(|last| last.elapsed() >= interval)
        {
            self.refresh(true);
        }
        Ok(())
    }

    async fn apply_settings_change(&mut self, change: &SettingsChange) -> SessionResult<()> {
        self.ensure_connected("apply_settings_change")?;
        change.apply_to(&mut self.settings);
        self.pending.push(EngineEvent::ServerSettingsChanged);
        Ok(())
    }

    async fn add_torrent_file(&mut self, request: AddTorrentFile) -> SessionResult<()> {
        let Some(metainfo) = Metainfo::parse(&request.metainfo) else {
            warn!(bytes = request.metainfo.len(), "metainfo is malformed");
            self.pending.push(EngineEvent::TorrentAddError);
            return Ok(());
        };
        let mut file = FileSnapshot {
            index: 0,
            path: metainfo.name.clone(),
            size: metainfo.length.unwrap_or(DEFAULT_TORRENT_SIZE),
            completed_size: 0,
            wanted: !request.unwanted_files.contains(&0),
            priority: Priority::Normal,
        };
        if request.high_priority_files.contains(&0) {
            file.priority = Priority::High;
        } else if request.low_priority_files.contains(&0) {
            file.priority = Priority::Low;
        }
        if let Some(renamed) = request.renamed_files.get(&file.path) {
            file.path.clone_from(renamed);
        }
        self.admit(
            metainfo.hash_string,
            metainfo.name,
            request.download_directory,
            vec![file],
            metainfo.trackers,
            request.bandwidth_priority,
            request.start,
        );
        Ok(())
    }

    async fn add_torrent_link(&mut self, request: AddTorrentLink) -> SessionResult<()> {
        let Some(link) = ParsedLink::parse(&request.link) else {
            warn!(link = %request.link, "unsupported torrent link");
            self.pending.push(EngineEvent::TorrentAddError);
            return Ok(());
        };
        let file = FileSnapshot {
            index: 0,
            path: link.name.clone(),
            size: DEFAULT_TORRENT_SIZE,
            completed_size: 0,
            wanted: true,
            priority: Priority::Normal,
        };
        self.admit(
            link.hash_string,
            link.name,
            request.download_directory,
            vec![file],
            link.trackers,
            request.bandwidth_priority,
            request.start,
        );
        Ok(())
    }

    async fn start_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()> {
        self.ensure_connected("start_torrents")?;
        self.start(ids, false);
        Ok(())
    }

    async fn start_torrents_now(&mut self, ids: &[TorrentId]) -> SessionResult<()> {
        self.ensure_connected("start_torrents_now")?;
        self.start(ids, true);
        Ok(())
    }

    async fn pause_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()> {
        self.ensure_connected("pause_torrents")?;
        self.for_each_torrent(ids, |torrent| {
            torrent.status = TorrentStatus::Paused;
            torrent.download_speed = 0;
            torrent.upload_speed = 0;
            torrent.eta = None;
        });
        Ok(())
    }

    async fn remove_torrents(&mut self, ids: &[TorrentId], delete_files: bool) -> SessionResult<()> {
        self.ensure_connected("remove_torrents")?;
        let doomed: HashSet<TorrentId> = ids.iter().copied().collect();
        if delete_files {
            self.free_space += self
                .torrents
                .iter()
                .filter(|torrent| doomed.contains(&torrent.id))
                .map(|torrent| torrent.size_when_done - torrent.left_until_done)
                .sum::<i64>();
        }
        self.torrents.retain(|torrent| !doomed.contains(&torrent.id));
        for id in &doomed {
            self.files.remove(id);
            self.peers.remove(id);
        }
        self.reindex();
        self.sync_torrents(false);
        Ok(())
    }

    async fn check_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()> {
        self.ensure_connected("check_torrents")?;
        self.for_each_torrent(ids, |torrent| {
            torrent.status = TorrentStatus::Checking;
            torrent.download_speed = 0;
            torrent.upload_speed = 0;
        });
        Ok(())
    }

    async fn reannounce_torrents(&mut self, ids: &[TorrentId]) -> SessionResult<()> {
        self.ensure_connected("reannounce_torrents")?;
        self.for_each_torrent(ids, |torrent| {
            for tracker in &mut torrent.trackers {
                tracker.status = TrackerStatus::QueuedForUpdate;
            }
        });
        Ok(())
    }

    async fn move_torrents(&mut self, ids: &[TorrentId], movement: QueueMove) -> SessionResult<()> {
        self.ensure_connected("move_torrents")?;
        let moving: HashSet<TorrentId> = ids.iter().copied().collect();
        let mut order: Vec<TorrentId> = {
            let mut by_position: Vec<&TorrentSnapshot> = self.torrents.iter().collect();
            by_position.sort_by_key(|torrent| torrent.queue_position);
            by_position.into_iter().map(|torrent| torrent.id).collect()
        };
        match movement {
            QueueMove::Top | QueueMove::Bottom => {
                let (moved, rest): (Vec<TorrentId>, Vec<TorrentId>) =
                    order.iter().copied().partition(|id| moving.contains(id));
                order = if movement == QueueMove::Top {
                    moved.into_iter().chain(rest).collect()
                } else {
                    rest.into_iter().chain(moved).collect()
                };
            }
            QueueMove::Up => {
                for position in 1..order.len() {
                    if moving.contains(&order[position]) && !moving.contains(&order[position - 1])
                    {
                        order.swap(position - 1, position);
                    }
                }
            }
            QueueMove::Down => {
                for position in (0..order.len().saturating_sub(1)).rev() {
                    if moving.contains(&order[position]) && !moving.contains(&order[position + 1])
                    {
                        order.swap(position, position + 1);
                    }
                }
            }
        }
        for (queue_position, id) in order.into_iter().enumerate() {
            let queue_position = i32::try_from(queue_position).unwrap_or(i32::MAX);
            if let Some(&position) = self.index.get(&id) {
                let torrent = &mut self.torrents[position];
                if torrent.queue_position != queue_position {
                    torrent.queue_position = queue_position;
                    self.dirty.insert(id);
                }
            }
        }
        self.sync_torrents(false);
        Ok(())
    }

    async fn set_torrents_location(
        &mut self,
        ids: &[TorrentId],
        location: &str,
        move_files: bool,
    ) -> SessionResult<()> {
        self.ensure_connected("set_torrents_location")?;
        debug!(%location, move_files, count = ids.len(), "relocating torrents");
        self.for_each_torrent(ids, |torrent| {
            torrent.download_directory = location.to_string();
        });
        Ok(())
    }

    async fn apply_torrent_change(
        &mut self,
        index: usize,
        change: &TorrentChange,
    ) -> SessionResult<()> {
        self.ensure_connected("apply_torrent_change")?;
        let Some(torrent) = self.torrents.get_mut(index) else {
            return Err(SessionError::InvalidInput {
                field: "index",
                reason: "torrent index out of range",
            });
        };
        let torrent_id = torrent.id;
        change.apply_to(torrent);

        let mut changed_files = Vec::new();
        match change {
            TorrentChange::AddTrackers(announces) => {
                let trackers: Vec<TrackerSnapshot> = announces
                    .iter()
                    .map(|announce| self.new_tracker(announce.clone()))
                    .collect();
                self.torrents[index].trackers.extend(trackers);
            }
            TorrentChange::SetTracker {
                tracker_id,
                announce,
            } => {
                if let Some(tracker) = self.torrents[index]
                    .trackers
                    .iter_mut()
                    .find(|tracker| tracker.id == *tracker_id)
                {
                    tracker.site = site_of(announce);
                }
            }
            TorrentChange::FilesEnabled(_)
            | TorrentChange::FilesWanted { .. }
            | TorrentChange::FilesPriority { .. } => {
                changed_files = self.apply_file_change(torrent_id, change);
            }
            TorrentChange::PeersEnabled(enabled) => self.set_peers_enabled(torrent_id, *enabled),
            _ => {}
        }
        self.dirty.insert(torrent_id);
        self.sync_torrents(false);
        self.push_file_update(torrent_id, changed_files);
        Ok(())
    }

    async fn rename_torrent_file(
        &mut self,
        index: usize,
        file_path: &str,
        new_name: &str,
    ) -> SessionResult<()> {
        self.ensure_connected("rename_torrent_file")?;
        if new_name.is_empty() || new_name.contains('/') {
            return Err(SessionError::InvalidInput {
                field: "new_name",
                reason: "name must be a single non-empty path component",
            });
        }
        let Some(torrent) = self.torrents.get_mut(index) else {
            return Err(SessionError::InvalidInput {
                field: "index",
                reason: "torrent index out of range",
            });
        };
        let torrent_id = torrent.id;
        let renamed_root = match file_path.rsplit_once('/') {
            Some((parent, _)) => format!("{parent}/{new_name}"),
            None => new_name.to_string(),
        };
        let mut changed = Vec::new();
        if let Some(files) = self.files.get_mut(&torrent_id) {
            let nested = format!("{file_path}/");
            for (position, file) in files.iter_mut().enumerate() {
                if file.path == file_path || file.path.starts_with(&nested) {
                    file.path = format!("{renamed_root}{}", &file.path[file_path.len()..]);
                    changed.push(position);
                }
            }
        }
        if changed.is_empty() {
            return Err(SessionError::InvalidInput {
                field: "file_path",
                reason: "no file or directory with this path",
            });
        }
        if torrent.name == file_path {
            torrent.name = new_name.to_string();
            self.dirty.insert(torrent_id);
        }
        self.sync_torrents(false);
        self.pending.push(EngineEvent::TorrentFileRenamed {
            torrent_id,
            file_path: file_path.to_string(),
            new_name: new_name.to_string(),
        });
        self.push_file_update(torrent_id, changed);
        Ok(())
    }

    async fn get_download_dir_free_space(&mut self) -> SessionResult<()> {
        self.ensure_connected("get_download_dir_free_space")?;
        self.pending.push(EngineEvent::DownloadDirFreeSpace {
            bytes: self.free_space,
        });
        Ok(())
    }

    async fn get_free_space_for_path(&mut self, path: &str) -> SessionResult<()> {
        self.ensure_connected("get_free_space_for_path")?;
        let success = path.starts_with('/');
        self.pending.push(EngineEvent::FreeSpaceForPath {
            path: path.to_string(),
            success,
            bytes: if success { self.free_space } else { 0 },
        });
        Ok(())
    }

    async fn poll_events(&mut self) -> SessionResult<Vec<EngineEvent>> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn settings(&self) -> &ServerSettingsSnapshot {
        &self.settings
    }

    fn torrents(&self) -> &[TorrentSnapshot] {
        if self.is_connected() {
            &self.torrents
        } else {
            &[]
        }
    }

    fn torrent_index(&self, id: TorrentId) -> Option<usize> {
        if self.is_connected() {
            self.index.get(&id).copied()
        } else {
            None
        }
    }

    fn torrent_files(&self, id: TorrentId) -> Option<&[FileSnapshot]> {
        self.torrent_index(id)?;
        self.files.get(&id).map(Vec::as_slice)
    }

    fn torrent_peers(&self, id: TorrentId) -> Option<&[PeerSnapshot]> {
        self.torrent_index(id)?;
        Some(self.peers.get(&id).map_or(&[][..], Vec::as_slice))
    }

    fn server_stats(&self) -> ServerStats {
        self.stats
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn error(&self) -> RpcError {
        self.error
    }
}

fn default_peer_pool() -> Vec<PeerSnapshot> {
    vec![
        PeerSnapshot {
            address: "192.0.2.10:51413".to_string(),
            client: "Transmission 4.0.5".to_string(),
            progress: 1.0,
            flags: "TE".to_string(),
            ..PeerSnapshot::default()
        },
        PeerSnapshot {
            address: "198.51.100.7:6881".to_string(),
            client: "qBittorrent 4.6.2".to_string(),
            progress: 0.5,
            flags: "DI".to_string(),
            ..PeerSnapshot::default()
        },
    ]
}

/// Move up to `budget` bytes into wanted files in order; returns touched positions.
fn advance_files(files: &mut [FileSnapshot], mut budget: i64) -> Vec<usize> {
    let mut changed = Vec::new();
    for (position, file) in files.iter_mut().enumerate() {
        if budget == 0 {
            break;
        }
        if !file.wanted {
            continue;
        }
        let take = (file.size - file.completed_size).min(budget);
        if take > 0 {
            file.completed_size += take;
            budget -= take;
            changed.push(position);
        }
    }
    changed
}

#[allow(clippy::cast_precision_loss)]
fn recompute_sizes(torrent: &mut TorrentSnapshot, files: &[FileSnapshot]) {
    torrent.total_size = files.iter().map(|file| file.size).sum();
    torrent.size_when_done = files
        .iter()
        .filter(|file| file.wanted)
        .map(|file| file.size)
        .sum();
    torrent.left_until_done = files
        .iter()
        .filter(|file| file.wanted)
        .map(|file| file.size - file.completed_size)
        .sum();
    torrent.percent_done = if torrent.size_when_done == 0 {
        1.0
    } else {
        1.0 - torrent.left_until_done as f64 / torrent.size_when_done as f64
    };
}

#[allow(clippy::cast_precision_loss)]
fn ratio(uploaded: i64, downloaded: i64) -> f64 {
    if downloaded == 0 {
        0.0
    } else {
        uploaded as f64 / downloaded as f64
    }
}

fn seed_limit_reached(torrent: &TorrentSnapshot, settings: &ServerSettingsSnapshot) -> bool {
    match torrent.ratio_limit_mode {
        LimitMode::Single => torrent.ratio >= torrent.ratio_limit,
        LimitMode::Global => settings.ratio_limited && torrent.ratio >= settings.ratio_limit,
        LimitMode::Unlimited => false,
    }
}

/// Registrable part of a tracker host: `tracker.example.org` becomes
/// `example.org`, IP literals are kept whole.
fn site_of(announce: &str) -> String {
    let Ok(url) = Url::parse(announce.trim()) else {
        return String::new();
    };
    match url.host() {
        Some(Host::Domain(domain)) => {
            let labels: Vec<&str> = domain.split('.').collect();
            if labels.len() > 2 {
                labels[labels.len() - 2..].join(".")
            } else {
                domain.to_string()
            }
        }
        Some(host) => host.to_string(),
        None => String::new(),
    }
}

/// Stand-in info hash: 160 bits of FNV-1a over the input, rendered as hex.
fn content_hash(bytes: &[u8]) -> String {
    const PRIME: u64 = 0x0100_0000_01b3;
    let mut lanes = [
        0xcbf2_9ce4_8422_2325_u64,
        0x8422_2325_cbf2_9ce4,
        0x9ce4_8422_2325_cbf2,
    ];
    for lane in &mut lanes {
        for byte in bytes {
            *lane ^= u64::from(*byte);
            *lane = lane.wrapping_mul(PRIME);
        }
    }
    format!(
        "{:016x}{:016x}{:08x}",
        lanes[0],
        lanes[1],
        lanes[2] & 0xffff_ffff
    )
}

struct ParsedLink {
    hash_string: String,
    name: String,
    trackers: Vec<String>,
}

impl ParsedLink {
    fn parse(link: &str) -> Option<Self> {
        let link = link.trim();
        if link.len() == 40 && link.chars().all(|c| c.is_ascii_hexdigit()) {
            let hash_string = link.to_ascii_lowercase();
            return Some(Self {
                name: hash_string.clone(),
                hash_string,
                trackers: Vec::new(),
            });
        }
        let url = Url::parse(link).ok()?;
        match url.scheme() {
            "magnet" => Self::from_magnet(&url),
            "http" | "https" => {
                let name = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map_or_else(
                        || url.host_str().unwrap_or(link).to_string(),
                        |segment| segment.trim_end_matches(".torrent").to_string(),
                    );
                Some(Self {
                    hash_string: content_hash(url.as_str().as_bytes()),
                    name,
                    trackers: Vec::new(),
                })
            }
            _ => None,
        }
    }

    fn from_magnet(url: &Url) -> Option<Self> {
        let mut hash_string = None;
        let mut name = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    hash_string = value
                        .strip_prefix("urn:btih:")
                        .map(str::to_ascii_lowercase);
                }
                "dn" => name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }
        let hash_string = hash_string.filter(|hash| !hash.is_empty())?;
        let name = name.unwrap_or_else(|| hash_string.clone());
        Some(Self {
            hash_string,
            name,
            trackers,
        })
    }
}

struct Metainfo {
    hash_string: String,
    name: String,
    length: Option<i64>,
    trackers: Vec<String>,
}

impl Metainfo {
    /// Pull the few fields the engine needs out of bencoded metainfo.
    ///
    /// A key that is present but carries a malformed value rejects the whole
    /// document.
    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.first() != Some(&b'd') || bytes.last() != Some(&b'e') {
            return None;
        }
        let hash_string = content_hash(bytes);
        let name = if find(bytes, b"4:name").is_some() {
            bencoded_string_after(bytes, b"4:name")?
        } else {
            hash_string[..8].to_string()
        };
        let length = if find(bytes, b"6:length").is_some() {
            Some(bencoded_int_after(bytes, b"6:length")?)
        } else {
            None
        };
        let trackers = if find(bytes, b"8:announce").is_some() {
            vec![bencoded_string_after(bytes, b"8:announce")?]
        } else {
            Vec::new()
        };
        Some(Self {
            hash_string,
            name,
            length,
            trackers,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| start + needle.len())
}

fn bencoded_string_after(bytes: &[u8], key: &[u8]) -> Option<String> {
    let start = find(bytes, key)?;
    let rest = bytes.get(start..)?;
    let colon = rest.iter().position(|&byte| byte == b':')?;
    let len: usize = std::str::from_utf8(rest.get(..colon)?).ok()?.parse().ok()?;
    let value_start = colon.checked_add(1)?;
    let value = rest.get(value_start..value_start.checked_add(len)?)?;
    Some(String::from_utf8_lossy(value).into_owned())
}

fn bencoded_int_after(bytes: &[u8], key: &[u8]) -> Option<i64> {
    let start = find(bytes, key)?;
    let rest = bytes.get(start..)?.strip_prefix(b"i")?;
    let end = rest.iter().position(|&byte| byte == b'e')?;
    std::str::from_utf8(rest.get(..end)?).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            name: "loopback".to_string(),
            address: "localhost".to_string(),
            port: 9091,
            api_path: "/transmission/rpc".to_string(),
            https: false,
            self_signed_certificate: None,
            client_certificate: None,
            credentials: None,
            update_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        }
    }

    async fn connected() -> SessionResult<MemoryEngine> {
        let mut engine = MemoryEngine::new();
        engine.set_server(server()).await?;
        engine.connect().await?;
        engine.poll_events().await?;
        Ok(engine)
    }

    fn magnet(hash: &str, name: &str) -> AddTorrentLink {
        AddTorrentLink {
            link: format!("magnet:?xt=urn:btih:{hash}&dn={name}&tr=udp%3A%2F%2Ftracker.example.org%3A80"),
            start: true,
            ..AddTorrentLink::default()
        }
    }

    #[tokio::test]
    async fn add_reports_exactly_one_outcome() -> SessionResult<()> {
        let mut engine = connected().await?;
        let hash = "c9e15763f722f23e98a29decdfae341b98d53056";
        engine.add_torrent_link(magnet(hash, "Demo+Set")).await?;
        engine.add_torrent_link(magnet(hash, "Demo+Set")).await?;
        engine
            .add_torrent_link(AddTorrentLink {
                link: "ftp://nope".to_string(),
                ..AddTorrentLink::default()
            })
            .await?;

        let events = engine.poll_events().await?;
        let outcomes: Vec<&EngineEvent> = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    EngineEvent::TorrentAdded { .. }
                        | EngineEvent::TorrentAddDuplicate
                        | EngineEvent::TorrentAddError
                )
            })
            .collect();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            outcomes[0],
            EngineEvent::TorrentAdded { name, .. } if name == "Demo Set"
        ));
        assert_eq!(outcomes[1], &EngineEvent::TorrentAddDuplicate);
        assert_eq!(outcomes[2], &EngineEvent::TorrentAddError);

        let torrent = &engine.torrents()[0];
        assert_eq!(torrent.status, TorrentStatus::Downloading);
        assert_eq!(torrent.trackers[0].site, "example.org");
        assert_eq!(torrent.trackers[0].announce, "udp://tracker.example.org:80");
        Ok(())
    }

    #[tokio::test]
    async fn removal_reports_previous_indices() -> SessionResult<()> {
        let mut engine = connected().await?;
        for (hash, name) in [("a", "one"), ("b", "two"), ("c", "three")] {
            engine
                .add_torrent_link(magnet(&hash.repeat(40), name))
                .await?;
        }
        engine.poll_events().await?;

        let second = engine.torrents()[1].id;
        engine.remove_torrents(&[second], false).await?;
        let events = engine.poll_events().await?;
        assert_eq!(
            events,
            vec![EngineEvent::TorrentsUpdated(RangeNotification {
                removed: vec![IndexRange::new(1, 2)],
                changed: Vec::new(),
                added_count: 0,
            })]
        );
        assert_eq!(engine.torrent_index(second), None);
        assert_eq!(engine.torrents().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn downloads_finish_after_enough_cycles() -> SessionResult<()> {
        let mut engine = connected().await?;
        engine
            .add_torrent_link(magnet(&"d".repeat(40), "finisher"))
            .await?;
        engine.poll_events().await?;

        let mut finished = 0;
        for _ in 0..DOWNLOAD_STEPS {
            engine.update_data().await?;
            finished += engine
                .poll_events()
                .await?
                .iter()
                .filter(|event| matches!(event, EngineEvent::TorrentFinished { .. }))
                .count();
        }
        assert_eq!(finished, 1);
        let torrent = &engine.torrents()[0];
        assert_eq!(torrent.status, TorrentStatus::Seeding);
        assert_eq!(torrent.left_until_done, 0);
        assert!(torrent.done_date.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn disconnect_hides_torrents_and_reconnect_restores_them() -> SessionResult<()> {
        let mut engine = connected().await?;
        engine
            .add_torrent_link(magnet(&"e".repeat(40), "persistent"))
            .await?;
        engine.poll_events().await?;

        engine.disconnect().await?;
        let events = engine.poll_events().await?;
        assert_eq!(events[0], EngineEvent::AboutToDisconnect);
        assert!(engine.torrents().is_empty());

        engine.connect().await?;
        let events = engine.poll_events().await?;
        assert!(events.contains(&EngineEvent::TorrentsUpdated(RangeNotification {
            removed: Vec::new(),
            changed: Vec::new(),
            added_count: 1,
        })));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_reports_error() -> SessionResult<()> {
        let mut engine = MemoryEngine::new();
        engine
            .set_server(Server {
                address: "daemon.invalid".to_string(),
                ..server()
            })
            .await?;
        engine.connect().await?;
        let events = engine.poll_events().await?;
        assert!(events.iter().any(|event| matches!(
            event,
            EngineEvent::ErrorChanged {
                error: RpcError::ConnectionError,
                ..
            }
        )));
        assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
        Ok(())
    }

    #[tokio::test]
    async fn queue_moves_reorder_positions() -> SessionResult<()> {
        let mut engine = connected().await?;
        for hash in ["1", "2", "3"] {
            engine
                .add_torrent_link(magnet(&hash.repeat(40), hash))
                .await?;
        }
        let last = engine.torrents()[2].id;
        engine.move_torrents(&[last], QueueMove::Top).await?;
        let positions: Vec<i32> = engine
            .torrents()
            .iter()
            .map(|torrent| torrent.queue_position)
            .collect();
        assert_eq!(positions, vec![1, 2, 0]);

        engine.move_torrents(&[last], QueueMove::Down).await?;
        assert_eq!(engine.torrents()[2].queue_position, 1);
        Ok(())
    }

    #[test]
    fn metainfo_fields_are_extracted() {
        let bytes = b"d8:announce28:udp://tracker.example.net:804:infod6:lengthi1024e4:name8:demo.isoee";
        let metainfo = Metainfo::parse(bytes).expect("metainfo");
        assert_eq!(metainfo.name, "demo.iso");
        assert_eq!(metainfo.length, Some(1024));
        assert_eq!(metainfo.trackers, vec!["udp://tracker.example.net:80"]);
        assert_eq!(metainfo.hash_string.len(), 40);
        assert!(Metainfo::parse(b"not bencode").is_none());
    }

    #[test]
    fn magnet_links_decode_query_values() {
        let link = ParsedLink::parse(
            "magnet:?xt=urn:btih:C9E15763F722F23E98A29DECDFAE341B98D53056\
             &dn=Cosmos%20Laundromat+4K&tr=udp%3A%2F%2Ftracker.example.org%3A80&tr=bad%zz",
        )
        .expect("magnet");
        assert_eq!(link.hash_string, "c9e15763f722f23e98a29decdfae341b98d53056");
        assert_eq!(link.name, "Cosmos Laundromat 4K");
        assert_eq!(link.trackers[0], "udp://tracker.example.org:80");
        assert_eq!(link.trackers.len(), 2);

        let web = ParsedLink::parse("https://example.org/files/demo.torrent").expect("url");
        assert_eq!(web.name, "demo");
        assert!(ParsedLink::parse("magnet:?dn=nameless").is_none());
        assert!(ParsedLink::parse("gopher://example.org/demo").is_none());
    }

    #[test]
    fn tracker_sites_come_from_the_host() {
        assert_eq!(site_of("udp://tracker.example.org:6969/announce"), "example.org");
        assert_eq!(site_of("https://user:pw@tracker.example.net/announce"), "example.net");
        assert_eq!(site_of("http://[2001:db8::1]:6969/announce"), "[2001:db8::1]");
        assert_eq!(site_of("http://192.0.2.7/announce"), "192.0.2.7");
        assert_eq!(site_of("not a url"), "");
    }

    #[test]
    fn oversized_string_lengths_are_rejected() {
        assert!(Metainfo::parse(b"d4:name18446744073709551615:xe").is_none());
        assert!(Metainfo::parse(b"d6:lengthi99999999999999999999ee").is_none());
        let unnamed = Metainfo::parse(b"d6:lengthi10ee").expect("metainfo");
        assert_eq!(unnamed.name, unnamed.hash_string[..8]);
    }

    #[tokio::test]
    async fn editing_a_tracker_moves_its_site() -> SessionResult<()> {
        let mut engine = connected().await?;
        engine
            .add_torrent_link(magnet("c9e15763f722f23e98a29decdfae341b98d53056", "demo"))
            .await?;
        let tracker_id = engine.torrents()[0].trackers[0].id;

        engine
            .apply_torrent_change(
                0,
                &TorrentChange::SetTracker {
                    tracker_id,
                    announce: "https://announce.example.net/announce".to_string(),
                },
            )
            .await?;

        let tracker = &engine.torrents()[0].trackers[0];
        assert_eq!(tracker.announce, "https://announce.example.net/announce");
        assert_eq!(tracker.site, "example.net");
        Ok(())
    }
}
