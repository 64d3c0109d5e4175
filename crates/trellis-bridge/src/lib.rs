#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Cross-thread bridge between caller threads and a single session worker.
//!
//! [`SessionBridge::start`] spawns a dedicated worker thread that owns a
//! [`SessionEngine`] by value. Callers submit fire-and-forget [`Command`]s from
//! any thread; the worker executes them in order, turns the engine's range
//! notifications into [`CollectionDelta`](trellis_core::CollectionDelta)s and
//! delivers them to registered [`ObserverSink`]s and to the [`EventBus`].
//!
//! Layout: `command.rs` (typed commands), `queue.rs` (multi-producer queue),
//! `startup.rs` (readiness handshake), `worker.rs` (run loop and dispatch),
//! `publisher.rs` (delta building), `observer.rs` (callback boundary),
//! `shadow.rs` (optimistic settings copy), `memory.rs` (in-memory engine).

pub mod command;
pub mod error;
pub mod memory;
pub mod observer;
pub mod publisher;
pub mod queue;
pub mod shadow;
pub mod startup;
mod worker;

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, warn};
use trellis_config::BridgeConfig;
use trellis_core::{
    AddTorrentFile, AddTorrentLink, QueueMove, Server, ServerSettingsSnapshot, SessionEngine,
    SettingsChange, TorrentChange, TorrentId, TorrentSnapshot,
};
use trellis_events::{EventBus, EventId, EventStream};
use trellis_telemetry::{DropReason, Metrics};

pub use command::Command;
pub use error::{BridgeError, BridgeResult};
pub use memory::MemoryEngine;
pub use observer::{ObserverSet, ObserverSink, dispatch};
pub use publisher::DiffPublisher;
pub use queue::CommandQueue;
pub use shadow::SettingsShadow;
pub use startup::{STARTUP_TIMEOUT, StartupGate};

use worker::WorkerContext;

/// Handle owned by callers; every method may be called from any thread.
///
/// Mutators only enqueue work and return immediately. Their outcome arrives
/// later as observer callbacks and bus events.
pub struct SessionBridge {
    queue: CommandQueue,
    shadow: SettingsShadow,
    observers: ObserverSet,
    events: EventBus,
    metrics: Metrics,
    thread_name: String,
    worker: Option<JoinHandle<()>>,
}

impl SessionBridge {
    /// Spawn the worker, wait for it to become ready and return the handle.
    ///
    /// The engine is constructed by `factory` on the worker thread. If the
    /// worker does not signal readiness within the configured startup timeout
    /// the process is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid, metrics cannot be
    /// registered or the worker thread cannot be spawned.
    pub fn start<E, F>(config: &BridgeConfig, factory: F) -> BridgeResult<Self>
    where
        E: SessionEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        trellis_config::validate(config).map_err(|source| BridgeError::Config { source })?;
        let metrics = Metrics::new().map_err(|source| BridgeError::Telemetry { source })?;
        let (queue, commands) = CommandQueue::channel(metrics.clone());
        let shadow = SettingsShadow::default();
        let observers = ObserverSet::default();
        let events = EventBus::with_capacity(config.event_bus_capacity);
        let publisher = DiffPublisher::new(
            observers.clone(),
            events.clone(),
            shadow.clone(),
            metrics.clone(),
        );
        let gate = StartupGate::new();

        let worker = worker::spawn(
            &config.thread_name,
            factory,
            WorkerContext {
                commands,
                publisher,
                metrics: metrics.clone(),
                gate: gate.clone(),
                poll_interval: config.poll_interval(),
            },
        )?;

        match gate.wait(config.startup_timeout()) {
            Ok(elapsed) => {
                metrics.observe_worker_startup(elapsed);
                info!(
                    thread = %config.thread_name,
                    startup_ms = elapsed.as_millis(),
                    "session worker ready"
                );
            }
            Err(err) => {
                error!(
                    thread = %config.thread_name,
                    error = %err,
                    timeout_ms = config.startup_timeout_ms,
                    "session worker did not start; aborting"
                );
                std::process::abort();
            }
        }

        let bridge = Self {
            queue,
            shadow,
            observers,
            events,
            metrics,
            thread_name: config.thread_name.clone(),
            worker: Some(worker),
        };
        if let Some(profile) = config.server.clone() {
            bridge.set_server(profile.into());
        }
        Ok(bridge)
    }

    /// Enqueue a raw command. Returns `false` when the worker has stopped.
    pub fn submit(&self, command: Command) -> bool {
        self.queue.submit(command)
    }

    /// Clone of the command queue, for producers that only submit.
    #[must_use]
    pub fn queue(&self) -> CommandQueue {
        self.queue.clone()
    }

    /// Install a connection profile.
    pub fn set_server(&self, server: Server) {
        self.submit(Command::SetServer(Box::new(server)));
    }

    /// Forget the connection profile.
    pub fn reset_server(&self) {
        self.submit(Command::ResetServer);
    }

    /// Connect to the configured server.
    pub fn connect(&self) {
        self.submit(Command::Connect);
    }

    /// Drop the connection.
    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    /// Pause or resume periodic updates.
    pub fn set_update_disabled(&self, disabled: bool) {
        self.submit(Command::SetUpdateDisabled(disabled));
    }

    /// Request an immediate refresh.
    pub fn update_data(&self) {
        self.submit(Command::UpdateData);
    }

    /// Settings as currently seen by callers, including optimistic changes.
    #[must_use]
    pub fn server_settings(&self) -> ServerSettingsSnapshot {
        self.shadow.snapshot()
    }

    /// Change one session setting.
    ///
    /// The shadow reflects the change before this returns.
    pub fn set_server_setting(&self, change: SettingsChange) {
        self.shadow.apply(&change);
        self.submit(Command::Settings(change));
    }

    /// Bring the session settings in line with `settings`, one change per
    /// field that differs from the shadow.
    pub fn set_server_settings(&self, settings: &ServerSettingsSnapshot) {
        let current = self.shadow.snapshot();
        for change in SettingsChange::diff(&current, settings) {
            self.set_server_setting(change);
        }
    }

    /// Read a `.torrent` file on the calling thread and submit it.
    ///
    /// Unreadable input is logged and the add is abandoned; no notification
    /// follows in that case.
    pub fn add_torrent_file(&self, path: impl AsRef<Path>, request: AddTorrentFile) {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(metainfo) => {
                self.submit(Command::AddTorrentFile(Box::new(AddTorrentFile {
                    metainfo,
                    ..request
                })));
            }
            Err(source) => {
                let err = BridgeError::ReadInput {
                    path: path.to_path_buf(),
                    source,
                };
                warn!(
                    path = %path.display(),
                    error = %err,
                    cause = ?std::error::Error::source(&err),
                    "torrent file unreadable; add abandoned"
                );
                self.metrics.inc_dropped(DropReason::UnreadableInput);
            }
        }
    }

    /// Submit an add request whose metainfo is already in memory.
    pub fn add_torrent_metainfo(&self, request: AddTorrentFile) {
        self.submit(Command::AddTorrentFile(Box::new(request)));
    }

    /// Add a torrent from a magnet link, URL or info hash.
    pub fn add_torrent_link(&self, request: AddTorrentLink) {
        self.submit(Command::AddTorrentLink(Box::new(request)));
    }

    /// Start torrents, honouring the download queue.
    pub fn start_torrents(&self, ids: Vec<TorrentId>) {
        self.submit(Command::StartTorrents(ids));
    }

    /// Start torrents immediately, bypassing the queue.
    pub fn start_torrents_now(&self, ids: Vec<TorrentId>) {
        self.submit(Command::StartTorrentsNow(ids));
    }

    /// Pause torrents.
    pub fn pause_torrents(&self, ids: Vec<TorrentId>) {
        self.submit(Command::PauseTorrents(ids));
    }

    /// Remove torrents, optionally deleting downloaded data.
    pub fn remove_torrents(&self, ids: Vec<TorrentId>, delete_files: bool) {
        self.submit(Command::RemoveTorrents { ids, delete_files });
    }

    /// Verify local data of torrents.
    pub fn check_torrents(&self, ids: Vec<TorrentId>) {
        self.submit(Command::CheckTorrents(ids));
    }

    /// Reannounce torrents to their trackers.
    pub fn reannounce_torrents(&self, ids: Vec<TorrentId>) {
        self.submit(Command::ReannounceTorrents(ids));
    }

    /// Move torrents within the queue.
    pub fn move_torrents(&self, ids: Vec<TorrentId>, movement: QueueMove) {
        self.submit(Command::MoveTorrents { ids, movement });
    }

    /// Change the download directory of torrents.
    pub fn set_torrents_location(
        &self,
        ids: Vec<TorrentId>,
        location: impl Into<String>,
        move_files: bool,
    ) {
        self.submit(Command::SetTorrentsLocation {
            ids,
            location: location.into(),
            move_files,
        });
    }

    /// Apply `change` to the caller's copy of a torrent and submit it.
    ///
    /// The copy diverges from the session until the next torrent delta if the
    /// torrent is gone by the time the worker runs the command.
    pub fn set_torrent_property(&self, torrent: &mut TorrentSnapshot, change: TorrentChange) {
        change.apply_to(torrent);
        self.submit_torrent_change(torrent.id, change);
    }

    /// Submit a property change for a torrent without a local copy.
    pub fn submit_torrent_change(&self, id: TorrentId, change: TorrentChange) {
        self.submit(Command::Torrent { id, change });
    }

    /// Rename a file or directory inside a torrent.
    pub fn rename_torrent_file(
        &self,
        id: TorrentId,
        file_path: impl Into<String>,
        new_name: impl Into<String>,
    ) {
        self.submit(Command::RenameTorrentFile {
            id,
            file_path: file_path.into(),
            new_name: new_name.into(),
        });
    }

    /// Query free space of the default download directory.
    pub fn get_download_dir_free_space(&self) {
        self.submit(Command::GetDownloadDirFreeSpace);
    }

    /// Query free space of an arbitrary path.
    pub fn get_free_space_for_path(&self, path: impl Into<String>) {
        self.submit(Command::GetFreeSpaceForPath(path.into()));
    }

    /// Register an observer. Returns `false` if it was already registered.
    pub fn subscribe(&self, observer: Arc<dyn ObserverSink>) -> bool {
        self.observers.subscribe(observer)
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, observer: &Arc<dyn ObserverSink>) -> bool {
        self.observers.unsubscribe(observer)
    }

    /// Stream of bus events, replaying buffered events newer than `since`.
    #[must_use]
    pub fn events(&self, since: Option<EventId>) -> EventStream {
        self.events.subscribe(since)
    }

    /// Bridge metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Disconnect, flush pending notifications and join the worker.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::WorkerPanicked`] if the worker thread panicked.
    pub fn shutdown(mut self) -> BridgeResult<()> {
        self.submit(Command::Shutdown);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.join().map_err(|_| BridgeError::WorkerPanicked {
            thread_name: self.thread_name.clone(),
        })?;
        info!(thread = %self.thread_name, "session worker joined");
        Ok(())
    }
}
