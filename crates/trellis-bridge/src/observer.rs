//! Observer boundary: callbacks invoked on the worker for every notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use trellis_core::{
    CollectionDelta, ConnectionState, FileSnapshot, PeerSnapshot, RpcError,
    ServerSettingsSnapshot, ServerStats, TorrentId, TorrentSnapshot,
};
use trellis_events::Event;

/// Receiver of session notifications.
///
/// Every method runs on the worker thread and defaults to a no-op, so
/// implementors only override what they consume. Implementations must not
/// block for long; the worker does nothing else while a callback runs.
#[allow(unused_variables)]
pub trait ObserverSink: Send + Sync {
    /// The connection is about to drop.
    fn on_about_to_disconnect(&self) {}
    /// Connectivity changed.
    fn on_connection_state_changed(&self, state: ConnectionState) {}
    /// Connection error state changed.
    fn on_error_changed(&self, error: RpcError, message: &str, detailed_message: &str) {}
    /// Authoritative settings arrived; the settings shadow already holds them.
    fn on_server_settings_changed(&self, settings: &ServerSettingsSnapshot) {}
    /// The torrent list changed.
    fn on_torrents_updated(&self, delta: &CollectionDelta<TorrentSnapshot>) {}
    /// A torrent's file list changed.
    fn on_torrent_files_updated(
        &self,
        torrent_id: TorrentId,
        delta: &CollectionDelta<FileSnapshot>,
    ) {
    }
    /// A torrent's peer list changed.
    fn on_torrent_peers_updated(
        &self,
        torrent_id: TorrentId,
        delta: &CollectionDelta<PeerSnapshot>,
    ) {
    }
    /// Transfer statistics were refreshed.
    fn on_server_stats_updated(&self, stats: &ServerStats) {}
    /// A torrent was admitted.
    fn on_torrent_added(&self, torrent_id: TorrentId, hash_string: &str, name: &str) {}
    /// A torrent finished downloading.
    fn on_torrent_finished(&self, torrent_id: TorrentId, hash_string: &str, name: &str) {}
    /// An add request matched an existing torrent.
    fn on_torrent_add_duplicate(&self) {}
    /// An add request failed.
    fn on_torrent_add_error(&self) {}
    /// A file inside a torrent was renamed.
    fn on_torrent_file_renamed(&self, torrent_id: TorrentId, file_path: &str, new_name: &str) {}
    /// Free space of the default download directory.
    fn on_download_dir_free_space(&self, bytes: i64) {}
    /// Result of a free-space query for a path.
    fn on_free_space_for_path(&self, path: &str, success: bool, bytes: i64) {}
}

/// Route one event to the matching observer callback.
pub fn dispatch(observer: &dyn ObserverSink, event: &Event) {
    match event {
        Event::AboutToDisconnect => observer.on_about_to_disconnect(),
        Event::ConnectionStateChanged { state } => observer.on_connection_state_changed(*state),
        Event::ErrorChanged {
            error,
            message,
            detailed_message,
        } => observer.on_error_changed(*error, message, detailed_message),
        Event::ServerSettingsChanged { settings } => observer.on_server_settings_changed(settings),
        Event::TorrentsUpdated { delta } => observer.on_torrents_updated(delta),
        Event::TorrentFilesUpdated { torrent_id, delta } => {
            observer.on_torrent_files_updated(*torrent_id, delta);
        }
        Event::TorrentPeersUpdated { torrent_id, delta } => {
            observer.on_torrent_peers_updated(*torrent_id, delta);
        }
        Event::ServerStatsUpdated { stats } => observer.on_server_stats_updated(stats),
        Event::TorrentAdded {
            torrent_id,
            hash_string,
            name,
        } => observer.on_torrent_added(*torrent_id, hash_string, name),
        Event::TorrentFinished {
            torrent_id,
            hash_string,
            name,
        } => observer.on_torrent_finished(*torrent_id, hash_string, name),
        Event::TorrentAddDuplicate => observer.on_torrent_add_duplicate(),
        Event::TorrentAddError => observer.on_torrent_add_error(),
        Event::TorrentFileRenamed {
            torrent_id,
            file_path,
            new_name,
        } => observer.on_torrent_file_renamed(*torrent_id, file_path, new_name),
        Event::DownloadDirFreeSpace { bytes } => observer.on_download_dir_free_space(*bytes),
        Event::FreeSpaceForPath {
            path,
            success,
            bytes,
        } => observer.on_free_space_for_path(path, *success, *bytes),
    }
}

/// Registered observers, shared between callers and the worker.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Arc<Mutex<Vec<Arc<dyn ObserverSink>>>>,
}

fn same_observer(left: &Arc<dyn ObserverSink>, right: &Arc<dyn ObserverSink>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(left).cast::<()>(),
        Arc::as_ptr(right).cast::<()>(),
    )
}

impl ObserverSet {
    fn observers(&self) -> MutexGuard<'_, Vec<Arc<dyn ObserverSink>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer; registering the same instance again is a no-op.
    ///
    /// Returns whether the observer was newly added.
    pub fn subscribe(&self, observer: Arc<dyn ObserverSink>) -> bool {
        let mut observers = self.observers();
        if observers
            .iter()
            .any(|existing| same_observer(existing, &observer))
        {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, observer: &Arc<dyn ObserverSink>) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|existing| !same_observer(existing, observer));
        observers.len() != before
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers().len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers().is_empty()
    }

    /// Deliver an event to every registered observer in registration order.
    pub fn notify(&self, event: &Event) {
        let observers = self.observers().clone();
        for observer in &observers {
            dispatch(observer.as_ref(), event);
        }
    }
}
