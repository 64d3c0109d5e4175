//! Observer that records every callback as an [`Event`].

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use trellis_bridge::ObserverSink;
use trellis_core::{
    CollectionDelta, ConnectionState, DeltaError, FileSnapshot, PeerSnapshot, RpcError,
    ServerSettingsSnapshot, ServerStats, TorrentId, TorrentSnapshot,
};
use trellis_events::Event;

/// Collects notifications in delivery order and lets tests block until a
/// condition over them holds.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
    changed: Condvar,
}

impl RecordingObserver {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: Event) {
        self.lock().push(event);
        self.changed.notify_all();
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Block until `predicate` holds over the recorded events or `timeout`
    /// elapses. Returns the events seen at that point when it held.
    pub fn wait_for<P>(&self, timeout: Duration, predicate: P) -> Option<Vec<Event>>
    where
        P: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.lock();
        loop {
            if predicate(&events) {
                return Some(events.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            events = self
                .changed
                .wait_timeout(events, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until at least `count` events match `matcher`.
    pub fn wait_for_count<M>(&self, timeout: Duration, count: usize, matcher: M) -> bool
    where
        M: Fn(&Event) -> bool,
    {
        self.wait_for(timeout, |events| {
            events.iter().filter(|event| matcher(event)).count() >= count
        })
        .is_some()
    }
}

impl ObserverSink for RecordingObserver {
    fn on_about_to_disconnect(&self) {
        self.record(Event::AboutToDisconnect);
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        self.record(Event::ConnectionStateChanged { state });
    }

    fn on_error_changed(&self, error: RpcError, message: &str, detailed_message: &str) {
        self.record(Event::ErrorChanged {
            error,
            message: message.to_string(),
            detailed_message: detailed_message.to_string(),
        });
    }

    fn on_server_settings_changed(&self, settings: &ServerSettingsSnapshot) {
        self.record(Event::ServerSettingsChanged {
            settings: settings.clone(),
        });
    }

    fn on_torrents_updated(&self, delta: &CollectionDelta<TorrentSnapshot>) {
        self.record(Event::TorrentsUpdated {
            delta: delta.clone(),
        });
    }

    fn on_torrent_files_updated(&self, torrent_id: TorrentId, delta: &CollectionDelta<FileSnapshot>) {
        self.record(Event::TorrentFilesUpdated {
            torrent_id,
            delta: delta.clone(),
        });
    }

    fn on_torrent_peers_updated(&self, torrent_id: TorrentId, delta: &CollectionDelta<PeerSnapshot>) {
        self.record(Event::TorrentPeersUpdated {
            torrent_id,
            delta: delta.clone(),
        });
    }

    fn on_server_stats_updated(&self, stats: &ServerStats) {
        self.record(Event::ServerStatsUpdated { stats: *stats });
    }

    fn on_torrent_added(&self, torrent_id: TorrentId, hash_string: &str, name: &str) {
        self.record(Event::TorrentAdded {
            torrent_id,
            hash_string: hash_string.to_string(),
            name: name.to_string(),
        });
    }

    fn on_torrent_finished(&self, torrent_id: TorrentId, hash_string: &str, name: &str) {
        self.record(Event::TorrentFinished {
            torrent_id,
            hash_string: hash_string.to_string(),
            name: name.to_string(),
        });
    }

    fn on_torrent_add_duplicate(&self) {
        self.record(Event::TorrentAddDuplicate);
    }

    fn on_torrent_add_error(&self) {
        self.record(Event::TorrentAddError);
    }

    fn on_torrent_file_renamed(&self, torrent_id: TorrentId, file_path: &str, new_name: &str) {
        self.record(Event::TorrentFileRenamed {
            torrent_id,
            file_path: file_path.to_string(),
            new_name: new_name.to_string(),
        });
    }

    fn on_download_dir_free_space(&self, bytes: i64) {
        self.record(Event::DownloadDirFreeSpace { bytes });
    }

    fn on_free_space_for_path(&self, path: &str, success: bool, bytes: i64) {
        self.record(Event::FreeSpaceForPath {
            path: path.to_string(),
            success,
            bytes,
        });
    }
}

/// Rebuild the torrent list by applying every recorded torrent delta in order.
///
/// # Errors
///
/// Returns the first [`DeltaError`] raised while applying a delta.
pub fn replay_torrents(events: &[Event]) -> Result<Vec<TorrentSnapshot>, DeltaError> {
    let mut torrents = Vec::new();
    for event in events {
        if let Event::TorrentsUpdated { delta } = event {
            delta.clone().apply(&mut torrents)?;
        }
    }
    Ok(torrents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_for_wakes_on_record() {
        let recorder = Arc::new(RecordingObserver::new());
        let producer = {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                recorder.on_torrent_add_error();
            })
        };
        let seen = recorder.wait_for(Duration::from_secs(2), |events| !events.is_empty());
        assert_eq!(seen, Some(vec![Event::TorrentAddError]));
        producer.join().expect("producer panicked");
    }

    #[test]
    fn wait_for_gives_up_after_timeout() {
        let recorder = RecordingObserver::new();
        assert!(
            recorder
                .wait_for(Duration::from_millis(10), |events| !events.is_empty())
                .is_none()
        );
    }
}
