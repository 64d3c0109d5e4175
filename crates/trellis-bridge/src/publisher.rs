//! Turns raw engine notifications into deltas and delivers them.

use tracing::{debug, warn};
use trellis_core::{CollectionDelta, EngineEvent, RangeNotification, SessionEngine, TorrentId};
use trellis_events::{Event, EventBus};
use trellis_telemetry::{DropReason, Metrics};

use crate::observer::ObserverSet;
use crate::shadow::SettingsShadow;

/// Converts engine notifications into [`Event`]s for observers and the bus.
///
/// Runs on the worker only; it reads the engine's live collections at the
/// moment a notification is processed.
#[derive(Clone)]
pub struct DiffPublisher {
    observers: ObserverSet,
    bus: EventBus,
    shadow: SettingsShadow,
    metrics: Metrics,
}

impl DiffPublisher {
    /// Build a publisher delivering to `observers` and `bus`.
    #[must_use]
    pub const fn new(
        observers: ObserverSet,
        bus: EventBus,
        shadow: SettingsShadow,
        metrics: Metrics,
    ) -> Self {
        Self {
            observers,
            bus,
            shadow,
            metrics,
        }
    }

    /// Translate and deliver a batch of notifications in order.
    pub fn publish_all<E>(&self, engine: &E, notifications: Vec<EngineEvent>)
    where
        E: SessionEngine + ?Sized,
    {
        for notification in notifications {
            if let Some(event) = self.translate(engine, notification) {
                self.deliver(event);
            }
        }
    }

    fn deliver(&self, event: Event) {
        self.metrics.inc_notification(event.kind());
        self.observers.notify(&event);
        self.bus.publish(event);
    }

    fn translate<E>(&self, engine: &E, notification: EngineEvent) -> Option<Event>
    where
        E: SessionEngine + ?Sized,
    {
        let event = match notification {
            EngineEvent::AboutToDisconnect => Event::AboutToDisconnect,
            EngineEvent::ConnectionStateChanged { state } => {
                Event::ConnectionStateChanged { state }
            }
            EngineEvent::ErrorChanged {
                error,
                message,
                detailed_message,
            } => Event::ErrorChanged {
                error,
                message,
                detailed_message,
            },
            EngineEvent::ServerSettingsChanged => {
                let settings = engine.settings().clone();
                self.shadow.replace(settings.clone());
                Event::ServerSettingsChanged { settings }
            }
            EngineEvent::TorrentsUpdated(update) => {
                let live = engine.torrents();
                self.metrics.set_torrents_tracked(live.len());
                let delta = self.slice("torrents", None, update, live)?;
                Event::TorrentsUpdated { delta }
            }
            EngineEvent::TorrentFilesUpdated { torrent_id, update } => {
                let Some(live) = engine.torrent_files(torrent_id) else {
                    self.drop_orphan("files", torrent_id);
                    return None;
                };
                let delta = self.slice("files", Some(torrent_id), update, live)?;
                if delta.is_empty() {
                    return None;
                }
                Event::TorrentFilesUpdated { torrent_id, delta }
            }
            EngineEvent::TorrentPeersUpdated { torrent_id, update } => {
                let Some(live) = engine.torrent_peers(torrent_id) else {
                    self.drop_orphan("peers", torrent_id);
                    return None;
                };
                let delta = self.slice("peers", Some(torrent_id), update, live)?;
                if delta.is_empty() {
                    return None;
                }
                Event::TorrentPeersUpdated { torrent_id, delta }
            }
            EngineEvent::ServerStatsUpdated => Event::ServerStatsUpdated {
                stats: engine.server_stats(),
            },
            EngineEvent::TorrentAdded {
                torrent_id,
                hash_string,
                name,
            } => Event::TorrentAdded {
                torrent_id,
                hash_string,
                name,
            },
            EngineEvent::TorrentFinished {
                torrent_id,
                hash_string,
                name,
            } => Event::TorrentFinished {
                torrent_id,
                hash_string,
                name,
            },
            EngineEvent::TorrentAddDuplicate => Event::TorrentAddDuplicate,
            EngineEvent::TorrentAddError => Event::TorrentAddError,
            EngineEvent::TorrentFileRenamed {
                torrent_id,
                file_path,
                new_name,
            } => Event::TorrentFileRenamed {
                torrent_id,
                file_path,
                new_name,
            },
            EngineEvent::DownloadDirFreeSpace { bytes } => Event::DownloadDirFreeSpace { bytes },
            EngineEvent::FreeSpaceForPath {
                path,
                success,
                bytes,
            } => Event::FreeSpaceForPath {
                path,
                success,
                bytes,
            },
        };
        Some(event)
    }

    fn slice<T: Clone>(
        &self,
        collection: &'static str,
        torrent_id: Option<TorrentId>,
        update: RangeNotification,
        live: &[T],
    ) -> Option<CollectionDelta<T>> {
        match CollectionDelta::slice(update.removed, update.changed, update.added_count, live) {
            Ok(delta) => Some(delta),
            Err(err) => {
                warn!(
                    collection,
                    torrent_id = ?torrent_id,
                    live_len = live.len(),
                    error = %err,
                    "inconsistent range notification; dropping"
                );
                self.metrics.inc_dropped(DropReason::InconsistentDelta);
                None
            }
        }
    }

    fn drop_orphan(&self, collection: &'static str, torrent_id: TorrentId) {
        debug!(
            collection,
            torrent_id = %torrent_id,
            "parent torrent no longer exists; dropping notification"
        );
        self.metrics.inc_dropped(DropReason::MissingParent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use trellis_core::{IndexRange, SettingsChange};

    fn publisher(metrics: &Metrics, bus: &EventBus, shadow: &SettingsShadow) -> DiffPublisher {
        DiffPublisher::new(
            ObserverSet::default(),
            bus.clone(),
            shadow.clone(),
            metrics.clone(),
        )
    }

    #[test]
    fn out_of_range_updates_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let bus = EventBus::with_capacity(8);
        let engine = MemoryEngine::new();

        publisher(&metrics, &bus, &SettingsShadow::default()).publish_all(
            &engine,
            vec![EngineEvent::TorrentsUpdated(RangeNotification {
                removed: Vec::new(),
                changed: vec![IndexRange::new(0, 1)],
                added_count: 0,
            })],
        );

        assert_eq!(metrics.dropped(DropReason::InconsistentDelta), 1);
        assert_eq!(metrics.notifications("torrents_updated"), 0);
        assert_eq!(bus.last_event_id(), None);
        Ok(())
    }

    #[test]
    fn file_updates_for_unknown_torrents_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let bus = EventBus::with_capacity(8);
        let engine = MemoryEngine::new();

        publisher(&metrics, &bus, &SettingsShadow::default()).publish_all(
            &engine,
            vec![EngineEvent::TorrentFilesUpdated {
                torrent_id: TorrentId(9),
                update: RangeNotification::changed_indices([0]),
            }],
        );

        assert_eq!(metrics.dropped(DropReason::MissingParent), 1);
        assert_eq!(bus.last_event_id(), None);
        Ok(())
    }

    #[test]
    fn settings_notification_overwrites_shadow() -> Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let bus = EventBus::with_capacity(8);
        let shadow = SettingsShadow::default();
        shadow.apply(&SettingsChange::PeerPort(6881));
        let engine = MemoryEngine::new();

        publisher(&metrics, &bus, &shadow)
            .publish_all(&engine, vec![EngineEvent::ServerSettingsChanged]);

        assert_eq!(shadow.snapshot().peer_port, 51413);
        assert_eq!(metrics.notifications("server_settings_changed"), 1);
        assert!(bus.last_event_id().is_some());
        Ok(())
    }
}
