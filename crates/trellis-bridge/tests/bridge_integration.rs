use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use trellis_bridge::{BridgeError, MemoryEngine, ObserverSink, SessionBridge};
use trellis_config::{BridgeConfig, ConfigError, ServerProfile};
use trellis_core::{
    AddTorrentFile, AddTorrentLink, ConnectionState, RpcError, Server, SettingsChange,
    TorrentChange, TorrentId,
};
use trellis_events::Event;
use trellis_telemetry::DropReason;
use trellis_test_support::fixtures::{
    MAGNET_HASH, MAGNET_LINK, UNREACHABLE_ADDRESS, loopback_server, magnet_request,
    metainfo_bytes, metainfo_request, test_config,
};
use trellis_test_support::{RecordingObserver, replay_torrents};

const WAIT: Duration = Duration::from_secs(5);

fn start() -> Result<(SessionBridge, Arc<RecordingObserver>)> {
    let bridge = SessionBridge::start(&test_config(), MemoryEngine::new)?;
    let recorder = Arc::new(RecordingObserver::new());
    ensure!(bridge.subscribe(recorder.clone()), "fresh observer rejected");
    Ok((bridge, recorder))
}

fn connect(bridge: &SessionBridge, recorder: &RecordingObserver) -> Result<()> {
    bridge.set_server(loopback_server());
    bridge.connect();
    ensure!(
        recorder.wait_for_count(WAIT, 1, |event| matches!(
            event,
            Event::ConnectionStateChanged {
                state: ConnectionState::Connected
            }
        )),
        "bridge never connected"
    );
    Ok(())
}

/// Round-trips a free-space query so every earlier command has been handled.
fn barrier(bridge: &SessionBridge, recorder: &RecordingObserver, tag: &str) -> Result<Vec<Event>> {
    let marker = format!("/barrier/{tag}");
    bridge.get_free_space_for_path(marker.clone());
    recorder
        .wait_for(WAIT, |events| {
            events.iter().any(
                |event| matches!(event, Event::FreeSpaceForPath { path, .. } if *path == marker),
            )
        })
        .context("barrier never completed")
}

fn added_ids(events: &[Event]) -> Vec<TorrentId> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::TorrentAdded { torrent_id, .. } => Some(*torrent_id),
            _ => None,
        })
        .collect()
}

#[test]
fn startup_completes_within_timeout() -> Result<()> {
    let config = test_config();
    let started = Instant::now();
    let bridge = SessionBridge::start(&config, MemoryEngine::new)?;
    assert!(started.elapsed() < config.startup_timeout());
    assert!(bridge.metrics().snapshot().worker_startup_ms >= 0);
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn commands_from_one_producer_run_in_submission_order() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    let queue = bridge.queue();
    let producer = thread::spawn(move || {
        for n in 0..50 {
            queue.submit(trellis_bridge::Command::GetFreeSpaceForPath(format!(
                "/data/{n}"
            )));
        }
    });
    producer.join().map_err(|_| anyhow::anyhow!("producer panicked"))?;

    let events = recorder
        .wait_for(WAIT, |events| {
            events
                .iter()
                .filter(|event| matches!(event, Event::FreeSpaceForPath { .. }))
                .count()
                >= 50
        })
        .context("free-space answers missing")?;
    let paths: Vec<String> = events
        .into_iter()
        .filter_map(|event| match event {
            Event::FreeSpaceForPath { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..50).map(|n| format!("/data/{n}")).collect();
    assert_eq!(paths, expected);
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn commands_for_removed_torrents_are_dropped() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    bridge.add_torrent_link(magnet_request('a', "doomed"));
    let events = recorder
        .wait_for(WAIT, |events| !added_ids(events).is_empty())
        .context("torrent never added")?;
    let id = added_ids(&events)[0];

    recorder.clear();
    bridge.remove_torrents(vec![id], false);
    bridge.submit_torrent_change(id, TorrentChange::PeersLimit(3));
    bridge.rename_torrent_file(id, "doomed", "kept");
    let events = barrier(&bridge, &recorder, "stale")?;

    assert_eq!(bridge.metrics().dropped(DropReason::StaleEntity), 2);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Event::TorrentFileRenamed { .. }))
    );
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn observer_deltas_rebuild_the_engine_torrent_list() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    for (seed, name) in [('a', "alpha"), ('b', "bravo"), ('c', "charlie")] {
        bridge.add_torrent_link(magnet_request(seed, name));
    }
    let events = recorder
        .wait_for(WAIT, |events| added_ids(events).len() == 3)
        .context("torrents never added")?;
    let ids = added_ids(&events);

    bridge.remove_torrents(vec![ids[1]], false);
    bridge.submit_torrent_change(ids[2], TorrentChange::PeersLimit(7));
    bridge.add_torrent_link(magnet_request('d', "delta"));
    bridge.update_data();
    let events = barrier(&bridge, &recorder, "replay")?;

    let torrents = replay_torrents(&events)?;
    let names: Vec<&str> = torrents.iter().map(|torrent| torrent.name.as_str()).collect();
    assert_eq!(names, ["alpha", "charlie", "delta"]);
    assert_eq!(torrents[1].peers_limit, 7);
    assert!(torrents.iter().all(|torrent| torrent.left_until_done < torrent.size_when_done));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn settings_shadow_is_visible_before_the_worker_runs() -> Result<()> {
    let (bridge, recorder) = start()?;

    bridge.set_server_setting(SettingsChange::PeerPort(6_881));
    assert_eq!(bridge.server_settings().peer_port, 6_881);

    // Rejected by the disconnected engine; the daemon's settings replace the
    // optimistic value once connected.
    connect(&bridge, &recorder)?;
    barrier(&bridge, &recorder, "connected")?;
    assert_eq!(bridge.metrics().commands_failed("settings"), 1);
    assert_eq!(bridge.server_settings().peer_port, 51_413);

    let mut wanted = bridge.server_settings();
    wanted.upload_speed_limit = 250;
    wanted.upload_speed_limited = true;
    recorder.clear();
    bridge.set_server_settings(&wanted);

    let events = barrier(&bridge, &recorder, "applied")?;
    let settled = events
        .iter()
        .filter(|event| matches!(event, Event::ServerSettingsChanged { .. }))
        .count();
    assert_eq!(settled, 2);
    assert_eq!(bridge.server_settings(), wanted);
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn subscribing_twice_delivers_once() -> Result<()> {
    let (bridge, recorder) = start()?;
    let sink: Arc<dyn ObserverSink> = recorder.clone();
    assert!(!bridge.subscribe(Arc::clone(&sink)));

    connect(&bridge, &recorder)?;
    bridge.get_download_dir_free_space();
    let events = barrier(&bridge, &recorder, "dedupe")?;
    let answers = events
        .iter()
        .filter(|event| matches!(event, Event::DownloadDirFreeSpace { .. }))
        .count();
    assert_eq!(answers, 1);

    assert!(bridge.unsubscribe(&sink));
    assert!(!bridge.unsubscribe(&sink));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn each_add_reports_exactly_one_outcome() -> Result<()> {
    let (bridge, recorder) = start()?;

    bridge.add_torrent_link(AddTorrentLink {
        link: MAGNET_LINK.to_string(),
        ..AddTorrentLink::default()
    });
    connect(&bridge, &recorder)?;
    bridge.add_torrent_link(AddTorrentLink {
        link: MAGNET_LINK.to_string(),
        ..AddTorrentLink::default()
    });
    bridge.add_torrent_link(AddTorrentLink {
        link: MAGNET_LINK.to_uppercase().replace("MAGNET:?XT=URN:BTIH:", "magnet:?xt=urn:btih:"),
        ..AddTorrentLink::default()
    });
    bridge.add_torrent_link(AddTorrentLink {
        link: "gopher://example.org/whatever".to_string(),
        ..AddTorrentLink::default()
    });
    bridge.add_torrent_metainfo(metainfo_request("image.iso", 8_192));

    let events = barrier(&bridge, &recorder, "adds")?;
    let outcomes: Vec<&Event> = events.iter().filter(|event| event.is_add_outcome()).collect();
    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes[0], &Event::TorrentAddError);
    assert!(matches!(
        outcomes[1],
        Event::TorrentAdded { hash_string, name, .. }
            if hash_string == MAGNET_HASH && name == "Cosmos Laundromat"
    ));
    assert_eq!(outcomes[2], &Event::TorrentAddDuplicate);
    assert_eq!(outcomes[3], &Event::TorrentAddError);
    assert!(matches!(
        outcomes[4],
        Event::TorrentAdded { name, .. } if name == "image.iso"
    ));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn malformed_metainfo_does_not_stop_the_worker() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    bridge.add_torrent_metainfo(AddTorrentFile {
        metainfo: b"d4:name18446744073709551615:xe".to_vec(),
        ..AddTorrentFile::default()
    });
    bridge.add_torrent_link(AddTorrentLink {
        link: MAGNET_LINK.to_string(),
        ..AddTorrentLink::default()
    });

    let events = barrier(&bridge, &recorder, "malformed")?;
    let outcomes: Vec<&Event> = events.iter().filter(|event| event.is_add_outcome()).collect();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], &Event::TorrentAddError);
    assert!(matches!(
        outcomes[1],
        Event::TorrentAdded { hash_string, .. } if hash_string == MAGNET_HASH
    ));
    assert!(!bridge.queue().is_closed());
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn start_rejects_invalid_configuration() {
    let cases: Vec<(&str, BridgeConfig)> = vec![
        (
            "poll_interval_ms",
            BridgeConfig {
                poll_interval_ms: 0,
                ..test_config()
            },
        ),
        (
            "event_bus_capacity",
            BridgeConfig {
                event_bus_capacity: 0,
                ..test_config()
            },
        ),
        (
            "startup_timeout_ms",
            BridgeConfig {
                startup_timeout_ms: 0,
                ..test_config()
            },
        ),
        (
            "thread_name",
            BridgeConfig {
                thread_name: " ".to_string(),
                ..test_config()
            },
        ),
        (
            "port",
            BridgeConfig {
                server: Some(ServerProfile {
                    address: "127.0.0.1".to_string(),
                    port: 0,
                    ..ServerProfile::default()
                }),
                ..test_config()
            },
        ),
    ];

    for (expected, config) in cases {
        match SessionBridge::start(&config, MemoryEngine::new) {
            Err(BridgeError::Config {
                source: ConfigError::InvalidField { field, .. },
            }) => assert_eq!(field, expected),
            Err(other) => panic!("{expected}: unexpected error {other:?}"),
            Ok(bridge) => {
                bridge.shutdown().ok();
                panic!("{expected}: configuration accepted");
            }
        }
    }
}

#[test]
fn unreadable_torrent_files_are_abandoned() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;
    let dir = tempfile::tempdir()?;

    bridge.add_torrent_file(dir.path().join("missing.torrent"), Default::default());
    assert_eq!(bridge.metrics().dropped(DropReason::UnreadableInput), 1);

    let path = dir.path().join("present.torrent");
    std::fs::File::create(&path)?.write_all(&metainfo_bytes("present.bin", 4_096))?;
    bridge.add_torrent_file(&path, Default::default());

    let events = barrier(&bridge, &recorder, "files")?;
    let outcomes: Vec<&Event> = events.iter().filter(|event| event.is_add_outcome()).collect();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Event::TorrentAdded { name, .. } if name == "present.bin"));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn file_renames_and_selection_produce_file_deltas() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    bridge.add_torrent_metainfo(metainfo_request("movie.mkv", 65_536));
    let events = recorder
        .wait_for(WAIT, |events| !added_ids(events).is_empty())
        .context("torrent never added")?;
    let id = added_ids(&events)[0];
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TorrentFilesUpdated { torrent_id, delta } if *torrent_id == id && delta.added.len() == 1
    )));

    recorder.clear();
    bridge.rename_torrent_file(id, "movie.mkv", "feature.mkv");
    bridge.submit_torrent_change(
        id,
        TorrentChange::FilesWanted {
            files: vec![0],
            wanted: false,
        },
    );
    let events = barrier(&bridge, &recorder, "rename")?;

    assert!(events.contains(&Event::TorrentFileRenamed {
        torrent_id: id,
        file_path: "movie.mkv".to_string(),
        new_name: "feature.mkv".to_string(),
    }));
    let file_deltas: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::TorrentFilesUpdated { delta, .. } => Some(delta),
            _ => None,
        })
        .collect();
    assert_eq!(file_deltas.len(), 2);
    assert_eq!(file_deltas[0].changed[0].path, "feature.mkv");
    assert!(!file_deltas[1].changed[0].wanted);
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn peers_follow_the_peer_toggle() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    bridge.add_torrent_link(magnet_request('e', "echo"));
    let events = recorder
        .wait_for(WAIT, |events| !added_ids(events).is_empty())
        .context("torrent never added")?;
    let id = added_ids(&events)[0];

    recorder.clear();
    bridge.submit_torrent_change(id, TorrentChange::PeersEnabled(true));
    bridge.submit_torrent_change(id, TorrentChange::PeersEnabled(false));
    let events = barrier(&bridge, &recorder, "peers")?;

    let peer_deltas: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::TorrentPeersUpdated { delta, .. } => Some(delta),
            _ => None,
        })
        .collect();
    assert_eq!(peer_deltas.len(), 2);
    assert_eq!(peer_deltas[0].added.len(), 2);
    assert_eq!(peer_deltas[1].removed_count(), 2);
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn downloads_report_completion() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;

    bridge.add_torrent_link(magnet_request('f', "foxtrot"));
    for _ in 0..4 {
        bridge.update_data();
    }
    assert!(recorder.wait_for_count(WAIT, 1, |event| matches!(
        event,
        Event::TorrentFinished { name, .. } if name == "foxtrot"
    )));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn unreachable_server_surfaces_connection_error() -> Result<()> {
    let (bridge, recorder) = start()?;
    bridge.set_server(Server {
        address: UNREACHABLE_ADDRESS.to_string(),
        ..loopback_server()
    });
    bridge.connect();

    assert!(recorder.wait_for_count(WAIT, 1, |event| matches!(
        event,
        Event::ErrorChanged {
            error: RpcError::ConnectionError,
            detailed_message,
            ..
        } if detailed_message.contains(UNREACHABLE_ADDRESS)
    )));
    bridge.shutdown()?;
    Ok(())
}

#[test]
fn shutdown_disconnects_and_joins_the_worker() -> Result<()> {
    let (bridge, recorder) = start()?;
    connect(&bridge, &recorder)?;
    let queue = bridge.queue();

    bridge.shutdown()?;
    let events = recorder.events();
    assert!(events.contains(&Event::AboutToDisconnect));
    assert_eq!(
        events.last(),
        Some(&Event::ConnectionStateChanged {
            state: ConnectionState::Disconnected
        })
    );
    assert!(!queue.submit(trellis_bridge::Command::Connect));
    Ok(())
}

#[tokio::test]
async fn event_stream_mirrors_observer_notifications() -> Result<()> {
    let (bridge, recorder) = start()?;
    let mut stream = bridge.events(None);

    bridge.set_server(loopback_server());
    bridge.connect();
    let connected = tokio::time::timeout(WAIT, async {
        while let Some(envelope) = stream.next().await {
            if envelope.event
                == (Event::ConnectionStateChanged {
                    state: ConnectionState::Connected,
                })
            {
                return Some(envelope.id);
            }
        }
        None
    })
    .await?
    .context("bus closed before connecting")?;

    let mut replay = bridge.events(Some(connected - 1));
    let first = replay.next().await.context("replay empty")?;
    assert_eq!(first.id, connected);
    assert!(recorder.events().contains(&first.event));
    bridge.shutdown()?;
    Ok(())
}
