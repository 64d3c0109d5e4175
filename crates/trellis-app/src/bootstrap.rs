use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use trellis_bridge::{MemoryEngine, SessionBridge};
use trellis_config::{BridgeConfig, ServerProfile};
use trellis_core::{AddTorrentLink, Server};
use trellis_events::EventEnvelope;
use trellis_telemetry::{LoggingConfig, build_sha, init_logging};

use crate::error::{AppError, AppResult};

/// Environment variable naming the JSON configuration document.
pub const CONFIG_ENV: &str = "TRELLIS_CONFIG";

/// How long the demo prints events before shutting down.
pub const WATCH_WINDOW: Duration = Duration::from_secs(3);

/// Load configuration, install logging and run the demo session with the
/// links given on the command line.
///
/// # Errors
///
/// Returns an error when configuration or logging cannot be set up, or when
/// the bridge fails to start or stop.
pub async fn run_app() -> AppResult<()> {
    let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config =
        trellis_config::load(path.as_deref()).map_err(|err| AppError::config("config.load", err))?;

    init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: config.logging.format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    let links: Vec<String> = std::env::args().skip(1).collect();
    run_session(&config, links, WATCH_WINDOW, |envelope| {
        let line = serde_json::to_string(envelope).map_err(|source| AppError::Serialize { source })?;
        println!("{line}");
        Ok(())
    })
    .await
}

fn loopback_profile() -> ServerProfile {
    ServerProfile {
        name: "loopback".to_string(),
        address: "127.0.0.1".to_string(),
        ..ServerProfile::default()
    }
}

/// Start a bridge, connect, add `links` and hand every event to `sink` until
/// `window` elapses.
pub(crate) async fn run_session<S>(
    config: &BridgeConfig,
    links: Vec<String>,
    window: Duration,
    mut sink: S,
) -> AppResult<()>
where
    S: FnMut(&EventEnvelope) -> AppResult<()>,
{
    info!(build_sha = build_sha(), links = links.len(), "trellis demo starting");
    let bridge = SessionBridge::start(config, MemoryEngine::new)
        .map_err(|err| AppError::bridge("bridge.start", err))?;
    let mut events = bridge.events(None);

    if config.server.is_none() {
        bridge.set_server(Server::from(loopback_profile()));
    }
    bridge.connect();
    for link in links {
        bridge.add_torrent_link(AddTorrentLink {
            link,
            start: true,
            ..AddTorrentLink::default()
        });
    }
    bridge.update_data();

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            envelope = events.next() => match envelope {
                Some(envelope) => sink(&envelope)?,
                None => break,
            },
        }
    }

    info!(metrics = ?bridge.metrics().snapshot(), "trellis demo finished");
    tokio::task::spawn_blocking(move || bridge.shutdown())
        .await
        .map_err(|source| AppError::ShutdownTask { source })?
        .map_err(|err| AppError::bridge("bridge.shutdown", err))
}
