#![allow(clippy::redundant_pub_crate)]

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trellis_core::{SessionEngine, SessionError, SessionResult};
use trellis_telemetry::{DropReason, Metrics};

use crate::command::Command;
use crate::error::{BridgeError, BridgeResult};
use crate::publisher::DiffPublisher;
use crate::queue::CommandReceiver;
use crate::startup::StartupGate;

/// Everything the worker thread takes ownership of at spawn time.
pub(crate) struct WorkerContext {
    pub(crate) commands: CommandReceiver,
    pub(crate) publisher: DiffPublisher,
    pub(crate) metrics: Metrics,
    pub(crate) gate: StartupGate,
    pub(crate) poll_interval: Duration,
}

/// Spawn the dedicated worker thread.
///
/// The engine is built by `factory` on the worker itself, after the gate has
/// been signalled, so engines need not be constructible elsewhere.
pub(crate) fn spawn<E, F>(
    thread_name: &str,
    factory: F,
    ctx: WorkerContext,
) -> BridgeResult<JoinHandle<()>>
where
    E: SessionEngine + 'static,
    F: FnOnce() -> E + Send + 'static,
{
    thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || run(factory, ctx))
        .map_err(|source| BridgeError::WorkerSpawn {
            thread_name: thread_name.to_string(),
            source,
        })
}

fn run<E, F>(factory: F, ctx: WorkerContext)
where
    E: SessionEngine,
    F: FnOnce() -> E,
{
    let WorkerContext {
        commands,
        publisher,
        metrics,
        gate,
        poll_interval,
    } = ctx;

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build worker runtime");
            return;
        }
    };

    gate.signal();
    drop(gate);

    runtime.block_on(async move {
        let actor = SessionActor {
            engine: factory(),
            publisher,
            metrics,
        };
        actor.run(commands, poll_interval).await;
    });
}

/// Owns the engine and serialises every operation on it.
pub(crate) struct SessionActor<E> {
    engine: E,
    publisher: DiffPublisher,
    metrics: Metrics,
}

impl<E: SessionEngine> SessionActor<E> {
    pub(crate) const fn new(engine: E, publisher: DiffPublisher, metrics: Metrics) -> Self {
        Self {
            engine,
            publisher,
            metrics,
        }
    }

    pub(crate) async fn run(mut self, mut commands: CommandReceiver, poll_interval: Duration) {
        info!("session worker started");
        let mut poll = tokio::time::interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle(command).await,
                    }
                }
                _ = poll.tick() => self.tick().await,
            }
        }

        if self.engine.is_connected()
            && let Err(err) = self.engine.disconnect().await
        {
            warn!(error = %err, "disconnect during shutdown failed");
        }
        self.flush().await;
        info!("session worker stopped");
    }

    pub(crate) async fn handle(&mut self, command: Command) {
        let kind = command.kind();
        match self.execute(command).await {
            Ok(true) => self.metrics.inc_command_executed(kind),
            Ok(false) => {}
            Err(err) => {
                warn!(command = kind, error = %err, "session command failed");
                self.metrics.inc_command_failed(kind);
            }
        }
        self.flush().await;
    }

    async fn tick(&mut self) {
        if let Err(err) = self.engine.tick().await {
            warn!(error = %err, "periodic engine update failed");
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        match self.engine.poll_events().await {
            Ok(events) if events.is_empty() => {}
            Ok(events) => self.publisher.publish_all(&self.engine, events),
            Err(err) => warn!(error = %err, "draining engine notifications failed"),
        }
    }

    /// Map a per-entity command to the torrent's current index. Only called
    /// while connected, so a miss means the torrent is gone.
    fn resolve(&self, command: &Command) -> Option<usize> {
        let id = command.torrent_id()?;
        let index = self.engine.torrent_index(id);
        if index.is_none() {
            debug!(
                command = command.kind(),
                torrent_id = %id,
                "torrent no longer exists; dropping command"
            );
            self.metrics.inc_dropped(DropReason::StaleEntity);
        }
        index
    }

    /// Run one command; `Ok(false)` means it was dropped without reaching the engine.
    async fn execute(&mut self, command: Command) -> SessionResult<bool> {
        let engine = &mut self.engine;
        match command {
            Command::SetServer(server) => engine.set_server(*server).await?,
            Command::ResetServer => engine.reset_server().await?,
            Command::Connect => engine.connect().await?,
            Command::Disconnect => engine.disconnect().await?,
            Command::SetUpdateDisabled(disabled) => engine.set_update_disabled(disabled).await?,
            Command::UpdateData => engine.update_data().await?,
            Command::Settings(change) => engine.apply_settings_change(&change).await?,
            Command::AddTorrentFile(request) => engine.add_torrent_file(*request).await?,
            Command::AddTorrentLink(request) => engine.add_torrent_link(*request).await?,
            Command::StartTorrents(ids) => engine.start_torrents(&ids).await?,
            Command::StartTorrentsNow(ids) => engine.start_torrents_now(&ids).await?,
            Command::PauseTorrents(ids) => engine.pause_torrents(&ids).await?,
            Command::RemoveTorrents { ids, delete_files } => {
                engine.remove_torrents(&ids, delete_files).await?;
            }
            Command::CheckTorrents(ids) => engine.check_torrents(&ids).await?,
            Command::ReannounceTorrents(ids) => engine.reannounce_torrents(&ids).await?,
            Command::MoveTorrents { ids, movement } => {
                engine.move_torrents(&ids, movement).await?;
            }
            Command::SetTorrentsLocation {
                ids,
                location,
                move_files,
            } => {
                engine
                    .set_torrents_location(&ids, &location, move_files)
                    .await?;
            }
            Command::Torrent { .. } | Command::RenameTorrentFile { .. } => {
                if !engine.is_connected() {
                    return Err(SessionError::NotConnected {
                        operation: command.kind(),
                    });
                }
                let Some(index) = self.resolve(&command) else {
                    return Ok(false);
                };
                let engine = &mut self.engine;
                match command {
                    Command::Torrent { change, .. } => {
                        engine.apply_torrent_change(index, &change).await?;
                    }
                    Command::RenameTorrentFile {
                        file_path,
                        new_name,
                        ..
                    } => {
                        engine
                            .rename_torrent_file(index, &file_path, &new_name)
                            .await?;
                    }
                    _ => {}
                }
            }
            Command::GetDownloadDirFreeSpace => engine.get_download_dir_free_space().await?,
            Command::GetFreeSpaceForPath(path) => engine.get_free_space_for_path(&path).await?,
            Command::Shutdown => return Ok(false),
        }
        Ok(true)
    }
}
