//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the bridge worker reports.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Why a command or notification was dropped without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The addressed torrent no longer exists at execution time.
    StaleEntity,
    /// The worker has already shut down.
    WorkerStopped,
    /// Caller-supplied input could not be read.
    UnreadableInput,
    /// A file or peer notification referenced a torrent that is gone.
    MissingParent,
    /// A range notification did not fit the live collection.
    InconsistentDelta,
}

impl DropReason {
    /// Label value used for the `reason` dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaleEntity => "stale_entity",
            Self::WorkerStopped => "worker_stopped",
            Self::UnreadableInput => "unreadable_input",
            Self::MissingParent => "missing_parent",
            Self::InconsistentDelta => "inconsistent_delta",
        }
    }
}

/// Prometheus-backed metrics registry for a bridge instance.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    commands_submitted_total: IntCounterVec,
    commands_executed_total: IntCounterVec,
    commands_failed_total: IntCounterVec,
    commands_dropped_total: IntCounterVec,
    notifications_published_total: IntCounterVec,
    torrents_tracked: IntGauge,
    worker_startup_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Torrents in the engine's live collection after the last update.
    pub torrents_tracked: i64,
    /// Time the last worker took to signal readiness (ms).
    pub worker_startup_ms: i64,
    /// Commands dropped because their torrent vanished.
    pub dropped_stale_entity: u64,
    /// Commands dropped because the worker had stopped.
    pub dropped_worker_stopped: u64,
    /// Adds abandoned because their input could not be read.
    pub dropped_unreadable_input: u64,
    /// Notifications dropped because their parent torrent vanished.
    pub dropped_missing_parent: u64,
    /// Notifications dropped because their ranges were inconsistent.
    pub dropped_inconsistent_delta: u64,
}

fn counter_vec(name: &'static str, help: &str, label: &str) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), &[label])
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let commands_submitted_total = counter_vec(
            "commands_submitted_total",
            "Commands accepted by the bridge queue",
            "command",
        )?;
        let commands_executed_total = counter_vec(
            "commands_executed_total",
            "Commands executed on the worker",
            "command",
        )?;
        let commands_failed_total = counter_vec(
            "commands_failed_total",
            "Commands whose engine call returned an error",
            "command",
        )?;
        let commands_dropped_total = counter_vec(
            "commands_dropped_total",
            "Commands and notifications dropped without effect",
            "reason",
        )?;
        let notifications_published_total = counter_vec(
            "notifications_published_total",
            "Notifications delivered to observers by kind",
            "kind",
        )?;
        let torrents_tracked = gauge("torrents_tracked", "Torrents in the live collection")?;
        let worker_startup_ms = gauge(
            "worker_startup_ms",
            "Time taken by the worker to signal readiness (ms)",
        )?;

        register(&registry, "commands_submitted_total", &commands_submitted_total)?;
        register(&registry, "commands_executed_total", &commands_executed_total)?;
        register(&registry, "commands_failed_total", &commands_failed_total)?;
        register(&registry, "commands_dropped_total", &commands_dropped_total)?;
        register(
            &registry,
            "notifications_published_total",
            &notifications_published_total,
        )?;
        register(&registry, "torrents_tracked", &torrents_tracked)?;
        register(&registry, "worker_startup_ms", &worker_startup_ms)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                commands_submitted_total,
                commands_executed_total,
                commands_failed_total,
                commands_dropped_total,
                notifications_published_total,
                torrents_tracked,
                worker_startup_ms,
            }),
        })
    }

    /// Count a command accepted by the queue.
    pub fn inc_command_submitted(&self, command: &str) {
        self.inner
            .commands_submitted_total
            .with_label_values(&[command])
            .inc();
    }

    /// Count a command executed on the worker.
    pub fn inc_command_executed(&self, command: &str) {
        self.inner
            .commands_executed_total
            .with_label_values(&[command])
            .inc();
    }

    /// Count a command whose engine call failed.
    pub fn inc_command_failed(&self, command: &str) {
        self.inner
            .commands_failed_total
            .with_label_values(&[command])
            .inc();
    }

    /// Count a dropped command or notification.
    pub fn inc_dropped(&self, reason: DropReason) {
        self.inner
            .commands_dropped_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Count a notification delivered to observers.
    pub fn inc_notification(&self, kind: &str) {
        self.inner
            .notifications_published_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Set the tracked torrent gauge.
    pub fn set_torrents_tracked(&self, count: usize) {
        self.inner
            .torrents_tracked
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record how long the worker took to signal readiness.
    pub fn observe_worker_startup(&self, duration: Duration) {
        self.inner
            .worker_startup_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Commands submitted with the given kind so far.
    #[must_use]
    pub fn commands_submitted(&self, command: &str) -> u64 {
        self.inner
            .commands_submitted_total
            .with_label_values(&[command])
            .get()
    }

    /// Commands executed with the given kind so far.
    #[must_use]
    pub fn commands_executed(&self, command: &str) -> u64 {
        self.inner
            .commands_executed_total
            .with_label_values(&[command])
            .get()
    }

    /// Commands of the given kind the engine rejected so far.
    #[must_use]
    pub fn commands_failed(&self, command: &str) -> u64 {
        self.inner
            .commands_failed_total
            .with_label_values(&[command])
            .get()
    }

    /// Drops recorded for the given reason so far.
    #[must_use]
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.inner
            .commands_dropped_total
            .with_label_values(&[reason.as_str()])
            .get()
    }

    /// Notifications of the given kind published so far.
    #[must_use]
    pub fn notifications(&self, kind: &str) -> u64 {
        self.inner
            .notifications_published_total
            .with_label_values(&[kind])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            torrents_tracked: self.inner.torrents_tracked.get(),
            worker_startup_ms: self.inner.worker_startup_ms.get(),
            dropped_stale_entity: self.dropped(DropReason::StaleEntity),
            dropped_worker_stopped: self.dropped(DropReason::WorkerStopped),
            dropped_unreadable_input: self.dropped(DropReason::UnreadableInput),
            dropped_missing_parent: self.dropped(DropReason::MissingParent),
            dropped_inconsistent_delta: self.dropped(DropReason::InconsistentDelta),
        }
    }

    fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_command_submitted("connect");
        metrics.inc_command_executed("connect");
        metrics.inc_notification("torrents_updated");
        metrics.inc_dropped(DropReason::StaleEntity);

        let rendered = metrics.render()?;
        assert!(rendered.contains("commands_submitted_total{command=\"connect\"} 1"));
        assert!(rendered.contains("commands_dropped_total{reason=\"stale_entity\"} 1"));
        assert!(rendered.contains("notifications_published_total{kind=\"torrents_updated\"} 1"));
        Ok(())
    }

    #[test]
    fn snapshot_reflects_gauges_and_drops() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_torrents_tracked(3);
        metrics.observe_worker_startup(Duration::from_millis(42));
        metrics.inc_dropped(DropReason::MissingParent);
        metrics.inc_dropped(DropReason::MissingParent);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.torrents_tracked, 3);
        assert_eq!(snapshot.worker_startup_ms, 42);
        assert_eq!(snapshot.dropped_missing_parent, 2);
        assert_eq!(snapshot.dropped_stale_entity, 0);
        assert_eq!(metrics.commands_executed("connect"), 0);
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_command_submitted("pause_torrents");
        assert_eq!(first.commands_submitted("pause_torrents"), 1);
        assert_eq!(second.commands_submitted("pause_torrents"), 0);
        Ok(())
    }
}
