//! Thread-safe command queue feeding the worker.

use tokio::sync::mpsc;
use tracing::warn;
use trellis_telemetry::{DropReason, Metrics};

use crate::command::Command;

pub(crate) type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Multi-producer handle for submitting commands to the worker.
///
/// Submission never blocks; commands from one producer execute in submission
/// order.
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<Command>,
    metrics: Metrics,
}

impl CommandQueue {
    pub(crate) fn channel(metrics: Metrics) -> (Self, CommandReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, metrics }, receiver)
    }

    /// Enqueue a command for the worker.
    ///
    /// Returns `false` when the worker has stopped; the command is then
    /// dropped with a warning.
    pub fn submit(&self, command: Command) -> bool {
        let kind = command.kind();
        if self.sender.send(command).is_err() {
            warn!(command = kind, "worker stopped; dropping command");
            self.metrics.inc_dropped(DropReason::WorkerStopped);
            return false;
        }
        self.metrics.inc_command_submitted(kind);
        true
    }

    /// Whether the worker side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
