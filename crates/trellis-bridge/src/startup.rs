//! One-shot readiness handshake between the spawning thread and the worker.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{BridgeError, BridgeResult};

/// Default time the spawning thread waits for the worker.
pub const STARTUP_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Flag plus condition variable shared by both sides of the handshake.
///
/// The flag flips from `false` to `true` exactly once.
#[derive(Clone, Default)]
pub struct StartupGate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl StartupGate {
    /// Create an unsignalled gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.state.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the worker as ready and wake the waiter.
    pub fn signal(&self) {
        let mut ready = self.flag();
        *ready = true;
        drop(ready);
        self.state.1.notify_all();
    }

    /// Whether the worker has signalled.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.flag()
    }

    /// Block until the worker signals or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StartupTimedOut`] when the timeout elapses first.
    pub fn wait(&self, timeout: Duration) -> BridgeResult<Duration> {
        let started = Instant::now();
        let (lock, condvar) = &*self.state;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (ready, _) = condvar
            .wait_timeout_while(guard, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        if *ready {
            Ok(started.elapsed())
        } else {
            Err(BridgeError::StartupTimedOut {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
