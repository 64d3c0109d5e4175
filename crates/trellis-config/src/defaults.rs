//! Default values for bridge configuration.
//!
//! # Design
//! - Keep every default in one place so documents and code agree.

/// Time the caller waits for the worker to signal readiness.
pub const STARTUP_TIMEOUT_MS: u64 = 5_000;
/// Interval between engine ticks on the worker.
pub const POLL_INTERVAL_MS: u64 = 250;
/// Broadcast and replay capacity of the event bus.
pub const EVENT_BUS_CAPACITY: usize = 1_024;
/// Name given to the worker thread.
pub const THREAD_NAME: &str = "trellis-worker";
/// Log level used when neither the document nor `RUST_LOG` sets one.
pub const LOG_LEVEL: &str = "info";
/// RPC port of a stock daemon.
pub const SERVER_PORT: u16 = 9091;
/// RPC path of a stock daemon.
pub const SERVER_API_PATH: &str = "/transmission/rpc";
/// Seconds between periodic updates.
pub const UPDATE_INTERVAL_SECS: u64 = 5;
/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
