#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Logging and metrics shared across the Trellis workspace.
//!
//! Layout: `init.rs` (tracing subscriber setup), `metrics.rs` (Prometheus
//! registry for the bridge), `error.rs`.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{DropReason, Metrics, MetricsSnapshot};
