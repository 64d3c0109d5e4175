#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (sample snapshots and requests), recorder.rs (recording observer).

pub mod fixtures;
pub mod recorder;

pub use recorder::{RecordingObserver, replay_torrents};
