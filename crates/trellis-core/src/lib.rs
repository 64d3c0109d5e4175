#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Engine-agnostic session types, the incremental delta model, and the
//! `SessionEngine` boundary implemented by remote-session adapters.
//!
//! Layout: `model/` (ids, snapshots, requests), `settings.rs` (session-wide
//! property set), `delta.rs` (range deltas), `engine.rs` (engine trait and raw
//! change notifications), `error.rs`.

pub mod delta;
pub mod engine;
pub mod error;
pub mod model;
pub mod settings;

pub use delta::{CollectionDelta, IndexRange};
pub use engine::{EngineEvent, RangeNotification, SessionEngine};
pub use error::{DeltaError, SessionError, SessionResult};
pub use model::{
    AddTorrentFile, AddTorrentLink, ConnectionState, Credentials, FileSnapshot, LimitMode,
    PeerSnapshot, Priority, QueueMove, RpcError, Server, ServerStats, SessionStats, TorrentChange,
    TorrentId, TorrentSnapshot, TorrentStatus, TrackerId, TrackerSnapshot, TrackerStatus,
};
pub use settings::{
    AlternativeSpeedLimitsDays, EncryptionMode, ServerSettingsSnapshot, SettingsChange,
};
