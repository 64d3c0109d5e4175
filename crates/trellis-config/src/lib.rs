#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! File and environment backed configuration for the session bridge.
//!
//! Layout: `model.rs` (typed config documents), `defaults.rs` (default values),
//! `loader.rs` (JSON loading and `TRELLIS_*` overrides), `validate.rs`
//! (validation helpers), `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, apply_env_overrides, apply_overrides_from, load, load_from_path};
pub use model::{BridgeConfig, LoggingSettings, ServerProfile};
pub use validate::validate;
