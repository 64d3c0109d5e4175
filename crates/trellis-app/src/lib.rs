#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Demo wiring for the session bridge.
//!
//! Layout: `bootstrap.rs` (config, logging and the watch loop), `error.rs`.

/// Configuration loading and the demo session.
pub mod bootstrap;
/// Application error type.
pub mod error;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
