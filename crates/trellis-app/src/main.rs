#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! Demo binary: drives a bridge over the in-memory engine and prints every
//! event it receives as JSON.

use trellis_app::{AppResult, run_app};

/// Runs the demo until its watch window closes.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
