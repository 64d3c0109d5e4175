//! Error types for session engines and delta handling.

use thiserror::Error;

use crate::model::TorrentId;

/// Primary error type for session engine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation requires an established connection.
    #[error("session not connected")]
    NotConnected {
        /// Operation identifier.
        operation: &'static str,
    },
    /// No server profile has been configured.
    #[error("no server configured")]
    NoServer {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The referenced torrent is not tracked by the engine.
    #[error("torrent not found")]
    UnknownTorrent {
        /// Missing torrent identifier.
        torrent_id: TorrentId,
    },
    /// A request carried an invalid value.
    #[error("invalid session input")]
    InvalidInput {
        /// Field name with an invalid value.
        field: &'static str,
        /// Static reason describing the invalid value.
        reason: &'static str,
    },
    /// The remote daemon rejected or failed the request.
    #[error("remote operation failed")]
    Remote {
        /// Operation identifier.
        operation: &'static str,
        /// Message reported by the remote side.
        message: String,
    },
    /// Operation is not supported by the engine.
    #[error("session operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

/// Convenience alias for engine operation results.
pub type SessionResult<T> = Result<T, SessionError>;

/// Structural problems detected while slicing or applying a collection delta.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeltaError {
    /// A range ended before it started.
    #[error("delta range inverted")]
    RangeInverted {
        /// Range start.
        start: usize,
        /// Range end (exclusive).
        end: usize,
    },
    /// Ranges were not sorted ascending or overlapped.
    #[error("delta ranges overlap")]
    RangesOverlap {
        /// End of the preceding range.
        previous_end: usize,
        /// Start of the offending range.
        start: usize,
    },
    /// A range pointed past the end of the collection.
    #[error("delta range out of bounds")]
    OutOfBounds {
        /// Exclusive end of the offending range.
        end: usize,
        /// Length of the collection the range was checked against.
        len: usize,
    },
    /// The number of changed snapshots did not match the changed ranges.
    #[error("changed snapshot count mismatch")]
    ChangedCountMismatch {
        /// Total length of the changed ranges.
        expected: usize,
        /// Number of snapshots carried by the delta.
        actual: usize,
    },
    /// More items were reported as added than the collection holds.
    #[error("added count exceeds collection length")]
    AddedExceedsLength {
        /// Reported number of appended items.
        added: usize,
        /// Current collection length.
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_constant() {
        let cases = vec![
            (
                SessionError::NotConnected { operation: "add" }.to_string(),
                "session not connected",
            ),
            (
                SessionError::UnknownTorrent {
                    torrent_id: TorrentId(4),
                }
                .to_string(),
                "torrent not found",
            ),
            (
                SessionError::Remote {
                    operation: "torrent-add",
                    message: "duplicate torrent".to_string(),
                }
                .to_string(),
                "remote operation failed",
            ),
            (
                DeltaError::OutOfBounds { end: 9, len: 3 }.to_string(),
                "delta range out of bounds",
            ),
        ];

        for (rendered, expected) in cases {
            assert_eq!(rendered, expected);
        }
    }
}
