//! Error types for the log store.

use std::io;

/// Errors surfaced by the engine and its command channel.
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    /// Writing appended bytes to the store failed. The index was not advanced.
    #[error("storage write failed at offset {offset}: {source}")]
    StorageWriteFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Reading from the store failed.
    #[error("storage read failed at offset {offset}: {source}")]
    StorageReadFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// The store returned fewer bytes than the index says it holds.
    #[error("truncated read at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// The session resource stayed locked through every retry.
    #[error("could not lock session {name} after {attempts} attempts")]
    LockAcquisitionFailed { name: String, attempts: u32 },

    /// Reserved: window requests are clamped rather than rejected.
    #[error("invalid line range: start {start}, count {count}")]
    InvalidRange { start: usize, count: usize },

    /// The store holds fewer bytes than the index has recorded.
    #[error("index out of sync with store: indexed {indexed} bytes, store has {actual}")]
    IndexOutOfSync { indexed: u64, actual: u64 },

    /// Unrecognised line-ending name or sequence.
    #[error("invalid line ending: {0:?}")]
    InvalidLineEnding(String),

    /// No session is active, e.g. after a failed rollover.
    #[error("no active session")]
    NoSession,

    /// Any other storage failure (listing, creating, sizing, flushing).
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),

    /// The engine worker has shut down.
    #[error("engine worker is no longer running")]
    EngineClosed,
}

/// Result type for log store operations.
pub type Result<T> = std::result::Result<T, LogStoreError>;
