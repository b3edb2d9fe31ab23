use std::time::Duration;

use thiserror::Error;

/// Result type used by `aulos-storage`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the chunk buffer.
///
/// `Closed` and `Stream` are delivered to blocked readers when the stream
/// is torn down or the channel reports a stream-level error; `TimedOut`
/// lets the reader re-issue a request before giving up.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stream closed")]
    Closed,

    #[error("stream error, code {0}")]
    Stream(u16),

    #[error("chunk {index} not delivered within {timeout:?}")]
    TimedOut { index: usize, timeout: Duration },

    #[error("chunk size mismatch at index {index}: expected {expected} bytes, got {got}")]
    InvalidChunkSize {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("chunk index {index} out of range ({chunks_total} chunks)")]
    InvalidChunkIndex { index: usize, chunks_total: usize },

    #[error("chunk processing failed: {0}")]
    Process(String),
}
