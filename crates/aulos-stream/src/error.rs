use thiserror::Error;

use aulos_storage::StorageError;

use crate::traits::{CacheIoError, ChannelError};

/// Result type used by `aulos-stream`.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by the chunked stream and its fetch machinery.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream closed")]
    Closed,

    #[error("stream error, code {0}")]
    Stream(u16),

    #[error("chunk {0} timed out after one re-request")]
    ChunkTimeout(usize),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheIoError),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for StreamError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Closed => Self::Closed,
            StorageError::Stream(code) => Self::Stream(code),
            other => Self::Storage(other),
        }
    }
}
