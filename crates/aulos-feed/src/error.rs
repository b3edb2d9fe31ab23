use thiserror::Error;

use aulos_stream::{ChannelError, StreamError};

use crate::traits::{AudioKeyError, CdnError, MetadataError};

/// Result type used by `aulos-feed`.
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors raised while resolving a playable into an open stream.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("metadata not found")]
    MetadataNotFound,

    #[error("metadata rpc failed: {0}")]
    Metadata(String),

    #[error("no audio key for file")]
    NoAudioKey,

    #[error("audio key rpc failed: {0}")]
    AudioKey(String),

    #[error("no playable audio file under the vorbis-only policy")]
    UnsupportedFormat,

    #[error("cdn http error, status {0}")]
    CdnHttp(u16),

    #[error("cdn request failed: {0}")]
    Cdn(String),

    #[error("file header block missing or incomplete")]
    MissingHeaders,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MetadataError> for FeedError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound => Self::MetadataNotFound,
            MetadataError::Rpc(msg) => Self::Metadata(msg),
        }
    }
}

impl From<AudioKeyError> for FeedError {
    fn from(err: AudioKeyError) -> Self {
        match err {
            AudioKeyError::Missing => Self::NoAudioKey,
            AudioKeyError::Rpc(msg) => Self::AudioKey(msg),
        }
    }
}

impl From<CdnError> for FeedError {
    fn from(err: CdnError) -> Self {
        match err {
            CdnError::Http(status) => Self::CdnHttp(status),
            CdnError::Io(msg) => Self::Cdn(msg),
        }
    }
}
