//! Consumed capabilities of the surrounding session.
//!
//! The control channel and the local content cache are external
//! collaborators; the core only depends on these trait surfaces.

use std::sync::Arc;

use thiserror::Error;

use aulos_core::FileId;

/// Delivery sink for chunk payloads, file headers, and stream errors.
///
/// Implemented by the buffer-backed sink (steady-state reads) and by the
/// feeder's header fetch (stream open). The channel dispatcher thread calls
/// into this for every sub-message of a chunk response; `cached` marks
/// deliveries that originated from the local cache and therefore must not
/// be written back to it.
pub trait ChunkSink: Send + Sync {
    fn write_chunk(&self, index: usize, data: &[u8], cached: bool);

    fn write_header(&self, id: u8, data: &[u8], cached: bool);

    fn stream_error(&self, code: u16);
}

/// Error raised when a chunk request cannot be enqueued on the channel.
#[derive(Debug, Error)]
#[error("channel error: {0}")]
pub struct ChannelError(pub String);

/// The service's multiplexed control channel.
///
/// `request_chunk` enqueues an asynchronous request; the reply is delivered
/// later through `sink` from the channel's dispatcher thread, possibly
/// split across several `write_chunk`/`write_header` calls and possibly out
/// of order with other requests.
pub trait ChannelClient: Send + Sync + 'static {
    fn request_chunk(
        &self,
        file_id: &FileId,
        index: usize,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<(), ChannelError>;
}

/// Error raised by the local content cache.
#[derive(Debug, Error)]
#[error("cache i/o error: {0}")]
pub struct CacheIoError(pub String);

/// One cached file header record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheHeader {
    pub id: u8,
    pub value: Vec<u8>,
}

/// Local content cache scoped to one file id.
///
/// The handle serializes its own storage access internally; reads deliver
/// through the sink with `cached = true` so they are not written back.
pub trait CacheHandle: Send + Sync + 'static {
    fn has_chunk(&self, index: usize) -> Result<bool, CacheIoError>;

    fn read_chunk(&self, index: usize, sink: &dyn ChunkSink) -> Result<(), CacheIoError>;

    fn write_chunk(&self, data: &[u8], index: usize) -> Result<(), CacheIoError>;

    fn all_headers(&self) -> Result<Vec<CacheHeader>, CacheIoError>;

    fn write_header(&self, id: u8, data: &[u8]) -> Result<(), CacheIoError>;
}
