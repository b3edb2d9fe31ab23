#![forbid(unsafe_code)]

//! `aulos-stream`
//!
//! Chunk fetching and the seekable byte stream the decoder reads from.
//!
//! - [`ChunkSink`] is the delivery side: channel dispatcher and cache reads
//!   both land chunks through it.
//! - [`ChannelClient`] / [`CacheHandle`] are the consumed capabilities of
//!   the surrounding session (control channel, local cache).
//! - [`ChannelChunkSource`] implements the cache-first fetch policy with
//!   best-effort write-back.
//! - [`ChunkedStream`] is a forward-biased `Read + Seek` over the chunk
//!   buffer: it triggers prefetch on reads and seeks, and blocks until the
//!   needed chunk is delivered or the stream dies.

mod config;
mod error;
mod fetch;
mod stream;
mod traits;

pub use config::StreamConfig;
pub use error::{StreamError, StreamResult};
pub use fetch::{BufferSink, ChannelChunkSource, ChunkSource};
pub use stream::{ChunkedStream, StreamShutdown};
pub use traits::{CacheHandle, CacheHeader, CacheIoError, ChannelClient, ChannelError, ChunkSink};
