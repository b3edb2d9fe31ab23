//! Chunk fetch policy: cache first, channel fallback, best-effort
//! write-back.

use std::sync::Arc;

use tracing::{trace, warn};

use aulos_core::FileId;
use aulos_storage::ChunkBuffer;

use crate::traits::{CacheHandle, ChannelClient, ChunkSink};

/// Something that can obtain one chunk and deliver it to the stream's sink.
///
/// The stream only decides *when* a chunk is needed; transports (control
/// channel, CDN ranges) implement the *how* behind this trait.
pub trait ChunkSource: Send + Sync + 'static {
    fn request_chunk(&self, index: usize);
}

/// Buffer-backed [`ChunkSink`].
///
/// Channel deliveries (`cached = false`) are written back to the cache on a
/// best-effort basis before landing in the buffer; cache failures are
/// logged and swallowed, the audio path never depends on them.
pub struct BufferSink {
    buffer: ChunkBuffer,
    cache: Option<Arc<dyn CacheHandle>>,
}

impl BufferSink {
    pub fn new(buffer: ChunkBuffer, cache: Option<Arc<dyn CacheHandle>>) -> Self {
        Self { buffer, cache }
    }
}

impl ChunkSink for BufferSink {
    fn write_chunk(&self, index: usize, data: &[u8], cached: bool) {
        if !cached
            && let Some(cache) = &self.cache
            && let Err(err) = cache.write_chunk(data, index)
        {
            warn!(index, %err, "cache write-back failed");
        }

        if let Err(err) = self.buffer.write_chunk(index, data) {
            warn!(index, %err, "dropping undeliverable chunk");
        }
    }

    fn write_header(&self, id: u8, _data: &[u8], _cached: bool) {
        // Headers only matter while the stream is being opened; the header
        // fetch sink consumes them there.
        trace!(id, "header after open ignored");
    }

    fn stream_error(&self, code: u16) {
        self.buffer.fail(code);
    }
}

/// Channel-backed chunk source with cache-first policy.
pub struct ChannelChunkSource {
    file_id: FileId,
    channel: Arc<dyn ChannelClient>,
    cache: Option<Arc<dyn CacheHandle>>,
    sink: Arc<dyn ChunkSink>,
}

impl ChannelChunkSource {
    pub fn new(
        file_id: FileId,
        channel: Arc<dyn ChannelClient>,
        cache: Option<Arc<dyn CacheHandle>>,
        sink: Arc<dyn ChunkSink>,
    ) -> Self {
        Self {
            file_id,
            channel,
            cache,
            sink,
        }
    }

    /// Serve `index` from the cache if present.
    fn try_cache(&self, index: usize) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };

        match cache.has_chunk(index) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                warn!(index, %err, "cache lookup failed, using channel");
                return false;
            }
        }

        match cache.read_chunk(index, self.sink.as_ref()) {
            Ok(()) => {
                trace!(index, file_id = %self.file_id, "chunk served from cache");
                true
            }
            Err(err) => {
                warn!(index, %err, "cache read failed, using channel");
                false
            }
        }
    }
}

impl ChunkSource for ChannelChunkSource {
    fn request_chunk(&self, index: usize) {
        if self.try_cache(index) {
            return;
        }

        trace!(index, file_id = %self.file_id, "requesting chunk on channel");
        if let Err(err) = self
            .channel
            .request_chunk(&self.file_id, index, Arc::clone(&self.sink))
        {
            warn!(index, %err, "channel request failed");
            self.sink.stream_error(u16::MAX);
        }
    }
}
