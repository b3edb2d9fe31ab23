//! Seekable, forward-biased byte stream over the chunk buffer.

use std::{
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};

use tracing::{debug, trace, warn};

use aulos_core::CHUNK_SIZE;
use aulos_storage::{ChunkBuffer, StorageError};

use crate::{
    config::StreamConfig,
    error::{StreamError, StreamResult},
    fetch::ChunkSource,
};

/// Handle that can close a [`ChunkedStream`] from another thread.
///
/// The stream itself is owned by whoever reads it (typically the decoder
/// worker); the track handler keeps one of these for teardown.
#[derive(Clone, Debug)]
pub struct StreamShutdown {
    buffer: ChunkBuffer,
}

impl StreamShutdown {
    pub fn close(&self) {
        self.buffer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}

/// Blocking byte reader over a partially-populated chunk buffer.
///
/// Reads trigger requests for the chunk they land in plus a prefetch
/// window, then block until the chunk is delivered. Seeks are non-blocking
/// and clamp to the file bounds. Chunks may arrive in any order; a read
/// never returns bytes past the first missing chunk at the read position.
pub struct ChunkedStream {
    buffer: ChunkBuffer,
    source: Arc<dyn ChunkSource>,
    config: StreamConfig,
    pos: u64,
}

impl ChunkedStream {
    /// Wrap an allocated buffer and its chunk source.
    ///
    /// Requests chunk 0 (plus the prefetch window) immediately so the first
    /// read has data on the way.
    pub fn open(buffer: ChunkBuffer, source: Arc<dyn ChunkSource>, config: StreamConfig) -> Self {
        let stream = Self {
            buffer,
            source,
            config,
            pos: 0,
        };
        if stream.buffer.chunks_total() > 0 {
            stream.request_window(0);
        }
        stream
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total decrypted size in bytes.
    pub fn len(&self) -> u64 {
        self.buffer.total_size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.total_size() == 0
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub fn shutdown_handle(&self) -> StreamShutdown {
        StreamShutdown {
            buffer: self.buffer.clone(),
        }
    }

    /// Close the stream, waking any blocked reader. Idempotent.
    pub fn close(&self) {
        self.buffer.close();
    }

    /// Read decrypted bytes at the current position.
    ///
    /// Returns `Ok(0)` at end of stream. Blocks while the containing chunk
    /// is missing; a timed-out wait re-issues the request once before
    /// failing with [`StreamError::ChunkTimeout`].
    pub fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        if buf.is_empty() || self.pos >= self.buffer.total_size() {
            return Ok(0);
        }
        if self.buffer.is_closed() {
            return Err(StreamError::Closed);
        }

        let index = (self.pos / CHUNK_SIZE as u64) as usize;
        self.request_window(index);

        match self.buffer.wait_chunk(index, self.config.chunk_timeout) {
            Ok(()) => {}
            Err(StorageError::TimedOut { .. }) => {
                warn!(index, "chunk wait timed out, re-requesting");
                self.buffer.clear_requested(index);
                self.request_chunk(index);
                match self.buffer.wait_chunk(index, self.config.chunk_timeout) {
                    Ok(()) => {}
                    Err(StorageError::TimedOut { .. }) => {
                        return Err(StreamError::ChunkTimeout(index));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        }

        let n = self.buffer.read_into(self.pos, buf);
        self.pos += n as u64;
        trace!(bytes = n, pos = self.pos, "read");
        Ok(n)
    }

    /// Move the read position, clamped to `0..=len`.
    ///
    /// Never blocks; makes sure the target chunk and the prefetch window
    /// are requested so a following read finds data underway.
    pub fn seek_to(&mut self, pos: u64) -> u64 {
        self.pos = pos.min(self.buffer.total_size());
        if self.pos < self.buffer.total_size() {
            let index = (self.pos / CHUNK_SIZE as u64) as usize;
            self.request_window(index);
        }
        debug!(pos = self.pos, "seek");
        self.pos
    }

    /// Discard `n` bytes: a forward seek.
    pub fn skip(&mut self, n: u64) -> u64 {
        self.seek_to(self.pos.saturating_add(n))
    }

    /// Make sure `index` and the prefetch window behind it are requested.
    fn request_window(&self, index: usize) {
        let last = self
            .buffer
            .chunks_total()
            .min(index + 1 + self.config.prefetch_ahead);
        for i in index..last {
            if !self.buffer.mark_requested(i) {
                self.request_chunk(i);
            }
        }
    }

    /// Dispatch one fetch on the shared request pool.
    fn request_chunk(&self, index: usize) {
        self.buffer.mark_requested(index);
        let source = Arc::clone(&self.source);
        rayon::spawn(move || source.request_chunk(index));
    }
}

impl Read for ChunkedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        ChunkedStream::read(self, buf).map_err(|err| match err {
            StreamError::Closed => {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, err.to_string())
            }
            StreamError::ChunkTimeout(_) => {
                std::io::Error::new(std::io::ErrorKind::TimedOut, err.to_string())
            }
            other => std::io::Error::other(other.to_string()),
        })
    }
}

impl Seek for ChunkedStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(delta) => (self.pos as i128).saturating_add(delta as i128),
            SeekFrom::End(delta) => {
                (self.buffer.total_size() as i128).saturating_add(delta as i128)
            }
        };

        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "negative seek position",
            ));
        }

        Ok(self.seek_to(target as u64))
    }
}

impl std::fmt::Debug for ChunkedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedStream")
            .field("pos", &self.pos)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}
