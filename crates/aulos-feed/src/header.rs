//! File header records and the blocking header fetch used at stream open.
//!
//! The first channel response for a file carries a block of header records
//! ahead of any chunk body bytes. Header id `0x3` holds the file size as a
//! big-endian `u32` count of 4-byte words; everything else is opaque to
//! the core but cached for the next open.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use aulos_stream::{CacheHandle, CacheHeader, ChunkSink};

use crate::error::{FeedError, FeedResult};

/// Header record id carrying the file size.
pub const HEADER_SIZE_ID: u8 = 0x3;

/// Condvar polling slice while waiting for headers.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// One parsed header record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderRecord {
    pub id: u8,
    pub value: Vec<u8>,
}

/// Parse a wire header block: `(id: u8, len: u16 BE, payload)` records,
/// terminated by a zero-length record.
///
/// Returns the records and the offset of the first body byte, so callers
/// can hand header bytes and chunk bytes to their separate consumers
/// without overlap.
pub fn parse_header_records(data: &[u8]) -> FeedResult<(Vec<HeaderRecord>, usize)> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    loop {
        if data.len() < offset + 3 {
            return Err(FeedError::MissingHeaders);
        }
        let id = data[offset];
        let len = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
        offset += 3;

        if len == 0 {
            return Ok((records, offset));
        }
        if data.len() < offset + len {
            return Err(FeedError::MissingHeaders);
        }
        records.push(HeaderRecord {
            id,
            value: data[offset..offset + len].to_vec(),
        });
        offset += len;
    }
}

struct FetchState {
    size: Option<u64>,
    error: Option<u16>,
    headers: Vec<HeaderRecord>,
}

/// Blocking sink that resolves the file size from header records.
///
/// Fed either by replaying cached headers or by a chunk-0 channel request;
/// chunk body bytes delivered alongside the headers are discarded here,
/// the stream requests them again through its own sink.
pub struct HeaderFetch {
    cache: Option<Arc<dyn CacheHandle>>,
    state: Mutex<FetchState>,
    condvar: Condvar,
}

impl HeaderFetch {
    pub fn new(cache: Option<Arc<dyn CacheHandle>>) -> Self {
        Self {
            cache,
            state: Mutex::new(FetchState {
                size: None,
                error: None,
                headers: Vec::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// Feed previously cached headers.
    pub fn replay_cached(&self, headers: Vec<CacheHeader>) {
        for header in headers {
            self.write_header(header.id, &header.value, true);
        }
    }

    /// Block until the size header arrives.
    pub fn wait_size(&self, timeout: Duration) -> FeedResult<u64> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(code) = state.error {
                return Err(FeedError::Stream(aulos_stream::StreamError::Stream(code)));
            }
            if let Some(size) = state.size {
                return Ok(size);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(FeedError::MissingHeaders);
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.condvar.wait_for(&mut state, slice);
        }
    }

    pub fn headers(&self) -> Vec<HeaderRecord> {
        self.state.lock().headers.clone()
    }
}

impl ChunkSink for HeaderFetch {
    fn write_chunk(&self, index: usize, _data: &[u8], _cached: bool) {
        // Only the headers matter at open time; the body of chunk 0 is
        // requested again by the stream once the buffer exists.
        debug!(index, "header fetch ignoring chunk body");
    }

    fn write_header(&self, id: u8, data: &[u8], cached: bool) {
        if !cached
            && let Some(cache) = &self.cache
            && let Err(err) = cache.write_header(id, data)
        {
            warn!(id, %err, "header cache write-back failed");
        }

        {
            let mut state = self.state.lock();
            if id == HEADER_SIZE_ID && data.len() >= 4 {
                let words = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                state.size = Some(u64::from(words) * 4);
            }
            state.headers.push(HeaderRecord {
                id,
                value: data.to_vec(),
            });
        }
        self.condvar.notify_all();
    }

    fn stream_error(&self, code: u16) {
        {
            let mut state = self.state.lock();
            state.error = Some(code);
        }
        self.condvar.notify_all();
    }
}
