//! Chunk buffer: parallel payload/available/requested arrays with a
//! condvar-based wait discipline.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use aulos_core::CHUNK_SIZE;

use crate::{StorageError, StorageResult};

/// Transform applied to ciphertext before it is published.
///
/// `(index, input, output)` with `input.len() == output.len()`; the chunk
/// decryptor is injected here so the buffer itself stays cipher-agnostic
/// and the unencrypted CDN-episode path can skip decryption entirely.
pub type ChunkProcessor =
    Box<dyn Fn(usize, &[u8], &mut [u8]) -> Result<(), String> + Send + Sync>;

/// Number of chunks needed to cover `total_size` bytes.
pub fn chunks_for_size(total_size: u64) -> usize {
    total_size.div_ceil(CHUNK_SIZE as u64) as usize
}

/// Condvar polling interval; the cancellation token cannot wake a condvar,
/// so waits are bounded and the flags re-checked.
const WAIT_SLICE: Duration = Duration::from_millis(50);

struct State {
    payload: Vec<Bytes>,
    available: Vec<bool>,
    requested: Vec<bool>,
    failed: Option<Failure>,
}

#[derive(Clone, Debug)]
enum Failure {
    Stream(u16),
    Internal(String),
}

impl Failure {
    fn to_error(&self) -> StorageError {
        match self {
            Self::Stream(code) => StorageError::Stream(*code),
            Self::Internal(msg) => StorageError::Process(msg.clone()),
        }
    }
}

struct Inner {
    total_size: u64,
    chunks_total: usize,
    processor: Option<ChunkProcessor>,
    state: Mutex<State>,
    condvar: Condvar,
    cancel: CancellationToken,
}

/// Fixed-size buffer of decrypted chunks.
///
/// Clone is cheap; all clones refer to the same buffer. Writers publish a
/// whole chunk at a time under the mutex and wake every waiter; once a
/// reader has observed `available[i]`, `payload[i]` never changes again.
#[derive(Clone)]
pub struct ChunkBuffer {
    inner: Arc<Inner>,
}

impl ChunkBuffer {
    /// Allocate a buffer for a file of `total_size` decrypted bytes.
    ///
    /// The `cancel` token is the stream's close signal: cancelling it wakes
    /// all waiters with [`StorageError::Closed`] and turns subsequent
    /// writes into no-ops.
    pub fn new(
        total_size: u64,
        processor: Option<ChunkProcessor>,
        cancel: CancellationToken,
    ) -> Self {
        let chunks_total = chunks_for_size(total_size);
        Self {
            inner: Arc::new(Inner {
                total_size,
                chunks_total,
                processor,
                state: Mutex::new(State {
                    payload: vec![Bytes::new(); chunks_total],
                    available: vec![false; chunks_total],
                    requested: vec![false; chunks_total],
                    failed: None,
                }),
                condvar: Condvar::new(),
                cancel,
            }),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.inner.total_size
    }

    pub fn chunks_total(&self) -> usize {
        self.inner.chunks_total
    }

    /// Decrypted length of chunk `index`.
    ///
    /// Every chunk is `CHUNK_SIZE` bytes except the last, which carries the
    /// remainder; an exact multiple of `CHUNK_SIZE` gives a full final chunk.
    pub fn chunk_len(&self, index: usize) -> usize {
        let start = index as u64 * CHUNK_SIZE as u64;
        let remaining = self.inner.total_size.saturating_sub(start);
        remaining.min(CHUNK_SIZE as u64) as usize
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Publish one chunk of ciphertext.
    ///
    /// Verifies the exact chunk length, runs the processor, stores the
    /// plaintext, and wakes all waiters. Writes after close are silent
    /// no-ops (outstanding channel requests may still deliver). Length and
    /// processing failures abort the whole stream: waiters are woken with
    /// the failure and the error is returned to the producer.
    pub fn write_chunk(&self, index: usize, data: &[u8]) -> StorageResult<()> {
        if self.inner.cancel.is_cancelled() {
            trace!(index, "write after close dropped");
            return Ok(());
        }

        if index >= self.inner.chunks_total {
            return self.abort(StorageError::InvalidChunkIndex {
                index,
                chunks_total: self.inner.chunks_total,
            });
        }

        let expected = self.chunk_len(index);
        if data.len() != expected {
            return self.abort(StorageError::InvalidChunkSize {
                index,
                expected,
                got: data.len(),
            });
        }

        // Process outside the lock; decryption is stateless per chunk.
        let mut plain = vec![0u8; expected];
        match &self.inner.processor {
            Some(process) => {
                if let Err(msg) = process(index, data, &mut plain) {
                    return self.abort(StorageError::Process(msg));
                }
            }
            None => plain.copy_from_slice(data),
        }

        {
            let mut state = self.inner.state.lock();
            if self.inner.cancel.is_cancelled() {
                return Ok(());
            }
            if state.available[index] {
                // A cache read and a channel reply can race; first write wins.
                trace!(index, "duplicate chunk dropped");
                return Ok(());
            }
            state.payload[index] = Bytes::from(plain);
            state.available[index] = true;
            state.requested[index] = true;
        }
        self.inner.condvar.notify_all();

        trace!(index, chunks_total = self.inner.chunks_total, "chunk available");
        Ok(())
    }

    /// Block until chunk `index` is available.
    ///
    /// Returns [`StorageError::Closed`] if the stream is closed while
    /// waiting, the stream failure if one was reported, and
    /// [`StorageError::TimedOut`] once `timeout` elapses so the caller can
    /// re-issue the request.
    pub fn wait_chunk(&self, index: usize, timeout: Duration) -> StorageResult<()> {
        if index >= self.inner.chunks_total {
            return Err(StorageError::InvalidChunkIndex {
                index,
                chunks_total: self.inner.chunks_total,
            });
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(StorageError::Closed);
            }
            if let Some(ref failure) = state.failed {
                return Err(failure.to_error());
            }
            if state.available[index] {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StorageError::TimedOut { index, timeout });
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.inner.condvar.wait_for(&mut state, slice);
        }
    }

    /// Copy available bytes starting at `pos` into `buf`.
    ///
    /// Stops at the containing chunk's end and never crosses into a chunk
    /// that has not been published; returns 0 at end of file or when the
    /// containing chunk is still missing (callers wait first).
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> usize {
        if pos >= self.inner.total_size || buf.is_empty() {
            return 0;
        }

        let index = (pos / CHUNK_SIZE as u64) as usize;
        let offset = (pos % CHUNK_SIZE as u64) as usize;

        let state = self.inner.state.lock();
        if !state.available[index] {
            return 0;
        }
        let chunk = &state.payload[index];
        let n = buf.len().min(chunk.len() - offset);
        buf[..n].copy_from_slice(&chunk[offset..offset + n]);
        n
    }

    /// Flip the request flag for `index`, returning the previous value.
    ///
    /// The buffer records the flag; dispatching the actual request is the
    /// stream's job.
    pub fn mark_requested(&self, index: usize) -> bool {
        let mut state = self.inner.state.lock();
        std::mem::replace(&mut state.requested[index], true)
    }

    /// Clear the request flag so a timed-out chunk can be re-requested.
    pub fn clear_requested(&self, index: usize) {
        let mut state = self.inner.state.lock();
        if !state.available[index] {
            state.requested[index] = false;
        }
    }

    pub fn is_requested(&self, index: usize) -> bool {
        self.inner.state.lock().requested[index]
    }

    pub fn is_available(&self, index: usize) -> bool {
        self.inner.state.lock().available[index]
    }

    /// Record a stream-level error delivered by the channel and wake all
    /// waiters.
    pub fn fail(&self, code: u16) {
        warn!(code, "stream error reported");
        {
            let mut state = self.inner.state.lock();
            if state.failed.is_none() {
                state.failed = Some(Failure::Stream(code));
            }
        }
        self.inner.condvar.notify_all();
    }

    /// Close the buffer: wake all waiters with [`StorageError::Closed`] and
    /// drop any further writes. Idempotent.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.condvar.notify_all();
    }

    fn abort(&self, error: StorageError) -> StorageResult<()> {
        warn!(%error, "aborting stream");
        {
            let mut state = self.inner.state.lock();
            if state.failed.is_none() {
                state.failed = Some(Failure::Internal(error.to_string()));
            }
        }
        self.inner.condvar.notify_all();
        Err(error)
    }
}

impl std::fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        let ready = state.available.iter().filter(|a| **a).count();
        f.debug_struct("ChunkBuffer")
            .field("total_size", &self.inner.total_size)
            .field("chunks_total", &self.inner.chunks_total)
            .field("available", &ready)
            .field("closed", &self.inner.cancel.is_cancelled())
            .finish()
    }
}
