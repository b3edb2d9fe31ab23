#![forbid(unsafe_code)]

//! `aulos-storage`
//!
//! The chunk buffer: a fixed-size array of decrypted chunks with per-chunk
//! availability and request flags.
//!
//! Producers (channel dispatcher, cache reads) publish ciphertext through
//! [`ChunkBuffer::write_chunk`]; a blocking reader waits for individual
//! chunks with [`ChunkBuffer::wait_chunk`]. Coordination is a single
//! buffer-wide mutex plus condvar; close propagates through a
//! `CancellationToken` so in-flight writes for a dead stream degrade to
//! no-ops.

mod buffer;
mod error;

pub use buffer::{ChunkBuffer, ChunkProcessor, chunks_for_size};
pub use error::{StorageError, StorageResult};
