#![forbid(unsafe_code)]

//! `aulos-core`
//!
//! Shared primitives for Aulos: playable identifiers (tracks, episodes),
//! audio file identifiers, and format/quality types used by the feeder's
//! selection policy.

mod error;
mod format;
mod ids;

pub use error::{CoreError, CoreResult};
pub use format::{AudioFormat, AudioQuality};
pub use ids::{EpisodeId, FileId, PlayableId, TrackId, FILE_ID_LEN, GID_LEN};

/// Size of one audio chunk: the unit of fetch, decrypt, and cache.
pub const CHUNK_SIZE: usize = 128 * 1024;
