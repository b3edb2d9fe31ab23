//! Consumed RPC surfaces: metadata, audio keys, CDN, and the per-file
//! cache provider.

use std::sync::Arc;

use thiserror::Error;
use url::Url;

use aulos_core::{EpisodeId, FileId, GID_LEN, TrackId};
use aulos_stream::CacheHandle;

use crate::metadata::{Episode, Track};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found")]
    NotFound,

    #[error("rpc failed: {0}")]
    Rpc(String),
}

/// Synchronous metadata RPC.
pub trait MetadataClient: Send + Sync + 'static {
    fn track(&self, id: &TrackId) -> Result<Track, MetadataError>;

    fn episode(&self, id: &EpisodeId) -> Result<Episode, MetadataError>;
}

#[derive(Debug, Error)]
pub enum AudioKeyError {
    #[error("no key for file")]
    Missing,

    #[error("rpc failed: {0}")]
    Rpc(String),
}

/// Audio-key RPC: 16-byte AES file key for a `(playable, file)` pair.
pub trait AudioKeyProvider: Send + Sync + 'static {
    fn key(&self, gid: &[u8; GID_LEN], file_id: &FileId) -> Result<[u8; 16], AudioKeyError>;
}

/// Per-file-id view onto the local content cache.
pub trait CacheProvider: Send + Sync + 'static {
    fn handle_for(&self, file_id: &FileId) -> Option<Arc<dyn CacheHandle>>;
}

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("http status {0}")]
    Http(u16),

    #[error("request failed: {0}")]
    Io(String),
}

/// Result of a HEAD request against a CDN URL.
#[derive(Clone, Debug)]
pub struct CdnHead {
    pub status: u16,
    pub content_length: Option<u64>,
    /// URL after redirects; subsequent range requests go here.
    pub url: Url,
}

/// Blocking HTTPS client for CDN-hosted audio.
///
/// Implementations own connection pooling, TLS, and redirect handling;
/// the core only issues HEAD-then-ranged-GET sequences through this
/// surface.
pub trait CdnClient: Send + Sync + 'static {
    /// Resolve the CDN location of a service-hosted audio file.
    fn resolve_audio_url(&self, file_id: &FileId) -> Result<Url, CdnError>;

    fn head(&self, url: &Url) -> Result<CdnHead, CdnError>;

    /// Fetch `len` bytes starting at `offset`.
    fn fetch_range(&self, url: &Url, offset: u64, len: usize) -> Result<Vec<u8>, CdnError>;
}
