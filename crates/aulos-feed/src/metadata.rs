//! Metadata model consumed from the metadata RPC.
//!
//! These mirror the service's protobuf messages at the surface the core
//! needs: identity, duration, and the list of encoded audio files.

use url::Url;

use aulos_core::{AudioFormat, EpisodeId, FileId, GID_LEN, TrackId};

/// One encoded rendition of a playable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFileEntry {
    pub id: FileId,
    pub format: AudioFormat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u32,
    pub files: Vec<AudioFileEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Episode {
    pub id: EpisodeId,
    pub name: String,
    pub duration_ms: u32,
    /// HTTPS location of the externally-hosted file, when the service
    /// exposes one. Drives the CDN path.
    pub external_url: Option<Url>,
    pub files: Vec<AudioFileEntry>,
}

/// Resolved metadata of whatever a handler is playing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Playable {
    Track(Track),
    Episode(Episode),
}

impl Playable {
    pub fn gid(&self) -> &[u8; GID_LEN] {
        match self {
            Self::Track(t) => t.id.gid(),
            Self::Episode(e) => e.id.gid(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Track(t) => &t.name,
            Self::Episode(e) => &e.name,
        }
    }

    pub fn duration_ms(&self) -> u32 {
        match self {
            Self::Track(t) => t.duration_ms,
            Self::Episode(e) => e.duration_ms,
        }
    }
}
