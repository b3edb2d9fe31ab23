//! Playable and file identifiers.
//!
//! A playable (track or episode) is identified by an opaque 16-byte gid.
//! The service also renders gids in a 22-character base-62 form; both are
//! supported here. Equality is on gid bytes only.

use std::fmt;

use crate::{CoreError, CoreResult};

/// Length of a playable gid in bytes.
pub const GID_LEN: usize = 16;

/// Length of an audio file id in bytes.
pub const FILE_ID_LEN: usize = 20;

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE62_LEN: usize = 22;

fn gid_from_base62(s: &str) -> CoreResult<[u8; GID_LEN]> {
    let mut value: u128 = 0;
    for c in s.bytes() {
        let digit = BASE62_ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or_else(|| CoreError::InvalidBase62(s.to_string()))?;
        value = value
            .checked_mul(62)
            .and_then(|v| v.checked_add(digit as u128))
            .ok_or_else(|| CoreError::InvalidBase62(s.to_string()))?;
    }
    Ok(value.to_be_bytes())
}

fn gid_to_base62(gid: &[u8; GID_LEN]) -> String {
    let mut value = u128::from_be_bytes(*gid);
    let mut out = [b'0'; BASE62_LEN];
    for slot in out.iter_mut().rev() {
        *slot = BASE62_ALPHABET[(value % 62) as usize];
        value /= 62;
    }
    // 62^22 > 2^128, so 22 digits always suffice.
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_hex<const N: usize>(s: &str) -> CoreResult<[u8; N]> {
    if s.len() != N * 2 {
        return Err(CoreError::InvalidHex(s.to_string()));
    }
    let mut out = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
        let hi = (chunk[0] as char)
            .to_digit(16)
            .ok_or_else(|| CoreError::InvalidHex(s.to_string()))?;
        let lo = (chunk[1] as char)
            .to_digit(16)
            .ok_or_else(|| CoreError::InvalidHex(s.to_string()))?;
        out[i] = ((hi << 4) | lo) as u8;
    }
    Ok(out)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

macro_rules! gid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; GID_LEN]);

        impl $name {
            pub fn from_gid(gid: [u8; GID_LEN]) -> Self {
                Self(gid)
            }

            pub fn from_base62(s: &str) -> CoreResult<Self> {
                Ok(Self(gid_from_base62(s)?))
            }

            pub fn from_hex(s: &str) -> CoreResult<Self> {
                Ok(Self(parse_hex::<GID_LEN>(s)?))
            }

            pub fn gid(&self) -> &[u8; GID_LEN] {
                &self.0
            }

            pub fn to_base62(&self) -> String {
                gid_to_base62(&self.0)
            }

            pub fn to_hex(&self) -> String {
                to_hex(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }
    };
}

gid_id!(TrackId, "Identifier of a track.");
gid_id!(EpisodeId, "Identifier of a podcast episode.");

/// A playable: track or episode. The feeder branches on the variant to pick
/// the metadata RPC and the delivery path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayableId {
    Track(TrackId),
    Episode(EpisodeId),
}

impl PlayableId {
    pub fn gid(&self) -> &[u8; GID_LEN] {
        match self {
            Self::Track(id) => id.gid(),
            Self::Episode(id) => id.gid(),
        }
    }

    pub fn to_base62(&self) -> String {
        gid_to_base62(self.gid())
    }

    pub fn to_hex(&self) -> String {
        to_hex(self.gid())
    }
}

impl From<TrackId> for PlayableId {
    fn from(id: TrackId) -> Self {
        Self::Track(id)
    }
}

impl From<EpisodeId> for PlayableId {
    fn from(id: EpisodeId) -> Self {
        Self::Episode(id)
    }
}

/// Identifier of one encoded audio file belonging to a playable.
///
/// Rendered as lowercase hex in logs and cache keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; FILE_ID_LEN]);

impl FileId {
    pub fn from_bytes(bytes: [u8; FILE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> CoreResult<Self> {
        Ok(Self(parse_hex::<FILE_ID_LEN>(s)?))
    }

    pub fn as_bytes(&self) -> &[u8; FILE_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.to_hex())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
