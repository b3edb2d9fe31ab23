//! Loudness-normalization block read from the head of the decrypted stream.

use std::io::{Read, Seek, SeekFrom};

use tracing::trace;

/// Length of the preamble preceding the OGG container's first page.
pub const PREAMBLE_LEN: u64 = 0xA7;

/// Offset of the normalization floats within the preamble.
const NORMALIZATION_OFFSET: u64 = 144;

/// Four little-endian IEEE-754 floats the decoder's gain stage consumes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizationData {
    pub track_gain_db: f32,
    pub track_peak: f32,
    pub album_gain_db: f32,
    pub album_peak: f32,
}

impl NormalizationData {
    /// Read the block from a stream positioned at the start of the file,
    /// restoring that position afterwards. This is the CDN track path's
    /// order: normalization first, then the caller skips the preamble.
    pub fn read<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let start = reader.stream_position()?;
        Self::read_block(reader, start + NORMALIZATION_OFFSET, start)
    }

    /// Read the block from a stream that has already skipped the preamble,
    /// reaching back to the floats inside it and restoring the
    /// post-preamble position. This is the channel path's order: the skip
    /// happens first.
    pub fn read_behind_preamble<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let pos = reader.stream_position()?;
        let preamble_start = pos.checked_sub(PREAMBLE_LEN).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "stream has not skipped the preamble",
            )
        })?;
        Self::read_block(reader, preamble_start + NORMALIZATION_OFFSET, pos)
    }

    fn read_block<R: Read + Seek>(
        reader: &mut R,
        block_start: u64,
        restore_to: u64,
    ) -> std::io::Result<Self> {
        reader.seek(SeekFrom::Start(block_start))?;

        let mut block = [0u8; 16];
        reader.read_exact(&mut block)?;
        reader.seek(SeekFrom::Start(restore_to))?;

        let data = Self::from_bytes(&block);
        trace!(
            track_gain_db = data.track_gain_db,
            album_gain_db = data.album_gain_db,
            "normalization data read"
        );
        Ok(data)
    }

    pub fn from_bytes(block: &[u8; 16]) -> Self {
        let f = |i: usize| {
            f32::from_le_bytes([block[i], block[i + 1], block[i + 2], block[i + 3]])
        };
        Self {
            track_gain_db: f(0),
            track_peak: f(4),
            album_gain_db: f(8),
            album_peak: f(12),
        }
    }

    /// Serialize back to the wire layout (fixtures and cache tooling).
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.track_gain_db.to_le_bytes());
        out[4..8].copy_from_slice(&self.track_peak.to_le_bytes());
        out[8..12].copy_from_slice(&self.album_gain_db.to_le_bytes());
        out[12..16].copy_from_slice(&self.album_peak.to_le_bytes());
        out
    }
}
