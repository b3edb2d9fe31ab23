//! Audio formats advertised by track metadata and the quality preference
//! used to pick among them.

/// Encoded format of one audio file entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    OggVorbis96,
    OggVorbis160,
    OggVorbis320,
    Mp3_96,
    Mp3_160,
    Mp3_256,
    Mp3_320,
}

impl AudioFormat {
    /// True for the Vorbis family, the only formats the default feeder
    /// policy accepts.
    pub fn is_vorbis(self) -> bool {
        matches!(
            self,
            Self::OggVorbis96 | Self::OggVorbis160 | Self::OggVorbis320
        )
    }

    pub fn bitrate_kbps(self) -> u32 {
        match self {
            Self::OggVorbis96 | Self::Mp3_96 => 96,
            Self::OggVorbis160 | Self::Mp3_160 => 160,
            Self::Mp3_256 => 256,
            Self::OggVorbis320 | Self::Mp3_320 => 320,
        }
    }
}

/// Configured playback quality preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioQuality {
    Normal,
    #[default]
    High,
    VeryHigh,
}

impl AudioQuality {
    pub fn bitrate_kbps(self) -> u32 {
        match self {
            Self::Normal => 96,
            Self::High => 160,
            Self::VeryHigh => 320,
        }
    }

    /// Whether `format` is the exact match for this preference.
    pub fn matches(self, format: AudioFormat) -> bool {
        format.bitrate_kbps() == self.bitrate_kbps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vorbis_family() {
        assert!(AudioFormat::OggVorbis160.is_vorbis());
        assert!(!AudioFormat::Mp3_320.is_vorbis());
    }

    #[test]
    fn quality_matches_bitrate() {
        assert!(AudioQuality::High.matches(AudioFormat::OggVorbis160));
        assert!(AudioQuality::High.matches(AudioFormat::Mp3_160));
        assert!(!AudioQuality::VeryHigh.matches(AudioFormat::OggVorbis160));
    }
}
