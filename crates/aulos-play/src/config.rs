use aulos_core::AudioQuality;
use aulos_stream::StreamConfig;

/// Player-level configuration shared by every load on a handler.
#[derive(Clone, Debug, Default)]
pub struct PlayerConfig {
    /// Quality preference handed to the feeder's file selection.
    pub preferred_quality: AudioQuality,
    /// Route externally-hosted playables through the CDN path.
    pub use_cdn: bool,
    /// Per-stream tuning (chunk timeout, prefetch window).
    pub stream: StreamConfig,
}

impl PlayerConfig {
    #[must_use]
    pub fn with_preferred_quality(mut self, quality: AudioQuality) -> Self {
        self.preferred_quality = quality;
        self
    }

    #[must_use]
    pub fn with_use_cdn(mut self, use_cdn: bool) -> Self {
        self.use_cdn = use_cdn;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}
