//! Consumed playback collaborators: the decoder worker, its factory, and
//! the device volume source.

use aulos_core::{AudioQuality, PlayableId};
use aulos_feed::{FeedResult, LoadedStream, StreamFeeder};

use crate::{error::PlayError, events::EventBus};

/// A running decoder: one playback thread pulling bytes from the loaded
/// stream. At most one exists per handler; replacing it is always preceded
/// by stopping the previous one.
///
/// Implementations publish `EndOfTrack` (exactly once) and
/// `PreloadNextTrack` on the bus they were spawned with.
pub trait DecoderWorker: Send + 'static {
    fn play(&self);

    fn pause(&self);

    fn seek_ms(&self, pos_ms: u32);

    /// Stop playback and release the thread. Idempotent.
    fn stop(&self);

    /// Current playback position in milliseconds.
    fn time_ms(&self) -> u32;
}

/// Builds a decoder worker around a freshly loaded stream.
///
/// The factory owns decoder-thread lifecycle; the handler only holds the
/// returned control surface.
pub trait DecoderFactory: Send + Sync + 'static {
    type Worker: DecoderWorker;

    fn spawn(&self, stream: LoadedStream, events: EventBus) -> Result<Self::Worker, PlayError>;
}

/// Device volume, owned by the session's device state.
pub trait VolumeSource: Send + Sync + 'static {
    fn volume(&self) -> u16;
}

/// Load capability the handler drives; [`StreamFeeder`] is the production
/// implementation.
pub trait StreamLoader: Send + Sync + 'static {
    fn load(
        &self,
        id: PlayableId,
        quality: AudioQuality,
        use_cdn: bool,
    ) -> FeedResult<LoadedStream>;
}

impl StreamLoader for StreamFeeder {
    fn load(
        &self,
        id: PlayableId,
        quality: AudioQuality,
        use_cdn: bool,
    ) -> FeedResult<LoadedStream> {
        StreamFeeder::load(self, id, quality, use_cdn)
    }
}
