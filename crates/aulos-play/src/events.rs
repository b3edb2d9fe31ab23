//! Handler lifecycle events on a broadcast bus.

use tokio::sync::broadcast;

use aulos_core::PlayableId;

/// Events a track handler reports to its listener.
///
/// `StartedLoading`, `FinishedLoading`, and `LoadingError` are published
/// from the command-worker thread; `EndOfTrack` and `PreloadNextTrack`
/// come from the decoder worker through the same bus.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PlayerEvent {
    StartedLoading,
    FinishedLoading { pos_ms: u32, play: bool },
    LoadingError { id: PlayableId, reason: String },
    EndOfTrack,
    PreloadNextTrack,
}

/// Broadcast bus carrying [`PlayerEvent`]s.
///
/// `publish()` is a sync call and safe from worker threads. Events are
/// silently dropped when nobody subscribes; slow subscribers observe
/// `Lagged` instead of blocking publishers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
