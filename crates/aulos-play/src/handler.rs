//! Track handler: one command queue, one worker thread, one decoder.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use aulos_core::PlayableId;
use aulos_feed::{Playable, Track};
use aulos_stream::StreamShutdown;

use crate::{
    config::PlayerConfig,
    decoder::{DecoderFactory, DecoderWorker, StreamLoader, VolumeSource},
    error::{PlayError, PlayResult},
    events::{EventBus, PlayerEvent},
};

/// Commands accepted by the handler, serialized in FIFO order.
#[derive(Clone, Debug)]
pub enum Command {
    Load {
        id: PlayableId,
        play: bool,
        start_pos_ms: u32,
    },
    Play,
    Pause,
    Seek {
        pos_ms: u32,
    },
    Stop,
    Terminate,
}

/// Lifecycle of a handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandlerState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
}

struct CurrentStream {
    metadata: Playable,
    shutdown: StreamShutdown,
}

struct Shared<F: DecoderFactory> {
    loader: Arc<dyn StreamLoader>,
    factory: F,
    volume: Arc<dyn VolumeSource>,
    config: PlayerConfig,
    events: EventBus,
    commands: kanal::Sender<Command>,
    stopped: AtomicBool,
    state: Mutex<HandlerState>,
    decoder: Mutex<Option<F::Worker>>,
    current: Mutex<Option<CurrentStream>>,
}

impl<F: DecoderFactory> Shared<F> {
    fn set_state(&self, state: HandlerState) {
        *self.state.lock() = state;
    }

    fn run(&self, rx: &kanal::Receiver<Command>) {
        while let Ok(command) = rx.recv() {
            debug!(?command, "handling command");
            match command {
                Command::Load {
                    id,
                    play,
                    start_pos_ms,
                } => self.handle_load(id, play, start_pos_ms),
                Command::Play => {
                    if let Some(decoder) = self.decoder.lock().as_ref() {
                        decoder.play();
                        self.set_state(HandlerState::Playing);
                    }
                }
                Command::Pause => {
                    if let Some(decoder) = self.decoder.lock().as_ref() {
                        decoder.pause();
                        self.set_state(HandlerState::Paused);
                    }
                }
                Command::Seek { pos_ms } => {
                    if let Some(decoder) = self.decoder.lock().as_ref() {
                        decoder.seek_ms(pos_ms);
                    }
                }
                Command::Stop => self.shutdown(),
                Command::Terminate => break,
            }
        }
        debug!("command worker exited");
    }

    fn handle_load(&self, id: PlayableId, play: bool, start_pos_ms: u32) {
        self.set_state(HandlerState::Loading);
        self.events.publish(PlayerEvent::StartedLoading);

        let loaded = match self.loader.load(
            id,
            self.config.preferred_quality,
            self.config.use_cdn,
        ) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(gid = %id.to_hex(), %err, "load failed");
                self.events.publish(PlayerEvent::LoadingError {
                    id,
                    reason: err.to_string(),
                });
                self.set_state(HandlerState::Idle);
                return;
            }
        };

        if self.stopped.load(Ordering::Acquire) {
            // Closed while the feeder was working: tear down silently, no
            // completion event.
            loaded.stream.close();
            return;
        }

        info!(
            name = %loaded.metadata.name(),
            gid = %id.to_hex(),
            len = loaded.stream.len(),
            "stream loaded"
        );

        // Replace any previous stream and decoder before wiring the new one.
        if let Some(old) = self.decoder.lock().take() {
            old.stop();
        }
        if let Some(old) = self.current.lock().take() {
            old.shutdown.close();
        }

        let metadata = loaded.metadata.clone();
        let shutdown = loaded.shutdown_handle();
        let worker = match self.factory.spawn(loaded, self.events.clone()) {
            Ok(worker) => worker,
            Err(err) => {
                shutdown.close();
                self.events.publish(PlayerEvent::LoadingError {
                    id,
                    reason: err.to_string(),
                });
                self.set_state(HandlerState::Idle);
                return;
            }
        };

        if self.stopped.load(Ordering::Acquire) {
            worker.stop();
            shutdown.close();
            return;
        }

        worker.seek_ms(start_pos_ms);
        *self.decoder.lock() = Some(worker);
        *self.current.lock() = Some(CurrentStream { metadata, shutdown });

        self.set_state(HandlerState::Ready);
        self.events
            .publish(PlayerEvent::FinishedLoading {
                pos_ms: start_pos_ms,
                play,
            });

        if play
            && let Some(decoder) = self.decoder.lock().as_ref()
        {
            decoder.play();
            self.set_state(HandlerState::Playing);
        }

        // A close that raced the hand-off above may have drained nothing;
        // it set `stopped` first, so a final check here always catches it.
        if self.stopped.load(Ordering::Acquire) {
            if let Some(worker) = self.decoder.lock().take() {
                worker.stop();
            }
            if let Some(current) = self.current.lock().take() {
                current.shutdown.close();
            }
        }
    }

    /// Stop everything and let the worker drain out on `Terminate`.
    /// Idempotent; callable from the worker (Stop command) and from
    /// [`TrackHandler::close`].
    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(decoder) = self.decoder.lock().take() {
            decoder.stop();
        }
        if let Some(current) = self.current.lock().take() {
            current.shutdown.close();
        }
        self.set_state(HandlerState::Stopped);
        let _ = self.commands.send(Command::Terminate);
    }
}

/// Time/volume surface exposed to the outer player.
pub struct HandlerController<F: DecoderFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: DecoderFactory> HandlerController<F> {
    /// Playback position of the live decoder, if one exists.
    pub fn time_ms(&self) -> Option<u32> {
        self.shared.decoder.lock().as_ref().map(DecoderWorker::time_ms)
    }

    pub fn volume(&self) -> u16 {
        self.shared.volume.volume()
    }
}

/// One playing or preloading track.
///
/// All mutation goes through the command queue; accessors read shared
/// snapshots. The worker thread is started explicitly with
/// [`TrackHandler::start`] and exits on `Terminate`.
pub struct TrackHandler<F: DecoderFactory> {
    shared: Arc<Shared<F>>,
    receiver: Mutex<Option<kanal::Receiver<Command>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl<F: DecoderFactory> TrackHandler<F> {
    pub fn new(
        loader: Arc<dyn StreamLoader>,
        factory: F,
        volume: Arc<dyn VolumeSource>,
        config: PlayerConfig,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            shared: Arc::new(Shared {
                loader,
                factory,
                volume,
                config,
                events,
                commands: tx,
                stopped: AtomicBool::new(false),
                state: Mutex::new(HandlerState::Idle),
                decoder: Mutex::new(None),
                current: Mutex::new(None),
            }),
            receiver: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        }
    }

    /// Start the command worker thread.
    pub fn start(&self) -> PlayResult<()> {
        let Some(rx) = self.receiver.lock().take() else {
            return Err(PlayError::AlreadyStarted);
        };

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("track-handler".into())
            .spawn(move || shared.run(&rx))
            .map_err(|err| PlayError::Decoder {
                reason: format!("worker spawn failed: {err}"),
            })?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn send(&self, command: Command) -> PlayResult<()> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(PlayError::HandlerStopped);
        }
        self.shared
            .commands
            .send(command)
            .map_err(|_| PlayError::HandlerStopped)
    }

    pub fn send_load(&self, id: PlayableId, play: bool, start_pos_ms: u32) -> PlayResult<()> {
        self.send(Command::Load {
            id,
            play,
            start_pos_ms,
        })
    }

    pub fn send_play(&self) -> PlayResult<()> {
        self.send(Command::Play)
    }

    pub fn send_pause(&self) -> PlayResult<()> {
        self.send(Command::Pause)
    }

    pub fn send_seek(&self, pos_ms: u32) -> PlayResult<()> {
        self.send(Command::Seek { pos_ms })
    }

    pub fn send_stop(&self) -> PlayResult<()> {
        self.send(Command::Stop)
    }

    /// Stop playback, close the stream, and shut the worker down.
    /// Idempotent; safe from any thread.
    pub fn close(&self) {
        self.shared.shutdown();
    }

    /// Wait for the command worker to exit. Call after [`close`] (or after
    /// a `Stop` command) during teardown.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    pub fn state(&self) -> HandlerState {
        *self.shared.state.lock()
    }

    pub fn events(&self) -> EventBus {
        self.shared.events.clone()
    }

    /// Metadata of the currently loaded playable, if any.
    pub fn playable(&self) -> Option<Playable> {
        self.shared.current.lock().as_ref().map(|c| c.metadata.clone())
    }

    /// Track metadata, when the loaded playable is a track.
    pub fn track(&self) -> Option<Track> {
        match self.playable() {
            Some(Playable::Track(track)) => Some(track),
            _ => None,
        }
    }

    /// Whether `id` is what this handler currently has loaded.
    pub fn is_playable(&self, id: &PlayableId) -> bool {
        self.shared
            .current
            .lock()
            .as_ref()
            .is_some_and(|c| c.metadata.gid() == id.gid())
    }

    pub fn position_ms(&self) -> u32 {
        self.shared
            .decoder
            .lock()
            .as_ref()
            .map_or(0, DecoderWorker::time_ms)
    }

    pub fn controller(&self) -> HandlerController<F> {
        HandlerController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: DecoderFactory> std::fmt::Debug for TrackHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackHandler")
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
