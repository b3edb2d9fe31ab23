//! Track handler lifecycle scenarios against a scripted loader and a
//! recording decoder factory.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use rstest::rstest;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use aulos_core::{AudioQuality, CHUNK_SIZE, FILE_ID_LEN, FileId, GID_LEN, PlayableId, TrackId};
use aulos_feed::{
    AudioFileEntry, FeedError, FeedResult, LoadedStream, Playable, Track,
};
use aulos_play::{
    DecoderFactory, DecoderWorker, EventBus, HandlerState, PlayError, PlayerConfig, PlayerEvent,
    StreamLoader, TrackHandler, VolumeSource,
};
use aulos_storage::ChunkBuffer;
use aulos_stream::{
    BufferSink, ChunkSink, ChunkSource, ChunkedStream, StreamConfig, StreamShutdown,
};

fn track_id() -> TrackId {
    TrackId::from_gid([0x42; GID_LEN])
}

fn playable_id() -> PlayableId {
    PlayableId::Track(track_id())
}

fn other_playable_id() -> PlayableId {
    PlayableId::Track(TrackId::from_gid([0x99; GID_LEN]))
}

/// A loaded stream backed by an instantly-delivering source.
fn loaded_stream(size: usize) -> LoadedStream {
    struct InstantSource {
        data: Vec<u8>,
        sink: BufferSink,
    }

    impl ChunkSource for InstantSource {
        fn request_chunk(&self, index: usize) {
            let start = index * CHUNK_SIZE;
            let end = self.data.len().min(start + CHUNK_SIZE);
            self.sink.write_chunk(index, &self.data[start..end], false);
        }
    }

    let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    let buffer = ChunkBuffer::new(size as u64, None, CancellationToken::new());
    let sink = BufferSink::new(buffer.clone(), None);
    let stream = ChunkedStream::open(
        buffer,
        Arc::new(InstantSource { data, sink }),
        StreamConfig::default(),
    );

    LoadedStream {
        metadata: Playable::Track(Track {
            id: track_id(),
            name: "Scripted".into(),
            artists: vec!["Mock".into()],
            album: "Fixtures".into(),
            duration_ms: 200_000,
            files: vec![AudioFileEntry {
                id: FileId::from_bytes([1; FILE_ID_LEN]),
                format: aulos_core::AudioFormat::OggVorbis160,
            }],
        }),
        stream,
        normalization: None,
    }
}

struct ScriptedLoader {
    delay: Option<Duration>,
    fail: bool,
    loads: AtomicUsize,
    shutdowns: Mutex<Vec<StreamShutdown>>,
}

impl ScriptedLoader {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            fail: false,
            loads: AtomicUsize::new(0),
            shutdowns: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            fail: true,
            loads: AtomicUsize::new(0),
            shutdowns: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            fail: false,
            loads: AtomicUsize::new(0),
            shutdowns: Mutex::new(Vec::new()),
        })
    }
}

impl StreamLoader for ScriptedLoader {
    fn load(
        &self,
        _id: PlayableId,
        _quality: AudioQuality,
        _use_cdn: bool,
    ) -> FeedResult<LoadedStream> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail {
            return Err(FeedError::MetadataNotFound);
        }
        let loaded = loaded_stream(CHUNK_SIZE);
        self.shutdowns.lock().unwrap().push(loaded.shutdown_handle());
        Ok(loaded)
    }
}

#[derive(Default)]
struct WorkerLog {
    plays: AtomicUsize,
    pauses: AtomicUsize,
    stops: AtomicUsize,
    seeks: Mutex<Vec<u32>>,
    time_ms: AtomicU32,
    events: Mutex<Option<EventBus>>,
}

struct RecordingWorker {
    log: Arc<WorkerLog>,
}

impl DecoderWorker for RecordingWorker {
    fn play(&self) {
        self.log.plays.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.log.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn seek_ms(&self, pos_ms: u32) {
        self.log.seeks.lock().unwrap().push(pos_ms);
    }

    fn stop(&self) {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn time_ms(&self) -> u32 {
        self.log.time_ms.load(Ordering::SeqCst)
    }
}

struct RecordingFactory {
    logs: Arc<Mutex<Vec<Arc<WorkerLog>>>>,
    fail: bool,
}

impl RecordingFactory {
    fn new() -> (Self, Arc<Mutex<Vec<Arc<WorkerLog>>>>) {
        let logs = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                logs: Arc::clone(&logs),
                fail: false,
            },
            logs,
        )
    }

    fn failing() -> (Self, Arc<Mutex<Vec<Arc<WorkerLog>>>>) {
        let logs = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                logs: Arc::clone(&logs),
                fail: true,
            },
            logs,
        )
    }
}

impl DecoderFactory for RecordingFactory {
    type Worker = RecordingWorker;

    fn spawn(&self, stream: LoadedStream, events: EventBus) -> Result<Self::Worker, PlayError> {
        if self.fail {
            stream.stream.close();
            return Err(PlayError::Decoder {
                reason: "no output line".into(),
            });
        }
        let log = Arc::new(WorkerLog::default());
        *log.events.lock().unwrap() = Some(events);
        self.logs.lock().unwrap().push(Arc::clone(&log));
        Ok(RecordingWorker { log })
    }
}

struct StaticVolume(u16);

impl VolumeSource for StaticVolume {
    fn volume(&self) -> u16 {
        self.0
    }
}

fn handler_with(
    loader: Arc<ScriptedLoader>,
) -> (
    TrackHandler<RecordingFactory>,
    Arc<Mutex<Vec<Arc<WorkerLog>>>>,
    broadcast::Receiver<PlayerEvent>,
) {
    let (factory, logs) = RecordingFactory::new();
    let events = EventBus::new(32);
    let rx = events.subscribe();
    let handler = TrackHandler::new(
        loader,
        factory,
        Arc::new(StaticVolume(64)),
        PlayerConfig::default(),
        events,
    );
    handler.start().unwrap();
    (handler, logs, rx)
}

/// Poll the broadcast receiver until an event arrives or `timeout` passes.
fn next_event(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    timeout: Duration,
) -> Option<PlayerEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        match rx.try_recv() {
            Ok(event) => return Some(event),
            Err(broadcast::error::TryRecvError::Empty) => {
                if Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return None,
        }
    }
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

const TICK: Duration = Duration::from_secs(2);

// -- scenarios --

#[rstest]
#[timeout(Duration::from_secs(20))]
fn load_with_play_emits_events_in_order() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(Arc::clone(&loader));

    handler.send_load(playable_id(), true, 0).unwrap();

    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::StartedLoading)
    ));
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { pos_ms: 0, play: true })
    ));

    assert!(wait_until(TICK, || handler.state() == HandlerState::Playing));
    let log = logs.lock().unwrap()[0].clone();
    assert_eq!(log.plays.load(Ordering::SeqCst), 1);
    assert_eq!(*log.seeks.lock().unwrap(), vec![0]);
    assert!(handler.is_playable(&playable_id()));
    assert!(!handler.is_playable(&other_playable_id()));
    assert_eq!(handler.track().unwrap().name, "Scripted");

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn load_error_reports_and_worker_survives() {
    let loader = ScriptedLoader::failing();
    let (handler, _logs, mut rx) = handler_with(loader);

    handler.send_load(playable_id(), true, 0).unwrap();

    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::StartedLoading)
    ));
    match next_event(&mut rx, TICK) {
        Some(PlayerEvent::LoadingError { id, reason }) => {
            assert_eq!(id, playable_id());
            assert!(reason.contains("metadata"));
        }
        other => panic!("expected LoadingError, got {other:?}"),
    }
    assert!(wait_until(TICK, || handler.state() == HandlerState::Idle));

    // The command worker is still alive and accepts further commands.
    handler.send_pause().unwrap();
    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn play_pause_cycle_transitions_state() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(loader);

    handler.send_load(playable_id(), false, 0).unwrap();
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::StartedLoading)
    ));
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { play: false, .. })
    ));
    assert!(wait_until(TICK, || handler.state() == HandlerState::Ready));

    handler.send_play().unwrap();
    assert!(wait_until(TICK, || handler.state() == HandlerState::Playing));

    handler.send_pause().unwrap();
    assert!(wait_until(TICK, || handler.state() == HandlerState::Paused));

    handler.send_play().unwrap();
    assert!(wait_until(TICK, || handler.state() == HandlerState::Playing));

    let log = logs.lock().unwrap()[0].clone();
    assert_eq!(log.plays.load(Ordering::SeqCst), 2);
    assert_eq!(log.pauses.load(Ordering::SeqCst), 1);

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn seek_is_delegated_to_decoder() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(loader);

    handler.send_load(playable_id(), false, 1000).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    handler.send_seek(120_000).unwrap();
    assert!(wait_until(TICK, || {
        logs.lock().unwrap()[0].seeks.lock().unwrap().contains(&120_000)
    }));

    // Load-time seek came first.
    let log = logs.lock().unwrap()[0].clone();
    assert_eq!(log.seeks.lock().unwrap()[0], 1000);

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn stop_closes_stream_and_rejects_commands() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(Arc::clone(&loader));

    handler.send_load(playable_id(), true, 0).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    handler.send_stop().unwrap();
    handler.join();

    assert_eq!(handler.state(), HandlerState::Stopped);
    assert!(handler.is_stopped());
    assert_eq!(logs.lock().unwrap()[0].stops.load(Ordering::SeqCst), 1);
    assert!(loader.shutdowns.lock().unwrap()[0].is_closed());

    assert!(matches!(handler.send_play(), Err(PlayError::HandlerStopped)));
    assert!(matches!(
        handler.send_load(playable_id(), true, 0),
        Err(PlayError::HandlerStopped)
    ));
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn close_during_load_emits_no_completion_event() {
    let loader = ScriptedLoader::slow(Duration::from_millis(250));
    let (handler, logs, mut rx) = handler_with(Arc::clone(&loader));

    handler.send_load(playable_id(), true, 0).unwrap();
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::StartedLoading)
    ));

    // Close while the feeder is still resolving.
    thread::sleep(Duration::from_millis(50));
    handler.close();
    handler.join();

    // No completion event of either kind, and the stream was torn down.
    assert!(next_event(&mut rx, Duration::from_millis(500)).is_none());
    assert!(wait_until(TICK, || {
        loader
            .shutdowns
            .lock()
            .unwrap()
            .first()
            .is_some_and(StreamShutdown::is_closed)
    }));
    assert!(logs.lock().unwrap().is_empty(), "no decoder was spawned");
    assert!(matches!(handler.send_seek(0), Err(PlayError::HandlerStopped)));
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn new_load_replaces_decoder_and_closes_old_stream() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(Arc::clone(&loader));

    handler.send_load(playable_id(), true, 0).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    handler.send_load(other_playable_id(), false, 0).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    let logs = logs.lock().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].stops.load(Ordering::SeqCst), 1, "old decoder stopped");
    assert_eq!(logs[1].stops.load(Ordering::SeqCst), 0);
    drop(logs);

    assert!(loader.shutdowns.lock().unwrap()[0].is_closed());
    assert!(!loader.shutdowns.lock().unwrap()[1].is_closed());

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn decoder_spawn_failure_surfaces_loading_error() {
    let loader = ScriptedLoader::ok();
    let (factory, logs) = RecordingFactory::failing();
    let events = EventBus::new(32);
    let mut rx = events.subscribe();
    let handler = TrackHandler::new(
        Arc::clone(&loader) as Arc<dyn StreamLoader>,
        factory,
        Arc::new(StaticVolume(64)),
        PlayerConfig::default(),
        events,
    );
    handler.start().unwrap();

    handler.send_load(playable_id(), true, 0).unwrap();
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::StartedLoading)
    ));
    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::LoadingError { .. })
    ));
    assert!(wait_until(TICK, || handler.state() == HandlerState::Idle));
    assert!(logs.lock().unwrap().is_empty());

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn decoder_end_of_track_reaches_listener_once() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(loader);

    handler.send_load(playable_id(), false, 0).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    // The decoder worker publishes on the bus it was spawned with.
    let bus = logs.lock().unwrap()[0].events.lock().unwrap().clone().unwrap();
    bus.publish(PlayerEvent::EndOfTrack);

    assert!(matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::EndOfTrack)
    ));
    assert!(next_event(&mut rx, Duration::from_millis(200)).is_none());

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(20))]
fn controller_exposes_time_and_volume() {
    let loader = ScriptedLoader::ok();
    let (handler, logs, mut rx) = handler_with(loader);

    assert_eq!(handler.position_ms(), 0, "no decoder yet");

    handler.send_load(playable_id(), false, 0).unwrap();
    while !matches!(
        next_event(&mut rx, TICK),
        Some(PlayerEvent::FinishedLoading { .. }) | None
    ) {}

    logs.lock().unwrap()[0].time_ms.store(5000, Ordering::SeqCst);

    let controller = handler.controller();
    assert_eq!(controller.time_ms(), Some(5000));
    assert_eq!(controller.volume(), 64);
    assert_eq!(handler.position_ms(), 5000);

    handler.close();
    handler.join();
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn start_twice_is_rejected() {
    let loader = ScriptedLoader::ok();
    let (factory, _logs) = RecordingFactory::new();
    let handler = TrackHandler::new(
        loader as Arc<dyn StreamLoader>,
        factory,
        Arc::new(StaticVolume(0)),
        PlayerConfig::default(),
        EventBus::default(),
    );
    handler.start().unwrap();
    assert!(matches!(handler.start(), Err(PlayError::AlreadyStarted)));
    handler.close();
    handler.join();
}
