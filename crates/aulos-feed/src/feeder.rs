//! The stream feeder: playable id in, open decrypted stream out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use aulos_core::{AudioQuality, CHUNK_SIZE, EpisodeId, PlayableId, TrackId};
use aulos_drm::{DecryptContext, decrypt_chunk};
use aulos_storage::{ChunkBuffer, ChunkProcessor};
use aulos_stream::{
    BufferSink, ChannelChunkSource, ChannelClient, ChunkSink, ChunkSource, ChunkedStream,
    StreamConfig, StreamShutdown,
};

use crate::{
    error::{FeedError, FeedResult},
    header::HeaderFetch,
    metadata::{AudioFileEntry, Playable},
    normalization::{NormalizationData, PREAMBLE_LEN},
    traits::{AudioKeyProvider, CacheProvider, CdnClient, MetadataClient},
};

/// Stream error code used when a transport cannot deliver at all.
const TRANSPORT_DEAD: u16 = u16::MAX;

/// Result of a successful load: metadata, an open seekable stream
/// positioned at the first audio byte, and the normalization block when
/// the format carries one.
pub struct LoadedStream {
    pub metadata: Playable,
    pub stream: ChunkedStream,
    pub normalization: Option<NormalizationData>,
}

impl LoadedStream {
    /// Close handle for the owner that does not hold the stream itself.
    pub fn shutdown_handle(&self) -> StreamShutdown {
        self.stream.shutdown_handle()
    }
}

impl std::fmt::Debug for LoadedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStream")
            .field("name", &self.metadata.name())
            .field("len", &self.stream.len())
            .field("normalization", &self.normalization.is_some())
            .finish()
    }
}

/// Pick the audio file to stream under the vorbis-only policy: the highest
/// vorbis bitrate not exceeding the preference, falling back to the lowest
/// vorbis rendition above it.
pub fn select_vorbis_file(
    files: &[AudioFileEntry],
    quality: AudioQuality,
) -> Option<&AudioFileEntry> {
    let preferred = quality.bitrate_kbps();
    let selected = files
        .iter()
        .filter(|f| f.format.is_vorbis() && f.format.bitrate_kbps() <= preferred)
        .max_by_key(|f| f.format.bitrate_kbps())
        .or_else(|| {
            files
                .iter()
                .filter(|f| f.format.is_vorbis())
                .min_by_key(|f| f.format.bitrate_kbps())
        })?;

    if !quality.matches(selected.format) {
        warn!(
            selected = ?selected.format,
            preferred_kbps = preferred,
            "preferred quality unavailable, substituting"
        );
    }
    Some(selected)
}

/// CDN-backed chunk source: one ranged GET per chunk.
struct CdnChunkSource {
    cdn: Arc<dyn CdnClient>,
    url: Url,
    total_size: u64,
    sink: Arc<dyn ChunkSink>,
}

impl ChunkSource for CdnChunkSource {
    fn request_chunk(&self, index: usize) {
        let offset = index as u64 * CHUNK_SIZE as u64;
        let len = self
            .total_size
            .saturating_sub(offset)
            .min(CHUNK_SIZE as u64) as usize;

        match self.cdn.fetch_range(&self.url, offset, len) {
            Ok(data) => self.sink.write_chunk(index, &data, false),
            Err(err) => {
                warn!(index, %err, "cdn range fetch failed");
                self.sink.stream_error(TRANSPORT_DEAD);
            }
        }
    }
}

/// Resolves a playable id into a [`LoadedStream`].
///
/// One feeder per session; loads are independent and each produces its own
/// buffer, chunk source, and stream.
pub struct StreamFeeder {
    metadata: Arc<dyn MetadataClient>,
    keys: Arc<dyn AudioKeyProvider>,
    channel: Arc<dyn ChannelClient>,
    cache: Option<Arc<dyn CacheProvider>>,
    cdn: Option<Arc<dyn CdnClient>>,
    stream_config: StreamConfig,
}

impl StreamFeeder {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        keys: Arc<dyn AudioKeyProvider>,
        channel: Arc<dyn ChannelClient>,
    ) -> Self {
        Self {
            metadata,
            keys,
            channel,
            cache: None,
            cdn: None,
            stream_config: StreamConfig::default(),
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_cdn(mut self, cdn: Arc<dyn CdnClient>) -> Self {
        self.cdn = Some(cdn);
        self
    }

    #[must_use]
    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Load a playable: fetch metadata, pick a file, fetch its key, open
    /// the stream, and position it at the first audio byte.
    pub fn load(
        &self,
        id: PlayableId,
        quality: AudioQuality,
        use_cdn: bool,
    ) -> FeedResult<LoadedStream> {
        match id {
            PlayableId::Track(track) => self.load_track(track, quality, use_cdn),
            PlayableId::Episode(episode) => self.load_episode(episode, quality, use_cdn),
        }
    }

    fn load_track(
        &self,
        id: TrackId,
        quality: AudioQuality,
        use_cdn: bool,
    ) -> FeedResult<LoadedStream> {
        let track = self.metadata.track(&id)?;
        let file = select_vorbis_file(&track.files, quality)
            .ok_or(FeedError::UnsupportedFormat)?
            .clone();
        let key = self.keys.key(track.id.gid(), &file.id)?;
        info!(
            name = %track.name,
            gid = %track.id.to_hex(),
            format = ?file.format,
            "track resolved"
        );

        let (stream, normalization) = if use_cdn && self.cdn.is_some() {
            let mut stream = self.open_cdn_track(&file, key)?;
            let normalization = NormalizationData::read(&mut stream)?;
            stream.skip(PREAMBLE_LEN);
            (stream, normalization)
        } else {
            let mut stream = self.open_channel_stream(&file, key)?;
            stream.skip(PREAMBLE_LEN);
            let normalization = NormalizationData::read_behind_preamble(&mut stream)?;
            (stream, normalization)
        };

        Ok(LoadedStream {
            metadata: Playable::Track(track),
            stream,
            normalization: Some(normalization),
        })
    }

    fn load_episode(
        &self,
        id: EpisodeId,
        quality: AudioQuality,
        use_cdn: bool,
    ) -> FeedResult<LoadedStream> {
        let episode = self.metadata.episode(&id)?;

        if use_cdn
            && let (Some(cdn), Some(external)) = (self.cdn.clone(), episode.external_url.clone())
        {
            // Externally-hosted episodes are plain containers: no key, no
            // normalization block, no preamble.
            let head = cdn.head(&external)?;
            if head.status != 200 {
                warn!(status = head.status, "could not resolve external url");
            }
            let size = head
                .content_length
                .ok_or_else(|| FeedError::Cdn("missing content length".into()))?;
            info!(name = %episode.name, size, "episode resolved via cdn");

            let stream = self.open_cdn_stream(cdn, head.url, size, None);
            return Ok(LoadedStream {
                metadata: Playable::Episode(episode),
                stream,
                normalization: None,
            });
        }

        let file = select_vorbis_file(&episode.files, quality)
            .ok_or(FeedError::UnsupportedFormat)?
            .clone();
        let key = self.keys.key(episode.id.gid(), &file.id)?;
        info!(name = %episode.name, format = ?file.format, "episode resolved via channel");

        let mut stream = self.open_channel_stream(&file, key)?;
        stream.skip(PREAMBLE_LEN);
        let normalization = NormalizationData::read_behind_preamble(&mut stream)?;

        Ok(LoadedStream {
            metadata: Playable::Episode(episode),
            stream,
            normalization: Some(normalization),
        })
    }

    /// Open a channel-backed stream: resolve the size from headers (cached
    /// or fetched with chunk 0), then wire buffer, sink, and source.
    fn open_channel_stream(
        &self,
        file: &AudioFileEntry,
        key: [u8; 16],
    ) -> FeedResult<ChunkedStream> {
        let cache = self.cache.as_ref().and_then(|c| c.handle_for(&file.id));

        let fetch = Arc::new(HeaderFetch::new(cache.clone()));
        let cached_headers = match &cache {
            Some(handle) => match handle.all_headers() {
                Ok(headers) if !headers.is_empty() => Some(headers),
                Ok(_) => None,
                Err(err) => {
                    warn!(%err, "cache header lookup failed, using channel");
                    None
                }
            },
            None => None,
        };
        match cached_headers {
            Some(headers) => fetch.replay_cached(headers),
            None => {
                self.channel
                    .request_chunk(&file.id, 0, Arc::clone(&fetch) as Arc<dyn ChunkSink>)?;
            }
        }
        let size = fetch.wait_size(self.stream_config.chunk_timeout)?;
        debug!(size, file_id = %file.id, "audio file size resolved");

        let buffer = ChunkBuffer::new(
            size,
            Some(decrypt_processor(key)),
            CancellationToken::new(),
        );
        let sink = Arc::new(BufferSink::new(buffer.clone(), cache.clone()));
        let source = Arc::new(ChannelChunkSource::new(
            file.id,
            Arc::clone(&self.channel),
            cache,
            sink,
        ));
        Ok(ChunkedStream::open(
            buffer,
            source,
            self.stream_config.clone(),
        ))
    }

    fn open_cdn_track(&self, file: &AudioFileEntry, key: [u8; 16]) -> FeedResult<ChunkedStream> {
        let cdn = self
            .cdn
            .clone()
            .ok_or_else(|| FeedError::Cdn("no cdn client configured".into()))?;

        let url = cdn.resolve_audio_url(&file.id)?;
        let head = cdn.head(&url)?;
        if head.status != 200 {
            return Err(FeedError::CdnHttp(head.status));
        }
        let size = head
            .content_length
            .ok_or_else(|| FeedError::Cdn("missing content length".into()))?;
        debug!(size, file_id = %file.id, "cdn audio file size resolved");

        Ok(self.open_cdn_stream(cdn, head.url, size, Some(decrypt_processor(key))))
    }

    fn open_cdn_stream(
        &self,
        cdn: Arc<dyn CdnClient>,
        url: Url,
        size: u64,
        processor: Option<ChunkProcessor>,
    ) -> ChunkedStream {
        let buffer = ChunkBuffer::new(size, processor, CancellationToken::new());
        let sink = Arc::new(BufferSink::new(buffer.clone(), None));
        let source = Arc::new(CdnChunkSource {
            cdn,
            url,
            total_size: size,
            sink,
        });
        ChunkedStream::open(buffer, source, self.stream_config.clone())
    }
}

fn decrypt_processor(key: [u8; 16]) -> ChunkProcessor {
    let ctx = DecryptContext::new(key);
    Box::new(move |index, input, output| {
        decrypt_chunk(&ctx, index, input, output).map_err(|err| err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use aulos_core::{AudioFormat, FILE_ID_LEN, FileId};

    use super::*;

    fn entry(format: AudioFormat) -> AudioFileEntry {
        AudioFileEntry {
            id: FileId::from_bytes([format.bitrate_kbps() as u8; FILE_ID_LEN]),
            format,
        }
    }

    #[test]
    fn picks_exact_quality_match() {
        let files = vec![
            entry(AudioFormat::OggVorbis96),
            entry(AudioFormat::OggVorbis160),
            entry(AudioFormat::OggVorbis320),
        ];
        let picked = select_vorbis_file(&files, AudioQuality::High).unwrap();
        assert_eq!(picked.format, AudioFormat::OggVorbis160);
    }

    #[test]
    fn picks_best_below_preference() {
        let files = vec![entry(AudioFormat::OggVorbis96), entry(AudioFormat::OggVorbis160)];
        let picked = select_vorbis_file(&files, AudioQuality::VeryHigh).unwrap();
        assert_eq!(picked.format, AudioFormat::OggVorbis160);
    }

    #[test]
    fn falls_back_to_lowest_above_preference() {
        let files = vec![entry(AudioFormat::OggVorbis320)];
        let picked = select_vorbis_file(&files, AudioQuality::Normal).unwrap();
        assert_eq!(picked.format, AudioFormat::OggVorbis320);
    }

    #[test]
    fn never_picks_mp3() {
        let files = vec![entry(AudioFormat::Mp3_160), entry(AudioFormat::Mp3_320)];
        assert!(select_vorbis_file(&files, AudioQuality::High).is_none());
    }
}
