use std::time::Duration;

/// Tuning for one chunked stream.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// How long a read may wait for a single chunk before the request is
    /// re-issued; a second timeout fails the read.
    pub chunk_timeout: Duration,
    /// How many chunks past the one being read are kept requested.
    pub prefetch_ahead: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(10),
            prefetch_ahead: 1,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_prefetch_ahead(mut self, chunks: usize) -> Self {
        self.prefetch_ahead = chunks;
        self
    }
}
