//! Decryption context: the per-file AES key.

use std::fmt;

/// AES-128 decryption context for one audio file.
///
/// Holds the 16-byte file key returned by the audio-key RPC. The key is
/// deliberately excluded from `Debug` output so it can never reach a log
/// line through a formatted context.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DecryptContext {
    key: [u8; 16],
}

impl DecryptContext {
    pub fn new(key: [u8; 16]) -> Self {
        Self { key }
    }

    pub(crate) fn key(&self) -> &[u8; 16] {
        &self.key
    }
}

impl fmt::Debug for DecryptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptContext")
            .field("key", &"<redacted>")
            .finish()
    }
}
