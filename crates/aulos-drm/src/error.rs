use thiserror::Error;

/// Errors produced by chunk decryption.
#[derive(Debug, Error)]
pub enum DrmError {
    #[error("chunk size mismatch: expected {expected} bytes, got {got}")]
    InvalidChunkSize { expected: usize, got: usize },
}

pub type DrmResult<T> = Result<T, DrmError>;
