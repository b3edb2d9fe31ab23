use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid base-62 id: {0}")]
    InvalidBase62(String),

    #[error("invalid hex id: {0}")]
    InvalidHex(String),

    #[error("invalid id length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

pub type CoreResult<T> = Result<T, CoreError>;
