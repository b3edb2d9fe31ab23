use thiserror::Error;

/// Result type used by `aulos-play`.
pub type PlayResult<T> = Result<T, PlayError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayError {
    /// A command was submitted after the handler stopped; the producer is
    /// expected to check handler lifetime, so this is surfaced loudly.
    #[error("handler is stopped")]
    HandlerStopped,

    #[error("handler already started")]
    AlreadyStarted,

    #[error("decoder failed: {reason}")]
    Decoder { reason: String },
}
