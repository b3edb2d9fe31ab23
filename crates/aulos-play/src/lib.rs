#![forbid(unsafe_code)]

//! `aulos-play`
//!
//! The track handler: a single-worker command queue that owns one loaded
//! stream and one decoder worker at a time.
//!
//! Commands (`Load`, `Play`, `Pause`, `Seek`, `Stop`) are serialized onto a
//! dedicated thread; lifecycle events go out on a broadcast [`EventBus`].
//! The decoder itself is an external collaborator reached through the
//! [`DecoderFactory`] / [`DecoderWorker`] traits.

mod config;
mod decoder;
mod error;
mod events;
mod handler;

pub use config::PlayerConfig;
pub use decoder::{DecoderFactory, DecoderWorker, StreamLoader, VolumeSource};
pub use error::{PlayError, PlayResult};
pub use events::{EventBus, PlayerEvent};
pub use handler::{Command, HandlerController, HandlerState, TrackHandler};
