//! # mpctl Playback Control Core (mpctl-player)
//!
//! Drives a media pipeline through the player lifecycle
//! (prepare, play, pause, seek, speed, stop) and reports progress as
//! asynchronous notifications.
//!
//! **Architecture:** a per-controller message dispatcher thread owns the
//! player state machine and the action serializer. Engine requests are
//! issued one at a time; each finishes when the matching bus message
//! arrives. The engine itself sits behind the [`pipeline::MediaPipeline`]
//! trait, with an in-process simulated implementation for the CLI and tests.

pub mod action;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fsm;
pub mod pipeline;
pub mod player;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use mpctl_common::{ErrorCode, PlayerEvent, PlayerState};
pub use pipeline::SeekMode;
pub use player::{ChannelObserver, ElementSetupListener, PlayerController, PlayerObserver};
