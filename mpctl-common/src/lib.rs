//! # mpctl Common Library
//!
//! Shared vocabulary for the playback control workspace:
//! - Client-visible player states and notifications (`PlayerEvent`)
//! - Error codes carried by notifications
//! - TOML configuration loading and config file resolution
//! - Time unit helpers (microseconds / milliseconds)

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{ErrorCode, PlayerEvent, PlayerState};
