//! Configuration for the mpctl-player control core
//!
//! Loaded from TOML at startup; every field has a built-in default so an
//! empty or missing file yields a working configuration.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line `--config <path>`
//! 2. `MPCTL_CONFIG` environment variable
//! 3. `<config_dir>/mpctl/config.toml`
//! 4. Built-in defaults (code constants)

use crate::error::Result;
use mpctl_common::config::{load_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Lower bound for the position tick interval
pub const MIN_POSITION_INTERVAL_MS: u64 = 10;

/// Upper bound for the position tick interval
pub const MAX_POSITION_INTERVAL_MS: u64 = 5000;

/// Player configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// Period of `PositionUpdate` notifications while playing
    ///
    /// Default: 1000 ms, clamped to 10..=5000
    #[serde(default = "default_position_update_interval_ms")]
    pub position_update_interval_ms: u64,

    /// Upper bound on how long a blocking `prepare()` waits
    ///
    /// Default: 30000 ms
    #[serde(default = "default_prepare_timeout_ms")]
    pub prepare_timeout_ms: u64,

    /// Initial looping flag
    #[serde(default)]
    pub looping: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Simulated engine parameters (CLI and tests)
    #[serde(default)]
    pub sim: SimConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            position_update_interval_ms: default_position_update_interval_ms(),
            prepare_timeout_ms: default_prepare_timeout_ms(),
            looping: false,
            logging: LoggingConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Resolve the config path and load it, falling back to defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        match &path {
            Some(p) => info!("Loading configuration from {}", p.display()),
            None => info!("No configuration file, using built-in defaults"),
        }

        let config: PlayerConfig = load_or_default(path.as_deref())?;
        Ok(config.validated())
    }

    /// Clamp out-of-range values, logging each adjustment
    pub fn validated(mut self) -> Self {
        let clamped = self
            .position_update_interval_ms
            .clamp(MIN_POSITION_INTERVAL_MS, MAX_POSITION_INTERVAL_MS);
        if clamped != self.position_update_interval_ms {
            warn!(
                "position_update_interval_ms {} out of range, using {}",
                self.position_update_interval_ms, clamped
            );
            self.position_update_interval_ms = clamped;
        }

        if self.prepare_timeout_ms == 0 {
            warn!("prepare_timeout_ms must be positive, using default");
            self.prepare_timeout_ms = default_prepare_timeout_ms();
        }
        self
    }

    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }
}

/// Parameters for the in-process simulated engine
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimConfig {
    /// Media duration
    #[serde(default = "default_sim_duration_ms")]
    pub duration_ms: u64,

    /// Delay for each one-level state step (NULL→READY, READY→PAUSED, ...)
    #[serde(default = "default_state_change_delay_ms")]
    pub state_change_delay_ms: u64,

    /// Delay before a seek or rate change completes
    #[serde(default = "default_seek_delay_ms")]
    pub seek_delay_ms: u64,

    /// Distance between sync frames for keyframe-aligned seeks
    #[serde(default = "default_keyframe_interval_ms")]
    pub keyframe_interval_ms: u64,

    #[serde(default = "default_video_width")]
    pub video_width: i32,

    #[serde(default = "default_video_height")]
    pub video_height: i32,

    /// Post state changes from internal elements too
    #[serde(default = "default_true")]
    pub child_messages: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_sim_duration_ms(),
            state_change_delay_ms: default_state_change_delay_ms(),
            seek_delay_ms: default_seek_delay_ms(),
            keyframe_interval_ms: default_keyframe_interval_ms(),
            video_width: default_video_width(),
            video_height: default_video_height(),
            child_messages: true,
        }
    }
}

fn default_position_update_interval_ms() -> u64 {
    1000
}

fn default_prepare_timeout_ms() -> u64 {
    30_000
}

fn default_sim_duration_ms() -> u64 {
    30_000
}

fn default_state_change_delay_ms() -> u64 {
    20
}

fn default_seek_delay_ms() -> u64 {
    15
}

fn default_keyframe_interval_ms() -> u64 {
    500
}

fn default_video_width() -> i32 {
    1280
}

fn default_video_height() -> i32 {
    720
}

fn default_true() -> bool {
    true
}
