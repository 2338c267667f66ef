//! Client-visible player states and notifications
//!
//! Every notification the playback controller delivers to its observer is a
//! [`PlayerEvent`]. Events serialize as tagged JSON objects (`{"type": ...}`)
//! so front-ends and the CLI can log them verbatim.

use serde::{Deserialize, Serialize};

/// Player state as seen by clients
///
/// The controller tracks one additional transitional state internally
/// (a stop in progress); clients only observe its completion as `Stopped`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Preparing,
    Prepared,
    Playing,
    Paused,
    Stopped,
    PlaybackCompleted,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Preparing => write!(f, "preparing"),
            PlayerState::Prepared => write!(f, "prepared"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::PlaybackCompleted => write!(f, "playback_completed"),
        }
    }
}

/// Error code carried by `PlayerEvent::Error`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Command not allowed in the current state
    InvalidOperation,
    /// Argument out of range or malformed
    InvalidValue,
    /// Source or feature not supported
    Unsupported,
    /// Media engine reported or caused a failure
    EngineFailure,
    /// Operation did not complete in time
    Timeout,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidOperation => write!(f, "invalid_operation"),
            ErrorCode::InvalidValue => write!(f, "invalid_value"),
            ErrorCode::Unsupported => write!(f, "unsupported"),
            ErrorCode::EngineFailure => write!(f, "engine_failure"),
            ErrorCode::Timeout => write!(f, "timeout"),
            ErrorCode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Notification delivered to the registered player observer
///
/// Delivered on the controller's notification thread, never synchronously
/// from inside a client command call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Asynchronous failure or rejected command
    Error { code: ErrorCode },

    /// A client seek finished; position after the seek
    SeekDone { position_ms: i64 },

    /// A speed change finished
    SpeedDone { rate: f64 },

    /// Player state changed (or was re-confirmed by an idempotent command)
    StateChanged { state: PlayerState },

    /// Periodic or on-demand playback position report
    PositionUpdate { position_ms: i64 },

    /// End of stream reached
    EndOfStream { looping: bool },

    /// Preparation started buffering
    BufferingStart,

    /// Preparation finished buffering
    BufferingEnd,

    /// Buffering fill level reported by the engine
    BufferingPercent { percent: i32 },

    /// Video frame size changed
    VideoSizeChanged { width: i32, height: i32 },

    /// First frame rendered after entering playing
    RenderingStart,
}

impl PlayerEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::Error { .. } => "Error",
            PlayerEvent::SeekDone { .. } => "SeekDone",
            PlayerEvent::SpeedDone { .. } => "SpeedDone",
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::PositionUpdate { .. } => "PositionUpdate",
            PlayerEvent::EndOfStream { .. } => "EndOfStream",
            PlayerEvent::BufferingStart => "BufferingStart",
            PlayerEvent::BufferingEnd => "BufferingEnd",
            PlayerEvent::BufferingPercent { .. } => "BufferingPercent",
            PlayerEvent::VideoSizeChanged { .. } => "VideoSizeChanged",
            PlayerEvent::RenderingStart => "RenderingStart",
        }
    }
}
