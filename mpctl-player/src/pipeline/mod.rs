//! Media engine boundary
//!
//! The controller only ever talks to the engine through [`MediaPipeline`].
//! Engine notifications travel back over the pipeline's [`MessageBus`].
//! [`sim::SimPipeline`] is the in-process implementation used by the CLI
//! and the test suite.

pub mod bus;
pub mod sim;

pub use bus::{BusReceiver, ErrorDomain, MessageBus, RawBody, RawMessage};
pub use sim::{SimControl, SimFaults, SimPipeline, SimPipelineFactory};

use crate::error::{Error, Result};

/// Low-level engine state, ordered NULL < READY < PAUSED < PLAYING
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::VoidPending => write!(f, "VOID_PENDING"),
            PipelineState::Null => write!(f, "NULL"),
            PipelineState::Ready => write!(f, "READY"),
            PipelineState::Paused => write!(f, "PAUSED"),
            PipelineState::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Successful outcome of a `set_state` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeReturn {
    /// Completed synchronously (a state-changed message still follows)
    Success,
    /// Completes later; a state-changed message reports completion
    Async,
    /// Live source, no preroll
    NoPreroll,
}

/// Seek flag bit set passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekFlags(u32);

impl SeekFlags {
    pub const FLUSH: SeekFlags = SeekFlags(1 << 0);
    pub const ACCURATE: SeekFlags = SeekFlags(1 << 1);
    pub const KEY_UNIT: SeekFlags = SeekFlags(1 << 2);
    pub const SNAP_BEFORE: SeekFlags = SeekFlags(1 << 3);
    pub const SNAP_AFTER: SeekFlags = SeekFlags(1 << 4);
    pub const SNAP_NEAREST: SeekFlags = SeekFlags(1 << 5);

    pub const fn union(self, other: SeekFlags) -> SeekFlags {
        SeekFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: SeekFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Client seek mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekMode {
    /// Sync frame at or before the target
    PreviousSync,
    /// Sync frame at or after the target
    NextSync,
    /// Sync frame nearest the target
    ClosestSync,
    /// Exactly the target
    Closest,
}

const KEY_FLUSH: SeekFlags = SeekFlags::FLUSH.union(SeekFlags::KEY_UNIT);

const SEEK_MODE_FLAGS: [(SeekMode, SeekFlags); 4] = [
    (SeekMode::PreviousSync, KEY_FLUSH.union(SeekFlags::SNAP_BEFORE)),
    (SeekMode::NextSync, KEY_FLUSH.union(SeekFlags::SNAP_AFTER)),
    (SeekMode::ClosestSync, KEY_FLUSH.union(SeekFlags::SNAP_NEAREST)),
    (SeekMode::Closest, SeekFlags::FLUSH.union(SeekFlags::ACCURATE)),
];

impl SeekMode {
    /// Engine flags for this mode
    pub fn flags(self) -> SeekFlags {
        SEEK_MODE_FLAGS
            .iter()
            .find(|(mode, _)| *mode == self)
            .map(|(_, flags)| *flags)
            .unwrap_or(SeekFlags::FLUSH)
    }
}

impl TryFrom<i32> for SeekMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(SeekMode::PreviousSync),
            1 => Ok(SeekMode::NextSync),
            2 => Ok(SeekMode::ClosestSync),
            3 => Ok(SeekMode::Closest),
            other => Err(Error::InvalidValue(format!("unknown seek mode {}", other))),
        }
    }
}

/// Handle to one engine pipeline
///
/// All methods are called from the dispatcher thread only. Requests return
/// immediately; completion is reported on the bus.
pub trait MediaPipeline: Send {
    /// Name used as the source of top-level bus messages
    fn name(&self) -> &str;

    fn bus(&self) -> MessageBus;

    fn set_uri(&mut self, uri: &str) -> Result<()>;

    fn set_state(&mut self, state: PipelineState) -> Result<StateChangeReturn>;

    /// Last state the pipeline reached (not the pending one)
    fn current_state(&self) -> PipelineState;

    /// Flushing seek; `flags` select exact or sync-frame positioning
    fn seek(&mut self, position_us: i64, flags: SeekFlags) -> Result<()>;

    fn set_rate(&mut self, rate: f64) -> Result<()>;

    /// Media duration in microseconds, `None` while unknown
    fn query_duration(&self) -> Option<i64>;

    /// Playback position in microseconds, `None` while unknown
    fn query_position(&self) -> Option<i64>;
}

/// Creates pipelines on demand when the controller binds a source
pub trait PipelineFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Box<dyn MediaPipeline>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(PipelineState::Null < PipelineState::Ready);
        assert!(PipelineState::Ready < PipelineState::Paused);
        assert!(PipelineState::Paused < PipelineState::Playing);
    }

    #[test]
    fn test_seek_mode_from_i32() {
        assert_eq!(SeekMode::try_from(0).unwrap(), SeekMode::PreviousSync);
        assert_eq!(SeekMode::try_from(3).unwrap(), SeekMode::Closest);
        assert!(matches!(SeekMode::try_from(4), Err(Error::InvalidValue(_))));
        assert!(SeekMode::try_from(-1).is_err());
    }

    #[test]
    fn test_seek_mode_flags() {
        let flags = SeekMode::PreviousSync.flags();
        assert!(flags.contains(SeekFlags::FLUSH));
        assert!(flags.contains(SeekFlags::KEY_UNIT));
        assert!(flags.contains(SeekFlags::SNAP_BEFORE));
        assert!(!flags.contains(SeekFlags::ACCURATE));

        let exact = SeekMode::Closest.flags();
        assert!(exact.contains(SeekFlags::ACCURATE));
        assert!(!exact.contains(SeekFlags::KEY_UNIT));
    }
}
