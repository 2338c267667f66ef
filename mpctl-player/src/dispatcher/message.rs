//! Normalised engine notifications
//!
//! Everything the controller reacts to arrives as an [`InnerMessage`]:
//! converted bus messages plus the dispatcher's own position ticks.

use crate::pipeline::PipelineState;
use mpctl_common::ErrorCode;

/// An element created inside the pipeline, reported to the setup listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub name: String,
    pub factory: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InnerMessage {
    /// An element (or the whole pipeline when `from_pipeline`) changed state
    StateChanged {
        old: PipelineState,
        new: PipelineState,
        pending: PipelineState,
        from_pipeline: bool,
    },
    /// A state change, seek or rate change finished prerolling
    AsyncDone,
    Eos,
    Error { code: ErrorCode, text: String },
    Warning { text: String },
    Info { text: String },
    DurationChanged,
    Buffering { percent: i32 },
    ResolutionChanged { width: i32, height: i32 },
    BufferingTime { queue_id: u32, time_ns: i64 },
    BufferingUsedQueues { count: u32 },
    /// Synthesised by a dispatcher tick source
    PositionTick { tag: u32 },
    ElementSetup(ElementInfo),
}

impl InnerMessage {
    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            InnerMessage::StateChanged { .. } => "state-changed",
            InnerMessage::AsyncDone => "async-done",
            InnerMessage::Eos => "eos",
            InnerMessage::Error { .. } => "error",
            InnerMessage::Warning { .. } => "warning",
            InnerMessage::Info { .. } => "info",
            InnerMessage::DurationChanged => "duration-changed",
            InnerMessage::Buffering { .. } => "buffering",
            InnerMessage::ResolutionChanged { .. } => "resolution-changed",
            InnerMessage::BufferingTime { .. } => "buffering-time",
            InnerMessage::BufferingUsedQueues { .. } => "buffering-used-queues",
            InnerMessage::PositionTick { .. } => "position-tick",
            InnerMessage::ElementSetup(_) => "element-setup",
        }
    }

    /// Whether the top-level pipeline reached `state` with no further change pending
    pub fn is_pipeline_settled(&self, state: PipelineState) -> bool {
        matches!(
            self,
            InnerMessage::StateChanged {
                new,
                pending: PipelineState::VoidPending,
                from_pipeline: true,
                ..
            } if *new == state
        )
    }
}
