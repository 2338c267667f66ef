use super::{ActionContext, ActionKind, AsyncAction, Progress};
use crate::dispatcher::InnerMessage;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineState, SeekMode};
use tracing::debug;

/// Who asked for a seek
///
/// Only client seeks latch the seeking flag and produce a `SeekDone`
/// notification. Internal seeks (looping rewind, replay after completion)
/// complete silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Client,
    Internal,
}

#[derive(Debug)]
pub struct SeekAction {
    position_us: i64,
    mode: SeekMode,
    origin: SeekOrigin,
}

impl SeekAction {
    pub fn new(position_us: i64, mode: SeekMode, origin: SeekOrigin) -> Self {
        Self {
            position_us,
            mode,
            origin,
        }
    }
}

impl AsyncAction for SeekAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Seek {
            position_us: self.position_us,
            origin: self.origin,
        }
    }

    fn execute(&mut self, ctx: &mut dyn ActionContext) -> Result<Progress> {
        let state = ctx.pipeline_state();
        if state < PipelineState::Paused {
            return Err(Error::InvalidState(format!("seek in pipeline state {}", state)));
        }

        ctx.send_seek(self.position_us, self.mode)?;
        if self.origin == SeekOrigin::Client {
            ctx.set_seeking(true);
        }
        debug!("seek to {} us ({:?}, {:?})", self.position_us, self.mode, self.origin);
        Ok(Progress::Pending)
    }

    fn handle_message(&mut self, ctx: &mut dyn ActionContext, msg: &InnerMessage) -> bool {
        matches!(msg, InnerMessage::AsyncDone) && ctx.pipeline_state() >= PipelineState::Paused
    }
}
