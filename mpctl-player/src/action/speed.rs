use super::{ActionContext, ActionKind, AsyncAction, Progress};
use crate::dispatcher::InnerMessage;
use crate::error::{Error, Result};
use crate::pipeline::PipelineState;
use tracing::debug;

/// Change the playback rate; completes on the engine's async-done
#[derive(Debug)]
pub struct SetSpeedAction {
    rate: f64,
}

impl SetSpeedAction {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl AsyncAction for SetSpeedAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SetSpeed(self.rate)
    }

    fn execute(&mut self, ctx: &mut dyn ActionContext) -> Result<Progress> {
        let state = ctx.pipeline_state();
        if state < PipelineState::Paused {
            return Err(Error::InvalidState(format!("rate change in pipeline state {}", state)));
        }

        ctx.send_speed(self.rate)?;
        ctx.set_rating(true);
        debug!("rate change to {}", self.rate);
        Ok(Progress::Pending)
    }

    fn handle_message(&mut self, ctx: &mut dyn ActionContext, msg: &InnerMessage) -> bool {
        matches!(msg, InnerMessage::AsyncDone) && ctx.pipeline_state() >= PipelineState::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::testing::FakeContext;

    #[test]
    fn test_rate_change_latches_flag() {
        let mut ctx = FakeContext::at(PipelineState::Paused);
        let mut action = SetSpeedAction::new(2.0);

        assert_eq!(action.execute(&mut ctx).unwrap(), Progress::Pending);
        assert!(ctx.rating);
        assert_eq!(ctx.rates, vec![2.0]);
        assert!(action.handle_message(&mut ctx, &InnerMessage::AsyncDone));
    }

    #[test]
    fn test_engine_refusal_does_not_latch() {
        let mut ctx = FakeContext::at(PipelineState::Playing);
        ctx.fail_requests = true;
        let mut action = SetSpeedAction::new(0.5);

        assert!(action.execute(&mut ctx).is_err());
        assert!(!ctx.rating);
    }
}
