//! Move the pipeline to the low-level state backing a player state

use super::{ActionContext, ActionKind, AsyncAction, Progress};
use crate::dispatcher::InnerMessage;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineState, StateChangeReturn};
use mpctl_common::PlayerState;
use tracing::debug;

/// One row of the state transition table
#[derive(Debug, Clone, Copy)]
struct TransitionEntry {
    target: PlayerState,
    low_level: PipelineState,
    /// Pipeline states the request may be issued from
    from: &'static [PipelineState],
}

const ANY_STATE: &[PipelineState] = &[
    PipelineState::Null,
    PipelineState::Ready,
    PipelineState::Paused,
    PipelineState::Playing,
];

const TRANSITIONS: [TransitionEntry; 4] = [
    TransitionEntry {
        target: PlayerState::Prepared,
        low_level: PipelineState::Paused,
        from: &[PipelineState::Null, PipelineState::Ready, PipelineState::Paused],
    },
    TransitionEntry {
        target: PlayerState::Playing,
        low_level: PipelineState::Playing,
        from: &[PipelineState::Paused, PipelineState::Playing],
    },
    TransitionEntry {
        target: PlayerState::Paused,
        low_level: PipelineState::Paused,
        from: &[PipelineState::Paused, PipelineState::Playing],
    },
    TransitionEntry {
        target: PlayerState::Stopped,
        low_level: PipelineState::Ready,
        from: ANY_STATE,
    },
];

fn lookup(target: PlayerState) -> Option<&'static TransitionEntry> {
    TRANSITIONS.iter().find(|entry| entry.target == target)
}

/// Low-level state that backs `target`, if it is reachable by a state change
pub fn low_level_state(target: PlayerState) -> Option<PipelineState> {
    lookup(target).map(|entry| entry.low_level)
}

#[derive(Debug)]
pub struct ChangeStateAction {
    target: PlayerState,
    low_level: Option<PipelineState>,
}

impl ChangeStateAction {
    pub fn new(target: PlayerState) -> Self {
        Self {
            target,
            low_level: None,
        }
    }

    pub fn target(&self) -> PlayerState {
        self.target
    }
}

impl AsyncAction for ChangeStateAction {
    fn kind(&self) -> ActionKind {
        ActionKind::ChangeState(self.target)
    }

    fn execute(&mut self, ctx: &mut dyn ActionContext) -> Result<Progress> {
        let entry = lookup(self.target).ok_or_else(|| {
            Error::Internal(format!("no pipeline state backs {}", self.target))
        })?;

        let current = ctx.pipeline_state();
        if !entry.from.contains(&current) {
            return Err(Error::InvalidState(format!(
                "cannot reach {} from pipeline state {}",
                self.target, current
            )));
        }

        self.low_level = Some(entry.low_level);
        let ret = ctx.set_pipeline_state(entry.low_level)?;
        debug!(
            "change to {} ({} -> {}): {:?}",
            self.target, current, entry.low_level, ret
        );

        if ret == StateChangeReturn::Success && ctx.pipeline_state() == entry.low_level {
            return Ok(Progress::Done);
        }
        Ok(Progress::Pending)
    }

    /// Intermediate steps of a longer change (pending set) do not complete it
    fn handle_message(&mut self, _ctx: &mut dyn ActionContext, msg: &InnerMessage) -> bool {
        match self.low_level {
            Some(low_level) => msg.is_pipeline_settled(low_level),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::testing::{pipeline_reached, FakeContext};

    #[test]
    fn test_table_covers_action_targets() {
        assert_eq!(low_level_state(PlayerState::Prepared), Some(PipelineState::Paused));
        assert_eq!(low_level_state(PlayerState::Playing), Some(PipelineState::Playing));
        assert_eq!(low_level_state(PlayerState::Paused), Some(PipelineState::Paused));
        assert_eq!(low_level_state(PlayerState::Stopped), Some(PipelineState::Ready));
        assert_eq!(low_level_state(PlayerState::Idle), None);
    }

    #[test]
    fn test_completes_on_pipeline_state_changed() {
        let mut ctx = FakeContext::at(PipelineState::Paused);
        let mut action = ChangeStateAction::new(PlayerState::Playing);

        assert_eq!(action.execute(&mut ctx).unwrap(), Progress::Pending);
        assert_eq!(ctx.requested, vec![PipelineState::Playing]);

        assert!(!action.handle_message(&mut ctx, &InnerMessage::AsyncDone));
        assert!(!action.handle_message(&mut ctx, &pipeline_reached(PipelineState::Paused)));
        assert!(action.handle_message(&mut ctx, &pipeline_reached(PipelineState::Playing)));
    }

    #[test]
    fn test_child_element_state_does_not_complete() {
        let mut ctx = FakeContext::at(PipelineState::Paused);
        let mut action = ChangeStateAction::new(PlayerState::Playing);
        action.execute(&mut ctx).unwrap();

        let child = InnerMessage::StateChanged {
            old: PipelineState::Paused,
            new: PipelineState::Playing,
            pending: PipelineState::VoidPending,
            from_pipeline: false,
        };
        assert!(!action.handle_message(&mut ctx, &child));
    }

    #[test]
    fn test_passing_through_target_does_not_complete() {
        let mut ctx = FakeContext::at(PipelineState::Null);
        let mut action = ChangeStateAction::new(PlayerState::Stopped);
        assert_eq!(action.execute(&mut ctx).unwrap(), Progress::Pending);

        // READY on the way to a PAUSED requested earlier
        let passing = InnerMessage::StateChanged {
            old: PipelineState::Null,
            new: PipelineState::Ready,
            pending: PipelineState::Paused,
            from_pipeline: true,
        };
        assert!(!action.handle_message(&mut ctx, &passing));
        assert!(!action.handle_message(&mut ctx, &pipeline_reached(PipelineState::Paused)));
        assert!(action.handle_message(&mut ctx, &pipeline_reached(PipelineState::Ready)));
    }

    #[test]
    fn test_invalid_start_state() {
        let mut ctx = FakeContext::at(PipelineState::Ready);
        let mut action = ChangeStateAction::new(PlayerState::Playing);

        assert!(matches!(action.execute(&mut ctx), Err(Error::InvalidState(_))));
        assert!(ctx.requested.is_empty());
    }

    #[test]
    fn test_unbacked_target_is_internal_error() {
        let mut ctx = FakeContext::at(PipelineState::Null);
        let mut action = ChangeStateAction::new(PlayerState::Idle);
        assert!(matches!(action.execute(&mut ctx), Err(Error::Internal(_))));
    }

    #[test]
    fn test_stop_allowed_from_any_state() {
        for state in ANY_STATE {
            let mut ctx = FakeContext::at(*state);
            let mut action = ChangeStateAction::new(PlayerState::Stopped);
            assert!(action.execute(&mut ctx).is_ok());
        }
    }
}
