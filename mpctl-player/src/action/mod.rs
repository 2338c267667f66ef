//! Asynchronous action serializer
//!
//! Every operation that changes engine state (a state change, a seek, a rate
//! change) is an [`AsyncAction`]. The serializer keeps at most one of them in
//! flight; the rest wait in FIFO order. An action is issued with
//! [`AsyncAction::execute`] and completes when a later engine message
//! satisfies [`AsyncAction::handle_message`].
//!
//! All methods run on the dispatcher thread.

pub mod change_state;
pub mod seek;
pub mod speed;

pub use change_state::ChangeStateAction;
pub use seek::{SeekAction, SeekOrigin};
pub use speed::SetSpeedAction;

use crate::dispatcher::InnerMessage;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineState, SeekMode, StateChangeReturn};
use mpctl_common::PlayerState;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Engine access and controller flags available to actions
pub trait ActionContext {
    /// Last state the pipeline reached
    fn pipeline_state(&self) -> PipelineState;

    fn set_pipeline_state(&mut self, state: PipelineState) -> Result<StateChangeReturn>;

    fn send_seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()>;

    fn send_speed(&mut self, rate: f64) -> Result<()>;

    /// Latch: a client seek is in flight
    fn set_seeking(&mut self, seeking: bool);

    /// Latch: a rate change is in flight
    fn set_rating(&mut self, rating: bool);
}

/// Outcome of issuing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Issued; completion arrives later as a message
    Pending,
    /// Nothing left to wait for
    Done,
}

/// Identity of an action, reported to the observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    ChangeState(PlayerState),
    Seek {
        position_us: i64,
        origin: SeekOrigin,
    },
    SetSpeed(f64),
}

pub trait AsyncAction: Send {
    fn kind(&self) -> ActionKind;

    fn execute(&mut self, ctx: &mut dyn ActionContext) -> Result<Progress>;

    /// Returns `true` once `msg` completes the action
    fn handle_message(&mut self, ctx: &mut dyn ActionContext, msg: &InnerMessage) -> bool;
}

/// Notified as actions leave the serializer
pub trait ActionObserver {
    fn on_action_done(&mut self, kind: ActionKind);

    /// A queued action failed when it was finally executed
    fn on_action_failed(&mut self, kind: ActionKind, error: Error);
}

/// Completion record, for callers that act on outcomes after the serializer returns
#[derive(Debug)]
pub enum ActionOutcome {
    Done(ActionKind),
    Failed(ActionKind, Error),
}

impl ActionObserver for Vec<ActionOutcome> {
    fn on_action_done(&mut self, kind: ActionKind) {
        self.push(ActionOutcome::Done(kind));
    }

    fn on_action_failed(&mut self, kind: ActionKind, error: Error) {
        self.push(ActionOutcome::Failed(kind, error));
    }
}

/// FIFO of actions with at most one executing
#[derive(Default)]
pub struct ActionSerializer {
    current: Option<Box<dyn AsyncAction>>,
    pending: VecDeque<Box<dyn AsyncAction>>,
}

impl ActionSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute now when idle, otherwise queue behind the current action
    ///
    /// A synchronous failure is returned and leaves the serializer unchanged.
    pub fn enqueue(
        &mut self,
        ctx: &mut dyn ActionContext,
        action: Box<dyn AsyncAction>,
        observer: &mut dyn ActionObserver,
    ) -> Result<()> {
        if self.current.is_some() {
            debug!("queued {:?} ({} pending)", action.kind(), self.pending.len() + 1);
            self.pending.push_back(action);
            return Ok(());
        }
        self.start(ctx, action, observer)
    }

    fn start(
        &mut self,
        ctx: &mut dyn ActionContext,
        mut action: Box<dyn AsyncAction>,
        observer: &mut dyn ActionObserver,
    ) -> Result<()> {
        debug_assert!(self.current.is_none(), "two actions executing");

        match action.execute(ctx)? {
            Progress::Pending => {
                debug!("executing {:?}", action.kind());
                self.current = Some(action);
            }
            Progress::Done => {
                debug!("{:?} finished synchronously", action.kind());
                observer.on_action_done(action.kind());
                self.advance(ctx, observer);
            }
        }
        Ok(())
    }

    /// Execute queued actions until one is left waiting
    fn advance(&mut self, ctx: &mut dyn ActionContext, observer: &mut dyn ActionObserver) {
        while self.current.is_none() {
            let Some(mut next) = self.pending.pop_front() else {
                return;
            };
            match next.execute(ctx) {
                Ok(Progress::Pending) => {
                    debug!("executing {:?}", next.kind());
                    self.current = Some(next);
                }
                Ok(Progress::Done) => observer.on_action_done(next.kind()),
                Err(e) => {
                    warn!("queued {:?} failed: {}", next.kind(), e);
                    observer.on_action_failed(next.kind(), e);
                }
            }
        }
    }

    /// Offer `msg` to the current action
    pub fn handle_message(
        &mut self,
        ctx: &mut dyn ActionContext,
        msg: &InnerMessage,
        observer: &mut dyn ActionObserver,
    ) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if !current.handle_message(ctx, msg) {
            return;
        }

        let kind = current.kind();
        self.current = None;
        debug!("{:?} completed on {}", kind, msg.kind());
        observer.on_action_done(kind);
        self.advance(ctx, observer);
    }

    /// Drop queued actions without executing them; the current one keeps running
    pub fn clear_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("dropping {} pending actions", self.pending.len());
        }
        self.pending.clear();
    }

    /// Replace everything with `action`
    ///
    /// The current action stops being tracked: its engine request drains on
    /// its own but its completion is never reported.
    pub fn preempt(
        &mut self,
        ctx: &mut dyn ActionContext,
        action: Box<dyn AsyncAction>,
        observer: &mut dyn ActionObserver,
    ) -> Result<()> {
        self.clear_pending();
        if let Some(abandoned) = self.current.take() {
            debug!("{:?} preempted by {:?}", abandoned.kind(), action.kind());
        }
        self.start(ctx, action, observer)
    }

    /// Drop everything, current action included
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }

    pub fn executing_count(&self) -> usize {
        usize::from(self.current.is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Kind of the most recently queued action matching `pred`, the current one included
    pub fn last_matching(&self, pred: impl Fn(&ActionKind) -> bool) -> Option<ActionKind> {
        self.current
            .iter()
            .chain(self.pending.iter())
            .map(|action| action.kind())
            .filter(|kind| pred(kind))
            .last()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`ActionContext`] for action unit tests

    use super::*;

    #[derive(Debug, Default)]
    pub struct FakeContext {
        pub pipeline: Option<PipelineState>,
        pub requested: Vec<PipelineState>,
        pub seeks: Vec<(i64, SeekMode)>,
        pub rates: Vec<f64>,
        pub seeking: bool,
        pub rating: bool,
        pub fail_requests: bool,
    }

    impl FakeContext {
        pub fn at(state: PipelineState) -> Self {
            Self {
                pipeline: Some(state),
                ..Default::default()
            }
        }
    }

    impl ActionContext for FakeContext {
        fn pipeline_state(&self) -> PipelineState {
            self.pipeline.unwrap_or(PipelineState::Null)
        }

        fn set_pipeline_state(&mut self, state: PipelineState) -> Result<StateChangeReturn> {
            if self.fail_requests {
                return Err(Error::Engine("refused".to_string()));
            }
            self.requested.push(state);
            Ok(if self.pipeline == Some(state) {
                StateChangeReturn::Success
            } else {
                StateChangeReturn::Async
            })
        }

        fn send_seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()> {
            if self.fail_requests {
                return Err(Error::Engine("refused".to_string()));
            }
            self.seeks.push((position_us, mode));
            Ok(())
        }

        fn send_speed(&mut self, rate: f64) -> Result<()> {
            if self.fail_requests {
                return Err(Error::Engine("refused".to_string()));
            }
            self.rates.push(rate);
            Ok(())
        }

        fn set_seeking(&mut self, seeking: bool) {
            self.seeking = seeking;
        }

        fn set_rating(&mut self, rating: bool) {
            self.rating = rating;
        }
    }

    pub fn pipeline_reached(state: PipelineState) -> InnerMessage {
        InnerMessage::StateChanged {
            old: PipelineState::VoidPending,
            new: state,
            pending: PipelineState::VoidPending,
            from_pipeline: true,
        }
    }
}
