//! Generic finite state machine primitive
//!
//! Holds the current state tag and performs guarded transitions. State
//! behaviour lives in a [`StateHooks`] implementation supplied on every call,
//! so the machine never owns (or outlives) the object that implements the
//! states.
//!
//! Hooks never call back into the machine. A hook that wants a follow-up
//! transition returns it, and the machine applies it after the hook returns.
//! This keeps `on_enter` re-entrancy explicit without a recursive lock: the
//! internal lock only guards the current-state cell and is never held while
//! a hook runs.

use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Per-state behaviour invoked by [`StateMachine`]
///
/// `on_enter` and `on_exit` must not block; any wait is expressed by the
/// state remaining current until a later message returns a transition.
pub trait StateHooks<S> {
    /// Message type delivered to the current state
    type Message;

    /// Called on the state being left, before the current state changes
    fn on_exit(&mut self, _state: S) {}

    /// Called after the current state changed; may request a follow-up transition
    fn on_enter(&mut self, from: Option<S>, state: S) -> Option<S>;

    /// Called with every message while `state` is current
    fn on_message(&mut self, state: S, msg: &Self::Message) -> Option<S>;
}

/// A guarded transition: while `state` is current, only `successor` may follow
#[derive(Debug, Clone, Copy)]
struct TransitionGuard<S> {
    state: S,
    successor: S,
}

/// Thread-safe state container with guarded transitions
#[derive(Debug)]
pub struct StateMachine<S> {
    name: &'static str,
    current: Mutex<Option<S>>,
    guards: Vec<TransitionGuard<S>>,
}

impl<S> StateMachine<S>
where
    S: Copy + Eq + Debug,
{
    /// Create an uninitialized machine (no current state)
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
            guards: Vec::new(),
        }
    }

    /// Declare `state` a terminal transition in progress whose only legal successor is `successor`
    pub fn guard_transition(mut self, state: S, successor: S) -> Self {
        self.guards.push(TransitionGuard { state, successor });
        self
    }

    fn cell(&self) -> MutexGuard<'_, Option<S>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, `None` before the first transition
    pub fn current(&self) -> Option<S> {
        *self.cell()
    }

    /// Whether `state` is current
    pub fn is(&self, state: S) -> bool {
        self.current() == Some(state)
    }

    fn guarded_successor(&self, state: S) -> Option<S> {
        self.guards
            .iter()
            .find(|guard| guard.state == state)
            .map(|guard| guard.successor)
    }

    /// Transition to `next`, then apply any follow-up transitions returned by `on_enter`
    ///
    /// Returns `true` when at least the first transition was applied. A
    /// transition to the current state is a no-op. A transition out of a
    /// guarded state to anything other than its successor is rejected and
    /// logged.
    pub fn change_state<H>(&self, hooks: &mut H, next: S) -> bool
    where
        H: StateHooks<S>,
    {
        let mut pending = Some(next);
        let mut applied = false;

        while let Some(target) = pending.take() {
            let from = {
                let cell = self.cell();
                let from = *cell;

                if from == Some(target) {
                    debug!("[{}] already in {:?}, transition ignored", self.name, target);
                    break;
                }

                if let Some(current) = from {
                    if let Some(successor) = self.guarded_successor(current) {
                        if successor != target {
                            warn!(
                                "[{}] rejected transition {:?} -> {:?} while {:?} is in progress",
                                self.name, current, target, current
                            );
                            break;
                        }
                    }
                }
                from
            };

            if let Some(old) = from {
                hooks.on_exit(old);
            }

            *self.cell() = Some(target);
            applied = true;
            info!("[{}] state {:?} -> {:?}", self.name, from, target);

            pending = hooks.on_enter(from, target);
        }

        applied
    }

    /// Apply an optional transition produced by a handler
    pub fn change_state_opt<H>(&self, hooks: &mut H, transition: Option<S>) -> bool
    where
        H: StateHooks<S>,
    {
        match transition {
            Some(next) => self.change_state(hooks, next),
            None => false,
        }
    }

    /// Force the machine into `state`, bypassing transition guards
    ///
    /// Used for teardown (reset to the initial state). `on_exit` and
    /// `on_enter` still run.
    pub fn reset_to<H>(&self, hooks: &mut H, state: S)
    where
        H: StateHooks<S>,
    {
        let from = self.current();
        if from == Some(state) {
            return;
        }
        if let Some(old) = from {
            hooks.on_exit(old);
        }
        *self.cell() = Some(state);
        info!("[{}] state {:?} -> {:?} (reset)", self.name, from, state);

        let follow_up = hooks.on_enter(from, state);
        self.change_state_opt(hooks, follow_up);
    }

    /// Forward a message to the current state; no-op before initialization
    pub fn handle_message<H>(&self, hooks: &mut H, msg: &H::Message)
    where
        H: StateHooks<S>,
    {
        let Some(current) = self.current() else {
            debug!("[{}] message dropped, machine not initialized", self.name);
            return;
        };

        let transition = hooks.on_message(current, msg);
        self.change_state_opt(hooks, transition);
    }
}
