//! Player states
//!
//! Each state is a [`StateTag`]; its command handlers, message reactions and
//! entry side effects are the `match` arms below. Handlers never transition
//! directly: they return the next tag and the state machine applies it.

use super::machine::{PlayerCore, POSITION_TICK};
use crate::action::{
    ActionKind, ActionOutcome, ChangeStateAction, SeekAction, SeekOrigin, SetSpeedAction,
};
use crate::dispatcher::InnerMessage;
use crate::error::{Error, Result};
use crate::fsm::StateHooks;
use crate::pipeline::{PipelineState, SeekMode};
use mpctl_common::{time, PlayerEvent, PlayerState};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTag {
    Idle,
    Preparing,
    Prepared,
    Playing,
    Paused,
    /// Stop requested, waiting for the engine to reach READY
    Stopping,
    Stopped,
    PlaybackCompleted,
}

impl StateTag {
    /// State reported to clients; `None` for the internal stop-in-progress state
    pub fn client_state(self) -> Option<PlayerState> {
        match self {
            StateTag::Idle => Some(PlayerState::Idle),
            StateTag::Preparing => Some(PlayerState::Preparing),
            StateTag::Prepared => Some(PlayerState::Prepared),
            StateTag::Playing => Some(PlayerState::Playing),
            StateTag::Paused => Some(PlayerState::Paused),
            StateTag::Stopping => None,
            StateTag::Stopped => Some(PlayerState::Stopped),
            StateTag::PlaybackCompleted => Some(PlayerState::PlaybackCompleted),
        }
    }

    fn from_client(state: PlayerState) -> StateTag {
        match state {
            PlayerState::Idle => StateTag::Idle,
            PlayerState::Preparing => StateTag::Preparing,
            PlayerState::Prepared => StateTag::Prepared,
            PlayerState::Playing => StateTag::Playing,
            PlayerState::Paused => StateTag::Paused,
            PlayerState::Stopped => StateTag::Stopped,
            PlayerState::PlaybackCompleted => StateTag::PlaybackCompleted,
        }
    }

    /// States in which engine messages get the full reaction set
    fn reacts_to_engine(self) -> bool {
        matches!(
            self,
            StateTag::Preparing
                | StateTag::Prepared
                | StateTag::Playing
                | StateTag::Paused
                | StateTag::PlaybackCompleted
        )
    }
}

/// Client command evaluated on the dispatcher thread
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    SetSource(String),
    Prepare,
    Play,
    Pause,
    Stop,
    Seek { position_us: i64, mode: SeekMode },
    SetSpeed(f64),
    Reset,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetSource(_) => "set_source",
            Command::Prepare => "prepare",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Seek { .. } => "seek",
            Command::SetSpeed(_) => "set_speed",
            Command::Reset => "reset",
        }
    }
}

fn reject(command: &Command, state: StateTag) -> Result<Option<StateTag>> {
    Err(Error::InvalidState(format!(
        "{} not allowed in {:?}",
        command.name(),
        state
    )))
}

impl PlayerCore {
    /// Re-confirm the current state to the client
    fn confirm(&self, state: StateTag) -> Result<Option<StateTag>> {
        if let Some(client) = state.client_state() {
            self.notify(PlayerEvent::StateChanged { state: client });
        }
        Ok(None)
    }

    /// Target of the latest queued or executing state change
    fn queued_target(&self) -> Option<PlayerState> {
        match self
            .actions
            .last_matching(|kind| matches!(kind, ActionKind::ChangeState(_)))
        {
            Some(ActionKind::ChangeState(target)) => Some(target),
            _ => None,
        }
    }

    fn change_to(&mut self, target: PlayerState) -> Result<()> {
        self.enqueue(Box::new(ChangeStateAction::new(target)))
    }

    pub(crate) fn on_command(&mut self, state: StateTag, command: Command) -> Result<Option<StateTag>> {
        use StateTag::*;

        match (&command, state) {
            (Command::SetSource(uri), Idle) => {
                info!("source set to {}", uri);
                let uri = uri.clone();
                self.shared.update(|f| f.uri = Some(uri));
                Ok(None)
            }

            (Command::Prepare, Idle | Stopped) => {
                self.bind_pipeline()?;
                self.shared.update(|f| f.error_occurred = false);
                if let Err(e) = self.change_to(PlayerState::Prepared) {
                    // Idle never keeps a pipeline, so a new source binds afresh
                    if state == Idle {
                        self.unbind_pipeline();
                    }
                    return Err(e);
                }
                Ok(Some(Preparing))
            }
            (Command::Prepare, Preparing) => Ok(None),
            (Command::Prepare, Prepared) => self.confirm(state),

            (Command::Play, Prepared | Paused) => {
                if self.queued_target() != Some(PlayerState::Playing) {
                    self.change_to(PlayerState::Playing)?;
                }
                Ok(None)
            }
            (Command::Play, Playing) => {
                if self.queued_target() == Some(PlayerState::Paused) {
                    self.change_to(PlayerState::Playing)?;
                    return Ok(None);
                }
                self.confirm(state)
            }
            (Command::Play, PlaybackCompleted) => {
                let (position_us, mode) = self.rewind.take().unwrap_or((0, SeekMode::PreviousSync));
                debug!("replay from {} us", position_us);
                self.enqueue(Box::new(SeekAction::new(position_us, mode, SeekOrigin::Internal)))?;
                self.change_to(PlayerState::Playing)?;
                Ok(None)
            }

            (Command::Pause, Playing) => {
                if self.queued_target() != Some(PlayerState::Paused) {
                    self.change_to(PlayerState::Paused)?;
                }
                Ok(None)
            }
            (Command::Pause, Paused) => {
                if self.queued_target() == Some(PlayerState::Playing) {
                    self.change_to(PlayerState::Paused)?;
                    return Ok(None);
                }
                self.confirm(state)
            }

            (Command::Seek { position_us, mode }, Prepared | Playing | Paused) => {
                let target = self.clamp_position(*position_us);
                self.enqueue(Box::new(SeekAction::new(target, *mode, SeekOrigin::Client)))?;
                Ok(None)
            }
            (Command::Seek { position_us, mode }, PlaybackCompleted) => {
                let target = self.clamp_position(*position_us);
                self.rewind = Some((target, *mode));
                self.shared.update(|f| f.position_us = target);
                self.notify(PlayerEvent::SeekDone {
                    position_ms: time::us_to_ms(target),
                });
                Ok(None)
            }

            (Command::SetSpeed(rate), Prepared | Playing | Paused) => {
                self.enqueue(Box::new(SetSpeedAction::new(*rate)))?;
                Ok(None)
            }

            (Command::Stop, Preparing | Prepared | Playing | Paused | PlaybackCompleted) => {
                if let Err(e) = self.request_stop() {
                    warn!("stop request failed ({}), completing stop anyway", e);
                    self.outcomes
                        .push(ActionOutcome::Done(ActionKind::ChangeState(PlayerState::Stopped)));
                }
                Ok(Some(Stopping))
            }
            (Command::Stop, Stopped) => self.confirm(state),
            (Command::Stop, Stopping) => Ok(None),

            _ => reject(&command, state),
        }
    }

    /// Map a finished action to the next state
    pub(crate) fn on_action_outcome(&mut self, state: StateTag, outcome: ActionOutcome) -> Option<StateTag> {
        match outcome {
            ActionOutcome::Done(ActionKind::ChangeState(target)) => {
                let next = StateTag::from_client(target);
                let accepted = match (state, next) {
                    (StateTag::Stopping, next) => next == StateTag::Stopped,
                    (StateTag::Preparing, StateTag::Prepared) => true,
                    (
                        StateTag::Prepared | StateTag::Paused | StateTag::PlaybackCompleted,
                        StateTag::Playing,
                    ) => true,
                    (StateTag::Playing, StateTag::Paused) => true,
                    _ => false,
                };
                if accepted {
                    Some(next)
                } else {
                    debug!("change to {} finished in {:?}, no transition", target, state);
                    None
                }
            }
            ActionOutcome::Done(kind) => {
                debug!("{:?} done in {:?}", kind, state);
                None
            }
            ActionOutcome::Failed(kind, error) => {
                warn!("{:?} failed in {:?}: {}", kind, state, error);
                match kind {
                    ActionKind::ChangeState(PlayerState::Prepared) => {
                        self.shared.update(|f| f.error_occurred = true);
                    }
                    ActionKind::Seek {
                        origin: SeekOrigin::Client,
                        ..
                    } => self.shared.update(|f| f.is_seeking = false),
                    ActionKind::SetSpeed(_) => {
                        self.take_pending_rate();
                        self.shared.update(|f| f.is_rating = false);
                    }
                    _ => {}
                }
                self.notify(PlayerEvent::Error { code: error.code() });
                None
            }
        }
    }

    /// Reactions shared by every state that talks to a live pipeline
    fn react(&mut self, state: StateTag, msg: &InnerMessage) -> Option<StateTag> {
        match msg {
            InnerMessage::StateChanged {
                new,
                from_pipeline: true,
                ..
            } => {
                if *new == PipelineState::Playing && state == StateTag::Playing {
                    self.arm_tick();
                } else {
                    self.disarm_tick();
                }
                None
            }
            InnerMessage::AsyncDone => {
                self.resolve_async_done();
                None
            }
            InnerMessage::DurationChanged => {
                let duration_us = self.refresh_duration();
                debug!("duration now {} us", duration_us);
                None
            }
            InnerMessage::Eos => self.on_end_of_stream(state),
            InnerMessage::Buffering { percent } => {
                self.notify(PlayerEvent::BufferingPercent { percent: *percent });
                None
            }
            InnerMessage::ResolutionChanged { width, height } => {
                self.notify(PlayerEvent::VideoSizeChanged {
                    width: *width,
                    height: *height,
                });
                None
            }
            InnerMessage::BufferingTime { queue_id, time_ns } => {
                debug!("queue {} buffered {} us", queue_id, time::ns_to_us(*time_ns));
                None
            }
            InnerMessage::BufferingUsedQueues { count } => {
                debug!("{} queues buffering", count);
                None
            }
            InnerMessage::PositionTick { tag } if *tag == POSITION_TICK => {
                if self.tick_armed() {
                    self.report_position();
                }
                None
            }
            _ => None,
        }
    }

    /// Settle a latched seek or rate change; seeking wins when both are set
    fn resolve_async_done(&mut self) {
        let (seeking, rating) = {
            let fields = self.shared.lock();
            (fields.is_seeking, fields.is_rating)
        };

        if seeking {
            let position_us = self.refresh_position();
            self.shared.update(|f| f.is_seeking = false);
            let position_ms = time::us_to_ms(position_us);
            self.notify(PlayerEvent::SeekDone { position_ms });
            self.notify(PlayerEvent::PositionUpdate { position_ms });
        } else if rating {
            let pending = self.take_pending_rate();
            let rate = self.shared.update(|f| {
                if let Some(rate) = pending {
                    f.rate = rate;
                }
                f.is_rating = false;
                f.rate
            });
            self.notify(PlayerEvent::SpeedDone { rate });
            self.report_position();
        }
    }

    /// Only reached from states that react to the engine
    fn on_end_of_stream(&mut self, state: StateTag) -> Option<StateTag> {
        if state == StateTag::PlaybackCompleted {
            debug!("end of stream repeated in {:?}", state);
            return None;
        }

        let looping = self.shared.lock().looping;
        self.report_position();
        self.notify(PlayerEvent::EndOfStream { looping });

        if looping {
            let rewind = SeekAction::new(0, SeekMode::PreviousSync, SeekOrigin::Internal);
            match self.enqueue(Box::new(rewind)) {
                Ok(()) => return None,
                Err(e) => warn!("looping rewind failed: {}", e),
            }
        }
        Some(StateTag::PlaybackCompleted)
    }

    fn on_engine_error(&mut self, msg: &InnerMessage) {
        if let InnerMessage::Error { code, text } = msg {
            warn!("engine error ({}): {}", code, text);
            self.shared.update(|f| f.error_occurred = true);
            self.notify(PlayerEvent::Error { code: *code });
        }
    }

    fn on_element_setup(&self, msg: &InnerMessage) {
        if let InnerMessage::ElementSetup(info) = msg {
            let listener = self.shared.lock().listener.clone();
            match listener {
                Some(listener) => listener(info),
                None => debug!("element {} ({}) created", info.name, info.factory),
            }
        }
    }
}

impl StateHooks<StateTag> for PlayerCore {
    type Message = InnerMessage;

    fn on_exit(&mut self, state: StateTag) {
        debug!("leaving {:?}", state);
    }

    fn on_enter(&mut self, from: Option<StateTag>, state: StateTag) -> Option<StateTag> {
        if let Some(client) = state.client_state() {
            self.shared.update(|f| f.state = client);
        }

        match state {
            StateTag::Idle => {
                if from.is_some() {
                    self.notify(PlayerEvent::StateChanged { state: PlayerState::Idle });
                }
            }
            StateTag::Preparing => {
                self.notify(PlayerEvent::BufferingStart);
            }
            StateTag::Prepared => {
                self.notify(PlayerEvent::BufferingEnd);
                self.notify(PlayerEvent::StateChanged { state: PlayerState::Prepared });
                self.refresh_duration();
            }
            StateTag::Playing => {
                self.notify(PlayerEvent::StateChanged { state: PlayerState::Playing });
                self.notify(PlayerEvent::RenderingStart);
                self.arm_tick();
            }
            StateTag::Paused => {
                self.disarm_tick();
                self.notify(PlayerEvent::StateChanged { state: PlayerState::Paused });
            }
            StateTag::Stopping => {
                self.disarm_tick();
                self.rewind = None;
                self.take_pending_rate();
                self.shared.update(|f| {
                    f.is_seeking = false;
                    f.is_rating = false;
                });
            }
            StateTag::Stopped => {
                self.shared.update(|f| f.position_us = 0);
                self.notify(PlayerEvent::StateChanged { state: PlayerState::Stopped });
            }
            StateTag::PlaybackCompleted => {
                self.disarm_tick();
                self.notify(PlayerEvent::StateChanged {
                    state: PlayerState::PlaybackCompleted,
                });
            }
        }
        None
    }

    fn on_message(&mut self, state: StateTag, msg: &InnerMessage) -> Option<StateTag> {
        let transition = match msg {
            InnerMessage::Error { .. } => {
                self.on_engine_error(msg);
                None
            }
            InnerMessage::ElementSetup(_) => {
                self.on_element_setup(msg);
                None
            }
            _ if state.reacts_to_engine() => self.react(state, msg),
            _ => None,
        };

        self.offer_to_actions(msg);
        transition
    }
}
