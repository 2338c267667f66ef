//! Dispatcher-side controller state
//!
//! [`Player`] is the dispatcher's message handler. It splits into the state
//! machine and a [`PlayerCore`] so the machine can drive the core's state
//! hooks while both live in the same struct.

use super::notify::NotifierHandle;
use super::shared::Shared;
use super::states::{Command, StateTag};
use crate::action::{ActionContext, ActionOutcome, ActionSerializer, AsyncAction, ChangeStateAction};
use crate::config::PlayerConfig;
use crate::dispatcher::{DispatcherHandle, InnerMessage, MessageHandler};
use crate::error::{Error, Result};
use crate::fsm::StateMachine;
use crate::pipeline::{MediaPipeline, PipelineFactory, PipelineState, SeekMode, StateChangeReturn};
use mpctl_common::{time, PlayerEvent, PlayerState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tag of the position tick source
pub(crate) const POSITION_TICK: u32 = 1;

/// Engine access handed to actions
pub(crate) struct Engine {
    pipeline: Option<Box<dyn MediaPipeline>>,
    shared: Arc<Shared>,
    /// Rate requested by the in-flight rate change
    pending_rate: Option<f64>,
}

impl Engine {
    fn pipeline_mut(&mut self) -> Result<&mut (dyn MediaPipeline + 'static)> {
        self.pipeline
            .as_deref_mut()
            .ok_or_else(|| Error::InvalidState("no pipeline bound".to_string()))
    }

    pub fn pipeline(&self) -> Option<&(dyn MediaPipeline + 'static)> {
        self.pipeline.as_deref()
    }
}

impl ActionContext for Engine {
    fn pipeline_state(&self) -> PipelineState {
        self.pipeline
            .as_ref()
            .map(|p| p.current_state())
            .unwrap_or(PipelineState::Null)
    }

    fn set_pipeline_state(&mut self, state: PipelineState) -> Result<StateChangeReturn> {
        self.pipeline_mut()?.set_state(state)
    }

    fn send_seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()> {
        self.pipeline_mut()?.seek(position_us, mode.flags())
    }

    fn send_speed(&mut self, rate: f64) -> Result<()> {
        self.pipeline_mut()?.set_rate(rate)?;
        self.pending_rate = Some(rate);
        Ok(())
    }

    fn set_seeking(&mut self, seeking: bool) {
        self.shared.update(|f| f.is_seeking = seeking);
    }

    fn set_rating(&mut self, rating: bool) {
        self.shared.update(|f| f.is_rating = rating);
    }
}

pub(crate) struct PlayerCore {
    pub(crate) engine: Engine,
    pub(crate) actions: ActionSerializer,
    pub(crate) outcomes: Vec<ActionOutcome>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: PlayerConfig,
    pub(crate) span: tracing::Span,
    /// Where Play resumes after a seek issued in PlaybackCompleted
    pub(crate) rewind: Option<(i64, SeekMode)>,
    notifier: NotifierHandle,
    dispatcher: DispatcherHandle<Player>,
    factory: Arc<dyn PipelineFactory>,
    pipeline_name: String,
    tick_armed: bool,
}

impl PlayerCore {
    pub fn notify(&self, event: PlayerEvent) {
        self.notifier.send(event);
    }

    pub fn enqueue(&mut self, action: Box<dyn AsyncAction>) -> Result<()> {
        self.actions
            .enqueue(&mut self.engine, action, &mut self.outcomes)
    }

    pub fn preempt(&mut self, action: Box<dyn AsyncAction>) -> Result<()> {
        self.actions
            .preempt(&mut self.engine, action, &mut self.outcomes)
    }

    pub fn offer_to_actions(&mut self, msg: &InnerMessage) {
        self.actions
            .handle_message(&mut self.engine, msg, &mut self.outcomes);
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.engine.pipeline_state()
    }

    pub fn take_pending_rate(&mut self) -> Option<f64> {
        self.engine.pending_rate.take()
    }

    /// Create the pipeline for the configured source and attach its bus
    pub fn bind_pipeline(&mut self) -> Result<()> {
        if self.engine.pipeline.is_some() {
            return Ok(());
        }

        let uri = self
            .shared
            .lock()
            .uri
            .clone()
            .ok_or_else(|| Error::InvalidState("no source set".to_string()))?;

        let mut pipeline = self.factory.create(&self.pipeline_name)?;
        pipeline.set_uri(&uri)?;
        self.dispatcher.subscribe(pipeline.bus())?;
        self.dispatcher.add_filter(pipeline.name())?;
        info!("pipeline {} bound to {}", pipeline.name(), uri);

        self.engine.pipeline = Some(pipeline);
        Ok(())
    }

    /// Drop all queued work and move the engine to READY
    ///
    /// Messages from the abandoned work are flushed so they cannot complete
    /// the stop or reach the next preparation.
    pub fn request_stop(&mut self) -> Result<()> {
        self.actions.clear_pending();
        self.dispatcher.flush_begin();
        let result = self.preempt(Box::new(ChangeStateAction::new(PlayerState::Stopped)));
        self.dispatcher.flush_end();
        result
    }

    /// Shut the pipeline down and detach its bus; the source is kept
    pub fn unbind_pipeline(&mut self) {
        let Some(mut pipeline) = self.engine.pipeline.take() else {
            return;
        };

        self.dispatcher.flush_begin();
        if let Err(e) = pipeline.set_state(PipelineState::Null) {
            warn!("failed to set {} to NULL: {}", pipeline.name(), e);
        }
        let name = pipeline.name().to_string();
        drop(pipeline);
        self.dispatcher.flush_end();

        if let Err(e) = self.dispatcher.unsubscribe() {
            warn!("unsubscribe failed: {}", e);
        }
        debug!("pipeline {} released", name);
    }

    /// Release the pipeline and forget the current source
    pub fn release_pipeline(&mut self) {
        self.unbind_pipeline();
        self.disarm_tick();
        self.actions.clear();
        self.outcomes.clear();
        self.rewind = None;
        self.engine.pending_rate = None;
        self.shared.update(|f| f.clear_media());
    }

    pub fn arm_tick(&mut self) {
        if self.tick_armed {
            return;
        }
        match self
            .dispatcher
            .add_tick_source(POSITION_TICK, self.config.position_update_interval_ms)
        {
            Ok(()) => self.tick_armed = true,
            Err(e) => warn!("failed to arm position tick: {}", e),
        }
    }

    pub fn disarm_tick(&mut self) {
        if !self.tick_armed {
            return;
        }
        if let Err(e) = self.dispatcher.remove_tick_source(POSITION_TICK) {
            warn!("failed to disarm position tick: {}", e);
        }
        self.tick_armed = false;
    }

    pub fn tick_armed(&self) -> bool {
        self.tick_armed
    }

    /// Query the pipeline and cache a known duration
    pub fn refresh_duration(&mut self) -> i64 {
        let queried = self.engine.pipeline().and_then(|p| p.query_duration());
        self.shared.update(|f| {
            if let Some(duration) = queried.filter(|d| *d > 0) {
                f.duration_us = duration;
            }
            f.duration_us
        })
    }

    /// Query the pipeline and cache the position
    pub fn refresh_position(&mut self) -> i64 {
        let queried = self.engine.pipeline().and_then(|p| p.query_position());
        self.shared.update(|f| {
            if let Some(position) = queried {
                f.position_us = position;
            }
            f.position_us
        })
    }

    pub fn report_position(&mut self) {
        let position_us = self.refresh_position();
        self.notify(PlayerEvent::PositionUpdate {
            position_ms: time::us_to_ms(position_us),
        });
    }

    /// Clamp a seek target to the media duration when it is known
    pub fn clamp_position(&mut self, position_us: i64) -> i64 {
        let mut duration = self.shared.lock().duration_us;
        if duration <= 0 {
            duration = self.refresh_duration();
        }
        if duration > 0 {
            position_us.clamp(0, duration)
        } else {
            position_us.max(0)
        }
    }
}

/// Message handler owned by the dispatcher thread
pub(crate) struct Player {
    pub(crate) fsm: StateMachine<StateTag>,
    pub(crate) core: PlayerCore,
}

impl Player {
    pub fn new(
        config: PlayerConfig,
        shared: Arc<Shared>,
        notifier: NotifierHandle,
        dispatcher: DispatcherHandle<Player>,
        factory: Arc<dyn PipelineFactory>,
        pipeline_name: String,
        span: tracing::Span,
    ) -> Self {
        let core = PlayerCore {
            engine: Engine {
                pipeline: None,
                shared: Arc::clone(&shared),
                pending_rate: None,
            },
            actions: ActionSerializer::new(),
            outcomes: Vec::new(),
            shared,
            config,
            span,
            rewind: None,
            notifier,
            dispatcher,
            factory,
            pipeline_name,
            tick_armed: false,
        };

        let mut player = Self {
            fsm: StateMachine::new("player").guard_transition(StateTag::Stopping, StateTag::Stopped),
            core,
        };
        player.fsm.change_state(&mut player.core, StateTag::Idle);
        player
    }

    pub fn state(&self) -> StateTag {
        self.fsm.current().unwrap_or(StateTag::Idle)
    }

    /// Evaluate a client command; the verdict is returned to the waiting caller
    pub fn handle_command(&mut self, command: Command) -> Result<()> {
        let span = self.core.span.clone();
        let _guard = span.enter();

        let state = self.state();
        let name = command.name();
        let result = match command {
            Command::Reset => {
                self.reset();
                Ok(())
            }
            command => match self.core.on_command(state, command) {
                Ok(next) => {
                    self.fsm.change_state_opt(&mut self.core, next);
                    Ok(())
                }
                Err(e) => {
                    if matches!(e, Error::InvalidState(_)) {
                        warn!("{} rejected in {:?}: {}", name, state, e);
                        self.core.notify(PlayerEvent::Error { code: e.code() });
                    } else {
                        warn!("{} failed in {:?}: {}", name, state, e);
                    }
                    Err(e)
                }
            },
        };

        self.settle();
        result
    }

    /// Feed action outcomes to the current state until none are left
    fn settle(&mut self) {
        while !self.core.outcomes.is_empty() {
            let outcome = self.core.outcomes.remove(0);
            let next = self.core.on_action_outcome(self.state(), outcome);
            self.fsm.change_state_opt(&mut self.core, next);
        }
    }

    /// Drop the pipeline and return to Idle
    pub fn reset(&mut self) {
        info!("reset from {:?}", self.state());
        self.core.release_pipeline();
        self.fsm.reset_to(&mut self.core, StateTag::Idle);
    }
}

impl MessageHandler for Player {
    fn on_message(&mut self, msg: InnerMessage) {
        let span = self.core.span.clone();
        let _guard = span.enter();

        self.fsm.handle_message(&mut self.core, &msg);
        self.settle();
    }
}
