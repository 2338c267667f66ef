//! Test helpers for mpctl-player integration tests
//!
//! Provides:
//! - EventRecorder: observer that keeps every notification and lets tests
//!   block until a matching one shows up
//! - TestPlayer: controller wired to a fast simulated engine

#![allow(dead_code)]

use mpctl_player::config::SimConfig;
use mpctl_player::pipeline::{SimControl, SimPipelineFactory};
use mpctl_player::{PlayerConfig, PlayerController, PlayerEvent, PlayerObserver, PlayerState};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<PlayerEvent>>,
    arrived: Condvar,
}

impl PlayerObserver for EventRecorder {
    fn on_event(&self, event: &PlayerEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.arrived.notify_all();
    }
}

impl EventRecorder {
    pub fn snapshot(&self) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn count(&self, pred: impl Fn(&PlayerEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Events recorded after the first `from`
    pub fn since(&self, from: usize) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().iter().skip(from).cloned().collect()
    }

    /// Block until an event at index `from` or later matches `pred`
    pub fn wait_for_from(
        &self,
        from: usize,
        timeout: Duration,
        pred: impl Fn(&PlayerEvent) -> bool,
    ) -> Option<PlayerEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(found) = events.iter().skip(from).find(|e| pred(e)) {
                return Some(found.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            events = self.arrived.wait_timeout(events, deadline - now).unwrap().0;
        }
    }

    pub fn wait_for(&self, pred: impl Fn(&PlayerEvent) -> bool) -> Option<PlayerEvent> {
        self.wait_for_from(0, WAIT, pred)
    }

    pub fn wait_for_state(&self, state: PlayerState) -> bool {
        self.wait_for(|e| *e == PlayerEvent::StateChanged { state }).is_some()
    }

    pub fn wait_for_state_from(&self, from: usize, state: PlayerState) -> bool {
        self.wait_for_from(from, WAIT, |e| *e == PlayerEvent::StateChanged { state })
            .is_some()
    }
}

/// Engine timing short enough for tests
pub fn fast_sim() -> SimConfig {
    SimConfig {
        duration_ms: 10_000,
        state_change_delay_ms: 2,
        seek_delay_ms: 2,
        keyframe_interval_ms: 500,
        ..Default::default()
    }
}

pub fn fast_config(sim: SimConfig) -> PlayerConfig {
    PlayerConfig {
        position_update_interval_ms: 50,
        prepare_timeout_ms: 3000,
        sim,
        ..Default::default()
    }
}

pub struct TestPlayer {
    pub player: Arc<PlayerController>,
    pub events: Arc<EventRecorder>,
    pub factory: Arc<SimPipelineFactory>,
}

impl TestPlayer {
    pub fn new() -> Self {
        Self::with_sim(fast_sim())
    }

    pub fn with_sim(sim: SimConfig) -> Self {
        Self::with_config(fast_config(sim))
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        let events = Arc::new(EventRecorder::default());
        let factory = Arc::new(SimPipelineFactory::new(config.sim.clone()));
        let observer: Arc<dyn PlayerObserver> = events.clone();
        let player = PlayerController::new(config, factory.clone(), Some(observer))
            .expect("controller starts");
        Self {
            player: Arc::new(player),
            events,
            factory,
        }
    }

    /// Source set and prepared
    pub fn prepared() -> Self {
        Self::prepared_with(fast_sim())
    }

    pub fn prepared_with(sim: SimConfig) -> Self {
        let test = Self::with_sim(sim);
        test.player.set_source("sim://clip").unwrap();
        test.player.prepare().unwrap();
        assert!(test.events.wait_for_state(PlayerState::Prepared));
        test
    }

    /// Source set, prepared and playing
    pub fn playing() -> Self {
        Self::playing_with(fast_sim())
    }

    pub fn playing_with(sim: SimConfig) -> Self {
        let test = Self::prepared_with(sim);
        test.player.play().unwrap();
        assert!(test.events.wait_for_state(PlayerState::Playing));
        test
    }

    pub fn control(&self) -> SimControl {
        self.factory.control().expect("pipeline created")
    }

    /// Poll until the controller has no queued or executing action
    pub fn wait_idle(&self) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if self.player.pending_actions().unwrap() == 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

pub fn is_error(event: &PlayerEvent) -> bool {
    matches!(event, PlayerEvent::Error { .. })
}

pub fn is_seek_done(event: &PlayerEvent) -> bool {
    matches!(event, PlayerEvent::SeekDone { .. })
}

pub fn is_position(event: &PlayerEvent) -> bool {
    matches!(event, PlayerEvent::PositionUpdate { .. })
}
