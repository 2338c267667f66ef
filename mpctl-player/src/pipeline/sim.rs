//! In-process simulated media pipeline
//!
//! Behaves like a real engine from the controller's point of view: state
//! changes step one level at a time on a worker thread and are confirmed by
//! bus messages, seeks snap to sync frames and finish with an async-done,
//! position follows a wall clock scaled by the playback rate, and EOS is
//! posted once the position reaches the media duration.

use super::{
    ErrorDomain, MediaPipeline, MessageBus, PipelineFactory, PipelineState, RawBody, RawMessage,
    SeekFlags, StateChangeReturn,
};
use crate::config::SimConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the worker checks for end of stream while idle
const EOS_POLL: Duration = Duration::from_millis(5);

const SOURCE_ELEMENT: &str = "sim-source";
const DECODER_ELEMENT: &str = "sim-decoder";

const SUPPORTED_SCHEMES: [&str; 4] = ["file://", "sim://", "http://", "https://"];

#[derive(Debug)]
struct SimClock {
    state: PipelineState,
    base_us: i64,
    playing_since: Option<Instant>,
    rate: f64,
    prerolled: bool,
    eos_posted: bool,
}

impl SimClock {
    fn new() -> Self {
        Self {
            state: PipelineState::Null,
            base_us: 0,
            playing_since: None,
            rate: 1.0,
            prerolled: false,
            eos_posted: false,
        }
    }

    fn position_us(&self, duration_us: i64) -> i64 {
        let advanced = self
            .playing_since
            .map(|since| (since.elapsed().as_micros() as f64 * self.rate) as i64)
            .unwrap_or(0);
        (self.base_us + advanced).clamp(0, duration_us)
    }

    /// Restart the clock from `position_us`, keeping it running if it was
    fn rebase(&mut self, position_us: i64) {
        self.base_us = position_us;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }
}

#[derive(Debug)]
struct SimShared {
    clock: Mutex<SimClock>,
    shutdown: AtomicBool,
    duration_us: i64,
    /// Requests sent to the worker and not yet answered
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimShared {
    fn clock(&self) -> MutexGuard<'_, SimClock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn position_us(&self) -> i64 {
        self.clock().position_us(self.duration_us)
    }

    fn begin_request(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn end_request(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

enum SimRequest {
    ChangeState(PipelineState),
    Seek(i64),
    SetRate(f64),
    Shutdown,
}

/// Fault switches shared by a factory and every pipeline it creates
#[derive(Debug, Default)]
pub struct SimFaults {
    fail_next_state_change: AtomicBool,
}

impl SimFaults {
    /// Make the next `set_state` call fail synchronously
    pub fn fail_next_state_change(&self) {
        self.fail_next_state_change.store(true, Ordering::SeqCst);
    }

    fn take_state_change_failure(&self) -> bool {
        self.fail_next_state_change.swap(false, Ordering::SeqCst)
    }
}

/// Test and CLI handle onto a running simulated pipeline
#[derive(Debug, Clone)]
pub struct SimControl {
    name: String,
    bus: MessageBus,
    shared: Arc<SimShared>,
}

impl SimControl {
    /// Post an asynchronous error from an internal element
    pub fn post_error(&self, text: &str) {
        self.bus.post(RawMessage::new(
            DECODER_ELEMENT,
            RawBody::Error {
                domain: ErrorDomain::Stream,
                text: text.to_string(),
            },
        ));
    }

    pub fn post_buffering(&self, percent: i32) {
        self.bus
            .post(RawMessage::from_pipeline(self.name.as_str(), RawBody::Buffering { percent }));
    }

    /// Post an arbitrary message
    pub fn post(&self, msg: RawMessage) {
        self.bus.post(msg);
    }

    pub fn state(&self) -> PipelineState {
        self.shared.clock().state
    }

    pub fn position_us(&self) -> i64 {
        self.shared.position_us()
    }

    pub fn rate(&self) -> f64 {
        self.shared.clock().rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Most requests ever outstanding at once
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Simulated pipeline with its own worker thread
pub struct SimPipeline {
    name: String,
    bus: MessageBus,
    config: SimConfig,
    uri: Option<String>,
    requested: PipelineState,
    shared: Arc<SimShared>,
    faults: Arc<SimFaults>,
    requests: Sender<SimRequest>,
    worker: Option<JoinHandle<()>>,
}

impl SimPipeline {
    pub fn new(name: &str, config: SimConfig) -> Result<Self> {
        Self::with_faults(name, config, Arc::new(SimFaults::default()))
    }

    pub fn with_faults(name: &str, config: SimConfig, faults: Arc<SimFaults>) -> Result<Self> {
        let bus = MessageBus::new(name);
        let duration_us = mpctl_common::time::ms_to_us(config.duration_ms as i64);
        let shared = Arc::new(SimShared {
            clock: Mutex::new(SimClock::new()),
            shutdown: AtomicBool::new(false),
            duration_us,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let (requests, request_rx) = crossbeam_channel::unbounded();

        let worker = SimWorker {
            name: name.to_string(),
            bus: bus.clone(),
            config: config.clone(),
            shared: Arc::clone(&shared),
        };
        let join = std::thread::Builder::new()
            .name(format!("sim-{}", name))
            .spawn(move || worker.run(request_rx))?;

        debug!("[{}] simulated pipeline created, duration {} us", name, duration_us);

        Ok(Self {
            name: name.to_string(),
            bus,
            config,
            uri: None,
            requested: PipelineState::Null,
            shared,
            faults,
            requests,
            worker: Some(join),
        })
    }

    pub fn control(&self) -> SimControl {
        SimControl {
            name: self.name.clone(),
            bus: self.bus.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    fn send(&self, request: SimRequest) -> Result<()> {
        self.shared.begin_request();
        self.requests.send(request).map_err(|_| {
            self.shared.end_request();
            Error::Engine(format!("[{}] worker stopped", self.name))
        })
    }

    /// Snap a seek target to the sync-frame grid unless an accurate seek was asked for
    fn align(&self, position_us: i64, flags: SeekFlags) -> i64 {
        let interval = mpctl_common::time::ms_to_us(self.config.keyframe_interval_ms as i64);
        let aligned = if interval <= 0 || !flags.contains(SeekFlags::KEY_UNIT) {
            position_us
        } else if flags.contains(SeekFlags::SNAP_AFTER) {
            (position_us + interval - 1) / interval * interval
        } else if flags.contains(SeekFlags::SNAP_NEAREST) {
            (position_us + interval / 2) / interval * interval
        } else {
            position_us / interval * interval
        };
        aligned.clamp(0, self.shared.duration_us)
    }

    fn require_prerolled(&self, what: &str) -> Result<()> {
        let state = self.shared.clock().state;
        if state < PipelineState::Paused {
            return Err(Error::Engine(format!("{} not possible in {}", what, state)));
        }
        Ok(())
    }
}

impl MediaPipeline for SimPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn bus(&self) -> MessageBus {
        self.bus.clone()
    }

    fn set_uri(&mut self, uri: &str) -> Result<()> {
        if uri.is_empty() {
            return Err(Error::InvalidValue("empty uri".to_string()));
        }
        if !SUPPORTED_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            return Err(Error::Unsupported(format!("uri scheme of {}", uri)));
        }
        if self.shared.clock().state > PipelineState::Ready {
            return Err(Error::Engine("uri can only change in NULL or READY".to_string()));
        }
        self.uri = Some(uri.to_string());
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<StateChangeReturn> {
        if self.faults.take_state_change_failure() {
            warn!("[{}] injected failure for set_state({})", self.name, state);
            return Err(Error::Engine(format!("state change to {} failed", state)));
        }
        if state == PipelineState::VoidPending {
            return Err(Error::InvalidValue("VOID_PENDING is not a target".to_string()));
        }
        if state >= PipelineState::Ready && self.uri.is_none() {
            return Err(Error::Engine("no uri set".to_string()));
        }

        let current = self.shared.clock().state;
        if state == self.requested {
            return Ok(if state == current {
                StateChangeReturn::Success
            } else {
                StateChangeReturn::Async
            });
        }

        self.requested = state;
        self.send(SimRequest::ChangeState(state))?;
        Ok(StateChangeReturn::Async)
    }

    fn current_state(&self) -> PipelineState {
        self.shared.clock().state
    }

    fn seek(&mut self, position_us: i64, flags: SeekFlags) -> Result<()> {
        self.require_prerolled("seek")?;
        if !flags.contains(SeekFlags::FLUSH) {
            return Err(Error::Unsupported("non-flushing seek".to_string()));
        }
        let aligned = self.align(position_us, flags);
        debug!(
            "[{}] seek {} us (flags {:#x}) -> {} us",
            self.name,
            position_us,
            flags.bits(),
            aligned
        );
        self.send(SimRequest::Seek(aligned))
    }

    fn set_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidValue(format!("rate {}", rate)));
        }
        self.require_prerolled("rate change")?;
        self.send(SimRequest::SetRate(rate))
    }

    fn query_duration(&self) -> Option<i64> {
        self.shared
            .clock()
            .prerolled
            .then_some(self.shared.duration_us)
    }

    fn query_position(&self) -> Option<i64> {
        let clock = self.shared.clock();
        (clock.state >= PipelineState::Paused).then(|| clock.position_us(self.shared.duration_us))
    }
}

impl Drop for SimPipeline {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _ = self.requests.send(SimRequest::Shutdown);
        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
        debug!("[{}] simulated pipeline released", self.name);
    }
}

struct SimWorker {
    name: String,
    bus: MessageBus,
    config: SimConfig,
    shared: Arc<SimShared>,
}

impl SimWorker {
    fn run(self, requests: Receiver<SimRequest>) {
        loop {
            match requests.recv_timeout(EOS_POLL) {
                Ok(SimRequest::ChangeState(target)) => self.step_to(target),
                Ok(SimRequest::Seek(position_us)) => self.finish_seek(position_us),
                Ok(SimRequest::SetRate(rate)) => self.finish_rate(rate),
                Ok(SimRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => self.check_eos(),
            }
        }
    }

    fn stopping(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn post(&self, body: RawBody) {
        self.bus
            .post(RawMessage::from_pipeline(self.name.as_str(), body));
    }

    fn step_to(&self, target: PipelineState) {
        loop {
            if self.stopping() {
                return;
            }
            let current = self.shared.clock().state;
            if current == target {
                self.shared.end_request();
                return;
            }

            let next = if target > current {
                step_up(current)
            } else {
                step_down(current)
            };
            std::thread::sleep(Duration::from_millis(self.config.state_change_delay_ms));
            if self.stopping() {
                return;
            }

            self.enter(current, next);

            if self.config.child_messages {
                self.bus.post(RawMessage::new(
                    DECODER_ELEMENT,
                    RawBody::StateChanged {
                        old: current,
                        new: next,
                        pending: PipelineState::VoidPending,
                    },
                ));
            }
            let pending = if next == target {
                self.shared.end_request();
                PipelineState::VoidPending
            } else {
                target
            };
            self.post(RawBody::StateChanged {
                old: current,
                new: next,
                pending,
            });
            if next == target {
                return;
            }
        }
    }

    /// Apply one state step and post the messages that precede its state-changed
    fn enter(&self, old: PipelineState, new: PipelineState) {
        {
            let mut clock = self.shared.clock();
            match (old, new) {
                (PipelineState::Ready, PipelineState::Paused) => {
                    clock.prerolled = true;
                }
                (PipelineState::Paused, PipelineState::Playing) => {
                    clock.playing_since = Some(Instant::now());
                }
                (PipelineState::Playing, PipelineState::Paused) => {
                    clock.base_us = clock.position_us(self.shared.duration_us);
                    clock.playing_since = None;
                }
                (PipelineState::Paused, PipelineState::Ready) => {
                    *clock = SimClock {
                        state: PipelineState::Ready,
                        ..SimClock::new()
                    };
                }
                _ => {}
            }
            clock.state = new;
        }

        match (old, new) {
            (PipelineState::Null, PipelineState::Ready) => {
                for (element, factory) in [(SOURCE_ELEMENT, "simsrc"), (DECODER_ELEMENT, "simdec")] {
                    self.post(RawBody::ElementSetup {
                        element: element.to_string(),
                        factory: factory.to_string(),
                    });
                }
            }
            (PipelineState::Ready, PipelineState::Paused) => {
                let fields = HashMap::from([
                    ("width".to_string(), self.config.video_width as i64),
                    ("height".to_string(), self.config.video_height as i64),
                ]);
                self.post(RawBody::Element {
                    structure: "resolution-changed".to_string(),
                    fields,
                });
                self.post(RawBody::Buffering { percent: 100 });
                self.post(RawBody::DurationChanged);
                self.post(RawBody::AsyncDone);
            }
            _ => {}
        }
    }

    fn finish_seek(&self, position_us: i64) {
        std::thread::sleep(Duration::from_millis(self.config.seek_delay_ms));
        if self.stopping() {
            return;
        }
        {
            let mut clock = self.shared.clock();
            clock.rebase(position_us);
            clock.eos_posted = false;
        }
        debug!("[{}] seek complete at {} us", self.name, position_us);
        self.shared.end_request();
        self.post(RawBody::AsyncDone);
    }

    fn finish_rate(&self, rate: f64) {
        std::thread::sleep(Duration::from_millis(self.config.seek_delay_ms));
        if self.stopping() {
            return;
        }
        {
            let mut clock = self.shared.clock();
            let position = clock.position_us(self.shared.duration_us);
            clock.rebase(position);
            clock.rate = rate;
        }
        debug!("[{}] rate set to {}", self.name, rate);
        self.shared.end_request();
        self.post(RawBody::AsyncDone);
    }

    fn check_eos(&self) {
        let reached = {
            let mut clock = self.shared.clock();
            let at_end = clock.state == PipelineState::Playing
                && !clock.eos_posted
                && clock.position_us(self.shared.duration_us) >= self.shared.duration_us;
            if at_end {
                clock.eos_posted = true;
            }
            at_end
        };
        if reached {
            info!("[{}] end of stream", self.name);
            self.post(RawBody::Eos);
        }
    }
}

fn step_up(state: PipelineState) -> PipelineState {
    match state {
        PipelineState::VoidPending => PipelineState::Null,
        PipelineState::Null => PipelineState::Ready,
        PipelineState::Ready => PipelineState::Paused,
        PipelineState::Paused | PipelineState::Playing => PipelineState::Playing,
    }
}

fn step_down(state: PipelineState) -> PipelineState {
    match state {
        PipelineState::Playing => PipelineState::Paused,
        PipelineState::Paused => PipelineState::Ready,
        PipelineState::Ready | PipelineState::Null | PipelineState::VoidPending => {
            PipelineState::Null
        }
    }
}

/// Creates [`SimPipeline`]s that share one set of fault switches
#[derive(Debug, Default)]
pub struct SimPipelineFactory {
    config: SimConfig,
    faults: Arc<SimFaults>,
    last: Mutex<Option<SimControl>>,
    created: AtomicUsize,
}

impl SimPipelineFactory {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn faults(&self) -> &SimFaults {
        &self.faults
    }

    /// Control handle for the most recently created pipeline
    pub fn control(&self) -> Option<SimControl> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl PipelineFactory for SimPipelineFactory {
    fn create(&self, name: &str) -> Result<Box<dyn MediaPipeline>> {
        let pipeline = SimPipeline::with_faults(name, self.config.clone(), Arc::clone(&self.faults))?;
        *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pipeline.control());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BusReceiver, SeekMode};

    fn fast_config() -> SimConfig {
        SimConfig {
            duration_ms: 2000,
            state_change_delay_ms: 1,
            seek_delay_ms: 1,
            ..Default::default()
        }
    }

    /// Receive until `pred` matches or two seconds pass
    fn wait_for(rx: &mut BusReceiver, pred: impl Fn(&RawMessage) -> bool) -> Option<RawMessage> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(msg) if pred(&msg) => return Some(msg),
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        None
    }

    fn pipeline_state_changed(name: &str, target: PipelineState) -> impl Fn(&RawMessage) -> bool + '_ {
        move |msg| {
            msg.source == name
                && matches!(msg.body, RawBody::StateChanged { new, .. } if new == target)
        }
    }

    fn prerolled(name: &str) -> (SimPipeline, BusReceiver) {
        let mut pipeline = SimPipeline::new(name, fast_config()).unwrap();
        let mut rx = pipeline.bus().take_receiver().unwrap();
        pipeline.set_uri("sim://clip").unwrap();
        pipeline.set_state(PipelineState::Paused).unwrap();
        assert!(wait_for(&mut rx, pipeline_state_changed(name, PipelineState::Paused)).is_some());
        (pipeline, rx)
    }

    #[test]
    fn test_state_change_steps_through_ready() {
        let mut pipeline = SimPipeline::new("p", fast_config()).unwrap();
        let mut rx = pipeline.bus().take_receiver().unwrap();
        pipeline.set_uri("sim://clip").unwrap();

        assert_eq!(
            pipeline.set_state(PipelineState::Paused).unwrap(),
            StateChangeReturn::Async
        );

        let ready = wait_for(&mut rx, pipeline_state_changed("p", PipelineState::Ready)).unwrap();
        assert!(matches!(
            ready.body,
            RawBody::StateChanged { pending: PipelineState::Paused, .. }
        ));
        assert!(wait_for(&mut rx, pipeline_state_changed("p", PipelineState::Paused)).is_some());
        assert_eq!(pipeline.current_state(), PipelineState::Paused);
        assert_eq!(pipeline.query_duration(), Some(2_000_000));
    }

    #[test]
    fn test_same_state_is_synchronous_success() {
        let (mut pipeline, mut rx) = prerolled("p");
        while rx.try_recv().is_ok() {}

        assert_eq!(
            pipeline.set_state(PipelineState::Paused).unwrap(),
            StateChangeReturn::Success
        );
        std::thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_change_requires_uri() {
        let mut pipeline = SimPipeline::new("p", fast_config()).unwrap();
        assert!(matches!(
            pipeline.set_state(PipelineState::Ready),
            Err(Error::Engine(_))
        ));
    }

    #[test]
    fn test_unsupported_scheme() {
        let mut pipeline = SimPipeline::new("p", fast_config()).unwrap();
        assert!(matches!(pipeline.set_uri("rtsp://cam"), Err(Error::Unsupported(_))));
        assert!(matches!(pipeline.set_uri(""), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn test_seek_snaps_to_previous_sync_frame() {
        let (mut pipeline, mut rx) = prerolled("p");
        pipeline.seek(1_234_000, SeekMode::PreviousSync.flags()).unwrap();

        assert!(wait_for(&mut rx, |m| m.body == RawBody::AsyncDone).is_some());
        assert_eq!(pipeline.query_position(), Some(1_000_000));
    }

    #[test]
    fn test_exact_seek_is_clamped_to_duration() {
        let (mut pipeline, mut rx) = prerolled("p");
        pipeline.seek(9_000_000, SeekMode::Closest.flags()).unwrap();

        assert!(wait_for(&mut rx, |m| m.body == RawBody::AsyncDone).is_some());
        assert_eq!(pipeline.query_position(), Some(2_000_000));
    }

    #[test]
    fn test_next_sync_seek_rounds_up() {
        let (mut pipeline, mut rx) = prerolled("p");
        pipeline.seek(1_234_000, SeekMode::NextSync.flags()).unwrap();

        assert!(wait_for(&mut rx, |m| m.body == RawBody::AsyncDone).is_some());
        assert_eq!(pipeline.query_position(), Some(1_500_000));
    }

    #[test]
    fn test_non_flushing_seek_rejected() {
        let (mut pipeline, _rx) = prerolled("p");
        assert!(matches!(
            pipeline.seek(0, SeekFlags::ACCURATE),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_sequential_requests_never_overlap() {
        let (mut pipeline, mut rx) = prerolled("p");
        let control = pipeline.control();
        assert_eq!(control.max_in_flight(), 1);

        pipeline.seek(500_000, SeekMode::Closest.flags()).unwrap();
        assert!(wait_for(&mut rx, |m| m.body == RawBody::AsyncDone).is_some());
        pipeline.set_rate(2.0).unwrap();
        assert!(wait_for(&mut rx, |m| m.body == RawBody::AsyncDone).is_some());
        assert_eq!(control.max_in_flight(), 1);
    }

    #[test]
    fn test_seek_before_preroll_fails() {
        let mut pipeline = SimPipeline::new("p", fast_config()).unwrap();
        assert!(pipeline.seek(0, SeekMode::Closest.flags()).is_err());
        assert!(pipeline.set_rate(2.0).is_err());
    }

    #[test]
    fn test_eos_posted_at_end_of_media() {
        let config = SimConfig {
            duration_ms: 50,
            ..fast_config()
        };
        let mut pipeline = SimPipeline::new("p", config).unwrap();
        let mut rx = pipeline.bus().take_receiver().unwrap();
        pipeline.set_uri("sim://short").unwrap();
        pipeline.set_state(PipelineState::Playing).unwrap();

        assert!(wait_for(&mut rx, |m| m.body == RawBody::Eos).is_some());
        assert_eq!(pipeline.query_position(), Some(50_000));
    }

    #[test]
    fn test_injected_state_change_failure() {
        let factory = SimPipelineFactory::new(fast_config());
        let mut pipeline = factory.create("p").unwrap();
        pipeline.set_uri("sim://clip").unwrap();

        factory.faults().fail_next_state_change();
        assert!(matches!(
            pipeline.set_state(PipelineState::Paused),
            Err(Error::Engine(_))
        ));
        assert!(pipeline.set_state(PipelineState::Paused).is_ok());
        assert_eq!(factory.created_count(), 1);
    }

    #[test]
    fn test_control_posts_child_error() {
        let factory = SimPipelineFactory::new(fast_config());
        let pipeline = factory.create("p").unwrap();
        let mut rx = pipeline.bus().take_receiver().unwrap();

        factory.control().unwrap().post_error("decode failed");
        let msg = wait_for(&mut rx, |m| m.is_error()).unwrap();
        assert_eq!(msg.source, DECODER_ELEMENT);
        assert!(!msg.source_is_pipeline);
    }
}
