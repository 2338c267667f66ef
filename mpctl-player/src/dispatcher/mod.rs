//! Message dispatcher
//!
//! One dedicated OS thread per controller runs a single-threaded tokio
//! runtime. The loop multiplexes three inputs:
//!
//! - control requests (jobs, tick sources, bus subscription, filters)
//! - raw messages from the subscribed pipeline bus
//! - ticks from periodic tick sources
//!
//! Every job and every converted message reaches the handler on that
//! thread, in arrival order, so the handler needs no locking of its own.

pub mod converter;
pub mod message;

pub use converter::{Conversion, DefaultMessageConverter, MessageConverter};
pub use message::{ElementInfo, InnerMessage};

use crate::error::{Error, Result};
use crate::pipeline::{BusReceiver, MessageBus, RawMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Receives every converted message on the dispatcher thread
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, msg: InnerMessage);
}

/// Work executed on the dispatcher thread with exclusive handler access
pub type Job<H> = Box<dyn FnOnce(&mut H) + Send>;

enum Control<H> {
    Job(Job<H>),
    AddTick { tag: u32, interval: Duration },
    RemoveTick(u32),
    Subscribe(MessageBus),
    Unsubscribe,
    AddFilter(String),
    Shutdown,
}

/// Cloneable sender side of a dispatcher
///
/// Requests are processed in order on the next loop turn, so a handle may be
/// used from the dispatcher thread itself.
pub struct DispatcherHandle<H> {
    name: Arc<str>,
    control: mpsc::UnboundedSender<Control<H>>,
    bus: Arc<Mutex<Option<MessageBus>>>,
    worker: Arc<Mutex<Option<ThreadId>>>,
}

impl<H> Clone for DispatcherHandle<H> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            control: self.control.clone(),
            bus: Arc::clone(&self.bus),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<H> std::fmt::Debug for DispatcherHandle<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("name", &self.name)
            .field("closed", &self.control.is_closed())
            .finish()
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<H: MessageHandler> DispatcherHandle<H> {
    fn send(&self, control: Control<H>) -> Result<()> {
        self.control
            .send(control)
            .map_err(|_| Error::Released(format!("dispatcher {} stopped", self.name)))
    }

    /// Run `job` on the dispatcher thread
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut H) + Send + 'static,
    {
        self.send(Control::Job(Box::new(job)))
    }

    /// Start a periodic `PositionTick { tag }`; replaces an existing source with the same tag
    pub fn add_tick_source(&self, tag: u32, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return Err(Error::InvalidValue("tick interval must be positive".to_string()));
        }
        self.send(Control::AddTick {
            tag,
            interval: Duration::from_millis(interval_ms),
        })
    }

    pub fn remove_tick_source(&self, tag: u32) -> Result<()> {
        self.send(Control::RemoveTick(tag))
    }

    /// Attach a pipeline bus; any previous subscription is dropped
    pub fn subscribe(&self, bus: MessageBus) -> Result<()> {
        *locked(&self.bus) = Some(bus.clone());
        self.send(Control::Subscribe(bus))
    }

    pub fn unsubscribe(&self) -> Result<()> {
        *locked(&self.bus) = None;
        self.send(Control::Unsubscribe)
    }

    /// Allow non-error messages whose source is `name`
    pub fn add_filter(&self, name: &str) -> Result<()> {
        self.send(Control::AddFilter(name.to_string()))
    }

    /// Drop everything posted on the subscribed bus until `flush_end`
    pub fn flush_begin(&self) {
        if let Some(bus) = locked(&self.bus).as_ref() {
            debug!("[{}] flush begin on {}", self.name, bus.name());
            bus.set_flushing(true);
        }
    }

    pub fn flush_end(&self) {
        if let Some(bus) = locked(&self.bus).as_ref() {
            debug!("[{}] flush end on {}", self.name, bus.name());
            bus.set_flushing(false);
        }
    }

    /// Whether the caller runs on this dispatcher's thread
    pub fn is_dispatcher_thread(&self) -> bool {
        *locked(&self.worker) == Some(std::thread::current().id())
    }
}

/// Owner of the dispatcher thread
///
/// `reset` (or drop) stops the loop and joins the thread; the handler is
/// dropped on the joining thread after the loop has exited.
pub struct MessageDispatcher<H: MessageHandler> {
    handle: DispatcherHandle<H>,
    worker: Option<JoinHandle<H>>,
}

impl<H: MessageHandler> MessageDispatcher<H> {
    /// Start the dispatcher with the default converter
    ///
    /// `make_handler` receives a handle to the dispatcher being started.
    /// Returns once the event loop is running.
    pub fn init<F>(name: &str, make_handler: F) -> Result<Self>
    where
        F: FnOnce(DispatcherHandle<H>) -> H,
    {
        Self::init_with_converter(name, Box::new(DefaultMessageConverter), make_handler)
    }

    pub fn init_with_converter<F>(
        name: &str,
        converter: Box<dyn MessageConverter>,
        make_handler: F,
    ) -> Result<Self>
    where
        F: FnOnce(DispatcherHandle<H>) -> H,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = DispatcherHandle {
            name: Arc::from(name),
            control: control_tx,
            bus: Arc::new(Mutex::new(None)),
            worker: Arc::new(Mutex::new(None)),
        };
        let handler = make_handler(handle.clone());

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(0);
        let loop_name = handle.name.clone();

        let join = std::thread::Builder::new()
            .name("mpctl-dispatch".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return handler;
                    }
                };

                let mut event_loop = EventLoop::new(loop_name, handler, converter, control_rx);
                runtime.block_on(async {
                    let _ = ready_tx.send(Ok(()));
                    event_loop.run().await;
                });
                event_loop.into_handler()
            })?;

        *locked(&handle.worker) = Some(join.thread().id());

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("[{}] dispatcher started", name);
                Ok(Self {
                    handle,
                    worker: Some(join),
                })
            }
            Ok(Err(reason)) => {
                let _ = join.join();
                Err(Error::Internal(format!("dispatcher runtime failed: {}", reason)))
            }
            Err(_) => {
                let _ = join.join();
                Err(Error::Internal("dispatcher thread exited during startup".to_string()))
            }
        }
    }

    pub fn handle(&self) -> DispatcherHandle<H> {
        self.handle.clone()
    }

    /// Stop the loop, abort tick sources, drop the subscription and join the thread
    ///
    /// Idempotent. Fails when called from the dispatcher thread itself.
    pub fn reset(&mut self) -> Result<()> {
        if self.handle.is_dispatcher_thread() {
            return Err(Error::Internal(
                "dispatcher reset from its own thread".to_string(),
            ));
        }

        let Some(join) = self.worker.take() else {
            return Ok(());
        };

        let _ = self.handle.control.send(Control::Shutdown);
        match join.join() {
            Ok(handler) => {
                drop(handler);
                info!("[{}] dispatcher stopped", self.handle.name);
                Ok(())
            }
            Err(_) => Err(Error::Internal(format!(
                "dispatcher {} thread panicked",
                self.handle.name
            ))),
        }
    }
}

impl<H: MessageHandler> Drop for MessageDispatcher<H> {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            error!("Dispatcher teardown failed: {}", e);
        }
    }
}

struct Subscription {
    bus: MessageBus,
    receiver: BusReceiver,
}

struct EventLoop<H> {
    name: Arc<str>,
    handler: H,
    converter: Box<dyn MessageConverter>,
    control: mpsc::UnboundedReceiver<Control<H>>,
    tick_tx: mpsc::UnboundedSender<u32>,
    tick_rx: mpsc::UnboundedReceiver<u32>,
    ticks: HashMap<u32, tokio::task::JoinHandle<()>>,
    subscription: Option<Subscription>,
    filters: Vec<String>,
}

impl<H: MessageHandler> EventLoop<H> {
    fn new(
        name: Arc<str>,
        handler: H,
        converter: Box<dyn MessageConverter>,
        control: mpsc::UnboundedReceiver<Control<H>>,
    ) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            name,
            handler,
            converter,
            control,
            tick_tx,
            tick_rx,
            ticks: HashMap::new(),
            subscription: None,
            filters: Vec::new(),
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(Control::Shutdown) | None => break,
                    Some(control) => self.on_control(control),
                },

                Some(raw) = next_raw(&mut self.subscription) => self.on_raw(raw),

                Some(tag) = self.tick_rx.recv() => self.on_tick(tag),
            }
        }
        self.teardown();
    }

    fn on_control(&mut self, control: Control<H>) {
        match control {
            Control::Job(job) => job(&mut self.handler),
            Control::AddTick { tag, interval } => self.add_tick(tag, interval),
            Control::RemoveTick(tag) => {
                if let Some(task) = self.ticks.remove(&tag) {
                    task.abort();
                    debug!("[{}] tick source {} removed", self.name, tag);
                }
            }
            Control::Subscribe(bus) => self.subscribe(bus),
            Control::Unsubscribe => self.unsubscribe(),
            Control::AddFilter(source) => {
                if !self.filters.contains(&source) {
                    debug!("[{}] filter added for {}", self.name, source);
                    self.filters.push(source);
                }
            }
            Control::Shutdown => {}
        }
    }

    fn add_tick(&mut self, tag: u32, interval: Duration) {
        if let Some(previous) = self.ticks.remove(&tag) {
            previous.abort();
        }

        let tick_tx = self.tick_tx.clone();
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                if tick_tx.send(tag).is_err() {
                    break;
                }
            }
        });
        self.ticks.insert(tag, task);
        debug!("[{}] tick source {} every {:?}", self.name, tag, interval);
    }

    fn on_tick(&mut self, tag: u32) {
        // A tick queued just before its source was removed
        if !self.ticks.contains_key(&tag) {
            trace!("[{}] stale tick {} dropped", self.name, tag);
            return;
        }
        self.handler.on_message(InnerMessage::PositionTick { tag });
    }

    fn subscribe(&mut self, bus: MessageBus) {
        if let Some(current) = &self.subscription {
            if current.bus.same_bus(&bus) {
                return;
            }
        }
        self.unsubscribe();

        match bus.take_receiver() {
            Some(receiver) => {
                debug!("[{}] subscribed to bus {}", self.name, bus.name());
                self.subscription = Some(Subscription { bus, receiver });
            }
            None => warn!("[{}] bus {} already has a subscriber", self.name, bus.name()),
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(Subscription { bus, receiver }) = self.subscription.take() {
            debug!("[{}] unsubscribed from bus {}", self.name, bus.name());
            bus.restore_receiver(receiver);
        }
    }

    fn on_raw(&mut self, raw: RawMessage) {
        let dropped = self
            .subscription
            .as_ref()
            .map(|sub| sub.bus.is_flushing() || sub.bus.is_stale(&raw))
            .unwrap_or(true);
        if dropped {
            trace!("[{}] flushed message from {} dropped", self.name, raw.source);
            return;
        }

        if !raw.is_error() && !self.filters.iter().any(|source| *source == raw.source) {
            trace!("[{}] filtered message from {}", self.name, raw.source);
            return;
        }

        match self.converter.convert(&raw) {
            Ok(Conversion::Message(msg)) => {
                trace!("[{}] dispatch {} from {}", self.name, msg.kind(), raw.source);
                self.handler.on_message(msg);
            }
            Ok(Conversion::Ignored) => {}
            Err(e) => warn!("[{}] failed to convert message from {}: {}", self.name, raw.source, e),
        }
    }

    fn teardown(&mut self) {
        for (_, task) in self.ticks.drain() {
            task.abort();
        }
        self.unsubscribe();
        debug!("[{}] event loop exited", self.name);
    }

    fn into_handler(self) -> H {
        self.handler
    }
}

async fn next_raw(subscription: &mut Option<Subscription>) -> Option<RawMessage> {
    match subscription {
        Some(sub) => sub.receiver.recv().await,
        None => std::future::pending().await,
    }
}
