//! Engine message bus
//!
//! The pipeline posts [`RawMessage`]s from its own threads; the dispatcher
//! owns the single receiving end while subscribed. Flushing drops everything
//! posted until the flush ends, and every message still queued when the
//! flush began is stale to the subscriber.

use super::PipelineState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Engine-level error category, carried by `RawBody::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    Core,
    Library,
    Resource,
    Stream,
}

/// Raw message body as produced by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    StateChanged {
        old: PipelineState,
        new: PipelineState,
        pending: PipelineState,
    },
    AsyncDone,
    Eos,
    Error { domain: ErrorDomain, text: String },
    Warning { text: String },
    Info { text: String },
    DurationChanged,
    Buffering { percent: i32 },
    /// Element-specific message identified by structure name
    Element {
        structure: String,
        fields: HashMap<String, i64>,
    },
    /// An element was created inside the pipeline
    ElementSetup { element: String, factory: String },
}

/// A message posted on the bus together with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Name of the posting element (or the pipeline itself)
    pub source: String,
    /// True when the top-level pipeline posted the message
    pub source_is_pipeline: bool,
    pub body: RawBody,
    /// Flush generation of the bus at post time
    pub generation: u64,
}

impl RawMessage {
    pub fn new(source: impl Into<String>, body: RawBody) -> Self {
        Self {
            source: source.into(),
            source_is_pipeline: false,
            body,
            generation: 0,
        }
    }

    /// Message posted by the top-level pipeline
    pub fn from_pipeline(source: impl Into<String>, body: RawBody) -> Self {
        Self {
            source: source.into(),
            source_is_pipeline: true,
            body,
            generation: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, RawBody::Error { .. })
    }
}

/// Receiving end handed to a subscriber
pub type BusReceiver = mpsc::UnboundedReceiver<RawMessage>;

#[derive(Debug)]
struct BusInner {
    name: String,
    sender: mpsc::UnboundedSender<RawMessage>,
    receiver: Mutex<Option<BusReceiver>>,
    flushing: AtomicBool,
    generation: AtomicU64,
}

/// Cloneable handle to a pipeline's message bus
#[derive(Debug, Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BusInner {
                name: name.into(),
                sender,
                receiver: Mutex::new(Some(receiver)),
                flushing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Post a message; dropped silently while flushing
    pub fn post(&self, mut msg: RawMessage) {
        if self.is_flushing() {
            debug!("[{}] flushing, dropped {:?}", self.inner.name, msg.body);
            return;
        }
        msg.generation = self.generation();
        if self.inner.sender.send(msg).is_err() {
            warn!("[{}] bus closed, message dropped", self.inner.name);
        }
    }

    /// Starting a flush also makes everything already queued stale
    pub fn set_flushing(&self, flushing: bool) {
        if flushing {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.flushing.store(flushing, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Whether `msg` was posted before the latest flush began
    pub fn is_stale(&self, msg: &RawMessage) -> bool {
        msg.generation != self.generation()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::SeqCst)
    }

    /// Take the receiving end; `None` if another subscriber holds it
    pub fn take_receiver(&self) -> Option<BusReceiver> {
        self.inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Give the receiving end back after unsubscribing
    pub fn restore_receiver(&self, mut receiver: BusReceiver) {
        // Anything still queued belongs to the previous subscription
        while receiver.try_recv().is_ok() {}
        *self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(receiver);
    }

    /// Whether both handles refer to the same bus
    pub fn same_bus(&self, other: &MessageBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eos(source: &str) -> RawMessage {
        RawMessage::from_pipeline(source, RawBody::Eos)
    }

    #[test]
    fn test_post_and_receive() {
        let bus = MessageBus::new("test");
        let mut rx = bus.take_receiver().unwrap();
        bus.post(eos("test"));

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.body, RawBody::Eos);
        assert!(msg.source_is_pipeline);
    }

    #[test]
    fn test_single_receiver() {
        let bus = MessageBus::new("test");
        let rx = bus.take_receiver();
        assert!(rx.is_some());
        assert!(bus.take_receiver().is_none());

        bus.restore_receiver(rx.unwrap());
        assert!(bus.take_receiver().is_some());
    }

    #[test]
    fn test_flushing_drops_posts() {
        let bus = MessageBus::new("test");
        let mut rx = bus.take_receiver().unwrap();

        bus.set_flushing(true);
        bus.post(eos("test"));
        bus.set_flushing(false);
        assert!(rx.try_recv().is_err());

        bus.post(eos("test"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_flush_makes_queued_messages_stale() {
        let bus = MessageBus::new("test");
        let mut rx = bus.take_receiver().unwrap();
        bus.post(eos("test"));

        bus.set_flushing(true);
        bus.set_flushing(false);
        bus.post(eos("test"));

        let queued = rx.try_recv().unwrap();
        assert!(bus.is_stale(&queued));
        let fresh = rx.try_recv().unwrap();
        assert!(!bus.is_stale(&fresh));
    }

    #[test]
    fn test_restore_discards_stale_messages() {
        let bus = MessageBus::new("test");
        let rx = bus.take_receiver().unwrap();
        bus.post(eos("test"));
        bus.restore_receiver(rx);

        let mut rx = bus.take_receiver().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_bus() {
        let bus = MessageBus::new("a");
        let clone = bus.clone();
        assert!(bus.same_bus(&clone));
        assert!(!bus.same_bus(&MessageBus::new("a")));
    }
}
