//! Client notification delivery
//!
//! Events are queued from the dispatcher thread and delivered in order on a
//! dedicated `mpctl-notify` thread, so an observer may call back into the
//! controller without deadlocking it.

use crate::error::Result;
use crossbeam_channel::{Receiver, Sender};
use mpctl_common::PlayerEvent;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Receives every player notification
pub trait PlayerObserver: Send + Sync {
    fn on_event(&self, event: &PlayerEvent);
}

/// Observer that forwards events into a channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<PlayerEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<PlayerEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end of its channel
    pub fn channel() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl PlayerObserver for ChannelObserver {
    fn on_event(&self, event: &PlayerEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("event receiver gone, dropped {}", event.event_type());
        }
    }
}

enum NotifyMsg {
    Event(PlayerEvent),
    Shutdown,
}

/// Cloneable sending side used by the dispatcher
#[derive(Clone)]
pub(crate) struct NotifierHandle {
    tx: Sender<NotifyMsg>,
}

impl NotifierHandle {
    pub fn send(&self, event: PlayerEvent) {
        debug!("notify {:?}", event);
        if self.tx.send(NotifyMsg::Event(event)).is_err() {
            warn!("notification thread stopped, event dropped");
        }
    }
}

/// Owner of the notification thread
pub(crate) struct Notifier {
    handle: NotifierHandle,
    worker: Option<JoinHandle<()>>,
}

impl Notifier {
    pub fn start(observer: Option<Arc<dyn PlayerObserver>>) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("mpctl-notify".to_string())
            .spawn(move || run(rx, observer))?;

        Ok(Self {
            handle: NotifierHandle { tx },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> NotifierHandle {
        self.handle.clone()
    }

    /// Deliver everything queued so far, then stop the thread
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.handle.tx.send(NotifyMsg::Shutdown);

        // An observer releasing the controller runs on this very thread
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("notification thread panicked");
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: Receiver<NotifyMsg>, observer: Option<Arc<dyn PlayerObserver>>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            NotifyMsg::Event(event) => {
                if let Some(observer) = &observer {
                    observer.on_event(&event);
                }
            }
            NotifyMsg::Shutdown => break,
        }
    }
    debug!("notification thread exited");
}
