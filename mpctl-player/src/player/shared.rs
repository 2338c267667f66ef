//! Controller fields shared between client threads and the dispatcher
//!
//! One mutex guards everything; the condvar is signalled on every update so
//! a blocked `prepare()` can re-check its exit conditions.

use crate::dispatcher::ElementInfo;
use crate::error::{Error, Result};
use mpctl_common::PlayerState;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Called on the dispatcher thread for every element the pipeline creates
pub type ElementSetupListener = Arc<dyn Fn(&ElementInfo) + Send + Sync>;

pub(crate) struct SharedFields {
    pub uri: Option<String>,
    /// Last client-visible state entered
    pub state: PlayerState,
    pub duration_us: i64,
    pub position_us: i64,
    pub rate: f64,
    pub looping: bool,
    pub is_seeking: bool,
    pub is_rating: bool,
    pub error_occurred: bool,
    pub listener: Option<ElementSetupListener>,
}

impl SharedFields {
    fn new(looping: bool) -> Self {
        Self {
            uri: None,
            state: PlayerState::Idle,
            duration_us: 0,
            position_us: 0,
            rate: 1.0,
            looping,
            is_seeking: false,
            is_rating: false,
            error_occurred: false,
            listener: None,
        }
    }

    /// Forget everything tied to the current source
    pub fn clear_media(&mut self) {
        self.uri = None;
        self.duration_us = 0;
        self.position_us = 0;
        self.rate = 1.0;
        self.is_seeking = false;
        self.is_rating = false;
        self.error_occurred = false;
    }
}

pub(crate) struct Shared {
    fields: Mutex<SharedFields>,
    changed: Condvar,
}

impl Shared {
    pub fn new(looping: bool) -> Self {
        Self {
            fields: Mutex::new(SharedFields::new(looping)),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedFields> {
        self.fields.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate under the lock and wake all waiters
    pub fn update<R>(&self, f: impl FnOnce(&mut SharedFields) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_all();
        result
    }

    /// Block until preparation finished, failed or was abandoned
    pub fn wait_prepared(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut fields = self.lock();

        loop {
            match fields.state {
                PlayerState::Prepared
                | PlayerState::Playing
                | PlayerState::Paused
                | PlayerState::PlaybackCompleted => return Ok(()),
                PlayerState::Idle | PlayerState::Stopped => {
                    return Err(Error::InvalidState(format!(
                        "preparation abandoned in {}",
                        fields.state
                    )))
                }
                PlayerState::Preparing => {}
            }
            if fields.error_occurred {
                return Err(Error::Engine("engine error during preparation".to_string()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(format!(
                    "not prepared after {} ms",
                    timeout.as_millis()
                )));
            }

            let (guard, _) = self
                .changed
                .wait_timeout(fields, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            fields = guard;
        }
    }
}
