//! Playback controller
//!
//! [`PlayerController`] is the client-facing command surface. Every command
//! is evaluated on the dispatcher thread; the caller blocks only until the
//! command is accepted or rejected, never until it completes. Completion is
//! reported through [`PlayerEvent`](mpctl_common::PlayerEvent) notifications.

mod machine;
mod notify;
mod shared;
mod states;

pub use notify::{ChannelObserver, PlayerObserver};
pub use shared::ElementSetupListener;

use self::machine::Player;
use self::notify::Notifier;
use self::shared::Shared;
use self::states::Command;
use crate::config::PlayerConfig;
use crate::dispatcher::{DispatcherHandle, MessageDispatcher};
use crate::error::{Error, Result};
use crate::pipeline::{PipelineFactory, SeekMode};
use mpctl_common::PlayerState;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

pub struct PlayerController {
    id: Uuid,
    span: tracing::Span,
    dispatcher: Mutex<Option<MessageDispatcher<Player>>>,
    handle: DispatcherHandle<Player>,
    shared: Arc<Shared>,
    notifier: Mutex<Notifier>,
    config: PlayerConfig,
}

impl PlayerController {
    /// Start the dispatcher and notification threads; the controller begins in Idle
    pub fn new(
        config: PlayerConfig,
        factory: Arc<dyn PipelineFactory>,
        observer: Option<Arc<dyn PlayerObserver>>,
    ) -> Result<Self> {
        let config = config.validated();
        let id = Uuid::new_v4();
        let span = tracing::info_span!("player", id = %id);
        let short_id: String = id.simple().to_string().chars().take(8).collect();
        let pipeline_name = format!("player-{}", short_id);

        let shared = Arc::new(Shared::new(config.looping));
        let notifier = Notifier::start(observer)?;
        let notify_handle = notifier.handle();

        let dispatcher = {
            let name = pipeline_name.clone();
            let config = config.clone();
            let shared = Arc::clone(&shared);
            let span = span.clone();
            MessageDispatcher::init(&name, move |handle| {
                Player::new(config, shared, notify_handle, handle, factory, pipeline_name, span)
            })?
        };
        let handle = dispatcher.handle();

        span.in_scope(|| info!("controller created"));

        Ok(Self {
            id,
            span,
            dispatcher: Mutex::new(Some(dispatcher)),
            handle,
            shared,
            notifier: Mutex::new(notifier),
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run `job` on the dispatcher thread and wait for its result
    fn call<R, F>(&self, job: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Player) -> R + Send + 'static,
    {
        if self.handle.is_dispatcher_thread() {
            return Err(Error::Internal(
                "controller called from its own dispatcher thread".to_string(),
            ));
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.handle.post(move |player| {
            let _ = tx.send(job(player));
        })?;
        rx.recv()
            .map_err(|_| Error::Released("controller released before reply".to_string()))
    }

    fn execute(&self, command: Command) -> Result<()> {
        self.call(move |player| player.handle_command(command))?
    }

    /// Set the media source; only valid in Idle
    ///
    /// Bare paths are turned into `file://` URIs.
    pub fn set_source(&self, uri: &str) -> Result<()> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::InvalidValue("empty source".to_string()));
        }
        self.execute(Command::SetSource(normalize_uri(uri)?))
    }

    /// Prepare and block until Prepared, an engine error, or the prepare timeout
    pub fn prepare(&self) -> Result<()> {
        self.execute(Command::Prepare)?;
        self.shared.wait_prepared(self.config.prepare_timeout())
    }

    /// Prepare without waiting; completion is signalled by `StateChanged(Prepared)`
    pub fn prepare_async(&self) -> Result<()> {
        self.execute(Command::Prepare)
    }

    pub fn play(&self) -> Result<()> {
        self.execute(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.execute(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.execute(Command::Stop)
    }

    /// Seek to `position_us`; clamped to the duration when it is known
    pub fn seek(&self, position_us: i64, mode: SeekMode) -> Result<()> {
        if position_us < 0 {
            return Err(Error::InvalidValue(format!(
                "negative seek position {}",
                position_us
            )));
        }
        self.execute(Command::Seek { position_us, mode })
    }

    pub fn set_speed(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidValue(format!("invalid playback rate {}", rate)));
        }
        self.execute(Command::SetSpeed(rate))
    }

    /// Drop the pipeline and source, back to Idle
    pub fn reset(&self) -> Result<()> {
        self.execute(Command::Reset)
    }

    /// Media duration in microseconds, 0 while unknown
    pub fn duration_us(&self) -> i64 {
        let (cached, state) = {
            let fields = self.shared.lock();
            (fields.duration_us, fields.state)
        };
        if cached > 0 || !has_media(state) {
            return cached;
        }

        match self.call(|player| player.core.refresh_duration()) {
            Ok(duration) => duration,
            Err(e) => {
                debug!("duration query failed: {}", e);
                cached
            }
        }
    }

    /// Playback position in microseconds
    pub fn position_us(&self) -> i64 {
        let (cached, state) = {
            let fields = self.shared.lock();
            (fields.position_us, fields.state)
        };
        if !has_media(state) {
            return cached;
        }

        self.call(|player| player.core.refresh_position())
            .unwrap_or(cached)
    }

    /// Current playback rate
    pub fn speed(&self) -> f64 {
        self.shared.lock().rate
    }

    /// Last client-visible state entered
    pub fn state(&self) -> PlayerState {
        self.shared.lock().state
    }

    pub fn set_looping(&self, looping: bool) {
        self.span.in_scope(|| debug!("looping {}", looping));
        self.shared.update(|f| f.looping = looping);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.lock().looping
    }

    /// Install or clear the element-setup listener; it runs on the dispatcher thread
    pub fn set_element_setup_listener(&self, listener: Option<ElementSetupListener>) {
        self.shared.update(|f| f.listener = listener);
    }

    /// Queued plus executing actions
    pub fn pending_actions(&self) -> Result<usize> {
        self.call(|player| player.core.actions.pending_count() + player.core.actions.executing_count())
    }

    /// Stop all threads and release the pipeline
    ///
    /// Idempotent; queued notifications are still delivered.
    pub fn release(&self) -> Result<()> {
        let _guard = self.span.enter();

        let mut slot = self
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(mut dispatcher) = slot.take() else {
            return Ok(());
        };

        if let Err(e) = self.call(|player| player.core.release_pipeline()) {
            debug!("pipeline release skipped: {}", e);
        }
        if let Err(e) = dispatcher.reset() {
            *slot = Some(dispatcher);
            return Err(e);
        }
        drop(slot);

        self.notifier
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .shutdown();
        info!("controller released");
        Ok(())
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("controller teardown failed: {}", e);
        }
    }
}

/// States with a bound pipeline worth querying
fn has_media(state: PlayerState) -> bool {
    matches!(
        state,
        PlayerState::Prepared
            | PlayerState::Playing
            | PlayerState::Paused
            | PlayerState::PlaybackCompleted
    )
}

fn normalize_uri(source: &str) -> Result<String> {
    if source.contains("://") {
        return Ok(source.to_string());
    }

    let path = std::path::Path::new(source);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(format!("file://{}", absolute.display()))
}
