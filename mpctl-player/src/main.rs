//! mpctl-player - command-line driver
//!
//! Runs a playback script against the simulated engine and logs every
//! notification as JSON. Useful for exercising the control core without a
//! real media stack.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use mpctl_player::pipeline::SimPipelineFactory;
use mpctl_player::{ChannelObserver, PlayerConfig, PlayerController, PlayerEvent, SeekMode};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mpctl-player
#[derive(Parser, Debug)]
#[command(name = "mpctl-player")]
#[command(about = "Playback control core driven by a script against a simulated engine")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "MPCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Media source
    #[arg(short, long, default_value = "sim://demo")]
    uri: String,

    /// Script file, one command per line (prepare, play, pause, stop,
    /// seek <ms> [mode], speed <rate>, loop on|off, wait <ms>, reset)
    #[arg(short, long)]
    script: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Prepare,
    Play,
    Pause,
    Stop,
    Seek { position_ms: i64, mode: SeekMode },
    Speed(f64),
    Loop(bool),
    Wait(u64),
    Reset,
}

const DEFAULT_SCRIPT: &str = "\
prepare
play
wait 1500
seek 5000
wait 1500
speed 2.0
wait 1000
pause
wait 300
stop
";

fn parse_script(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let step = parse_step(line).with_context(|| format!("script line {}", index + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

fn parse_step(line: &str) -> Result<Step> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let arg = words.next();

    let step = match command {
        "prepare" => Step::Prepare,
        "play" => Step::Play,
        "pause" => Step::Pause,
        "stop" => Step::Stop,
        "reset" => Step::Reset,
        "seek" => {
            let position_ms = arg
                .ok_or_else(|| anyhow!("seek needs a position"))?
                .parse()
                .context("invalid seek position")?;
            let mode = match words.next() {
                Some(mode) => SeekMode::try_from(mode.parse::<i32>().context("invalid seek mode")?)?,
                None => SeekMode::PreviousSync,
            };
            Step::Seek { position_ms, mode }
        }
        "speed" => Step::Speed(
            arg.ok_or_else(|| anyhow!("speed needs a rate"))?
                .parse()
                .context("invalid rate")?,
        ),
        "loop" => match arg {
            Some("on") => Step::Loop(true),
            Some("off") => Step::Loop(false),
            _ => bail!("loop takes on or off"),
        },
        "wait" => Step::Wait(
            arg.ok_or_else(|| anyhow!("wait needs a duration"))?
                .parse()
                .context("invalid wait duration")?,
        ),
        other => bail!("unknown command '{}'", other),
    };
    Ok(step)
}

fn run_script(player: &PlayerController, uri: &str, steps: &[Step]) -> Result<()> {
    player.set_source(uri).context("Failed to set source")?;

    for step in steps {
        info!("step {:?}", step);
        let result = match step {
            Step::Prepare => player.prepare(),
            Step::Play => player.play(),
            Step::Pause => player.pause(),
            Step::Stop => player.stop(),
            Step::Reset => player.reset(),
            Step::Seek { position_ms, mode } => {
                player.seek(mpctl_common::time::ms_to_us(*position_ms), *mode)
            }
            Step::Speed(rate) => player.set_speed(*rate),
            Step::Loop(looping) => {
                player.set_looping(*looping);
                Ok(())
            }
            Step::Wait(ms) => {
                std::thread::sleep(Duration::from_millis(*ms));
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("{:?} failed: {}", step, e);
        }
    }

    // Let the stop settle before teardown
    std::thread::sleep(Duration::from_millis(200));
    Ok(())
}

fn log_event(event: &PlayerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(target: "mpctl_player::events", "{}", json),
        Err(e) => warn!("failed to serialize {:?}: {}", event, e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpctl_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!("Log level from config: {}", config.logging.level);

    let script = match &args.script {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => DEFAULT_SCRIPT.to_string(),
    };
    let steps = parse_script(&script)?;
    info!("Running {} steps against {}", steps.len(), args.uri);

    let (observer, events) = ChannelObserver::channel();
    let factory = Arc::new(SimPipelineFactory::new(config.sim.clone()));
    let player = Arc::new(
        PlayerController::new(config, factory, Some(Arc::new(observer)))
            .context("Failed to start playback controller")?,
    );
    info!("Controller {} started", player.id());

    let event_log = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            log_event(&event);
        }
    });

    let runner = {
        let player = Arc::clone(&player);
        let uri = args.uri.clone();
        tokio::task::spawn_blocking(move || run_script(&player, &uri, &steps))
    };

    tokio::select! {
        outcome = runner => {
            outcome.context("Script runner panicked")??;
            info!("Script finished");
        }
        _ = shutdown_signal() => {
            if let Err(e) = player.stop() {
                warn!("stop on shutdown failed: {}", e);
            }
        }
    }

    player.release().context("Failed to release controller")?;
    drop(player);
    if let Err(e) = event_log.await {
        warn!("event logger failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
