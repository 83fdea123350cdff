//! xmpdp
//!
//! Shows the file (or title) MPD is currently playing in a small X11 window,
//! refreshing on a timer, on click and on the refresh key.

mod config;
mod display;
mod error;
mod event_loop;
mod painter;
mod poller;
mod renderer;
mod shutdown;
mod supervisor;
mod track;
mod x11_async;

#[cfg(test)]
mod testing;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::display::x11::X11Session;
use crate::poller::PollerHandle;
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::supervisor::{EngineSettings, Supervisor};
use crate::track::{MpdConnector, TrackSource};

#[derive(Parser, Debug)]
#[command(name = "xmpdp")]
#[command(about = "Show the track MPD is playing in a tiny X11 window")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/xmpdp/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// MPD host
    #[arg(long)]
    host: Option<String>,

    /// MPD port
    #[arg(short, long)]
    port: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(short, long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Draw on the root window instead of creating one
    #[arg(long)]
    root: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.mpd.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mpd.port = port;
        }
        if let Some(interval) = self.interval_ms {
            config.update.interval_ms = interval;
        }
        if self.root {
            config.window.use_root = true;
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "xmpdp=debug,info".into()),
    );

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {path:?}"))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// SIGTERM and SIGINT stop the program, SIGHUP forces a refresh
fn spawn_signal_handlers(shutdown: Shutdown, poller: PollerHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    shutdown.trigger(ShutdownReason::Signal("SIGTERM"));
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    shutdown.trigger(ShutdownReason::Signal("SIGINT"));
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, refreshing");
                    poller.force_refresh();
                }
            }
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    info!("Starting xmpdp");

    let source = TrackSource::new(
        MpdConnector::new(&config.mpd),
        config.mpd.timeout(),
        config.text.field,
    );
    match source.player_state().await {
        Ok(state) => info!(
            "MPD at {}:{} is reachable ({:?})",
            config.mpd.host, config.mpd.port, state
        ),
        Err(e) => warn!(
            "MPD at {}:{} not reachable yet, will keep trying: {}",
            config.mpd.host, config.mpd.port, e
        ),
    }

    let session = X11Session::open(&config.window).context("Failed to open X11 window")?;
    let events = session.event_stream()?;

    let supervisor = Supervisor::new(session, events, source, EngineSettings::from_config(&config));
    let shutdown = Shutdown::new();
    spawn_signal_handlers(shutdown.clone(), supervisor.poller())?;

    let reason = supervisor.run(shutdown).await;
    if reason.is_failure() {
        error!("Exiting: {}", reason);
        Ok(ExitCode::FAILURE)
    } else {
        info!("Exiting: {}", reason);
        Ok(ExitCode::SUCCESS)
    }
}
