//! Supervisor
//!
//! Starts the renderer, the poller and the event loop, waits for the first
//! shutdown reason and releases the display session once every task is done.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::{Config, KeysConfig};
use crate::display::{Anchor, DisplaySession, EventSource};
use crate::event_loop::EventLoop;
use crate::painter::TextPainter;
use crate::poller::{self, Poller, PollerHandle, PollerSignal};
use crate::renderer::{self, RepaintHandle, RepaintQueue, Renderer, RendererSettings};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::track::{MusicConnector, TrackSource};

/// Tunables of the update engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub painter: TextPainter,
    pub renderer: RendererSettings,
    pub keys: KeysConfig,
    pub interval: Duration,
    pub reset_after_refresh: bool,
    pub queue_depth: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            painter: TextPainter::new(
                config.text.font.clone(),
                Anchor {
                    x: config.text.x,
                    y: config.text.y,
                },
            ),
            renderer: RendererSettings {
                policy: config.update.policy,
                idle_text: config.text.idle_text.clone(),
                max_draw_failures: config.update.max_draw_failures,
            },
            keys: config.keys.clone(),
            interval: config.update.interval(),
            reset_after_refresh: config.update.reset_after_refresh,
            queue_depth: config.update.queue_depth,
        }
    }
}

pub struct Supervisor<S, E, C> {
    session: S,
    events: E,
    source: TrackSource<C>,
    settings: EngineSettings,
    repaint: RepaintHandle,
    requests: RepaintQueue,
    poller: PollerHandle,
    signals: mpsc::Receiver<PollerSignal>,
}

impl<S, E, C> Supervisor<S, E, C>
where
    S: DisplaySession,
    E: EventSource,
    C: MusicConnector,
{
    pub fn new(session: S, events: E, source: TrackSource<C>, settings: EngineSettings) -> Self {
        let (repaint, requests) = renderer::channel(settings.queue_depth);
        let (poller, signals) = poller::channel();
        Self {
            session,
            events,
            source,
            settings,
            repaint,
            requests,
            poller,
            signals,
        }
    }

    /// Handle for forcing poll cycles from outside (SIGHUP)
    pub fn poller(&self) -> PollerHandle {
        self.poller.clone()
    }

    /// Run until shutdown and return the reason that won
    pub async fn run(self, shutdown: Shutdown) -> ShutdownReason {
        let Self {
            session,
            events,
            source,
            settings,
            repaint,
            requests,
            poller,
            signals,
        } = self;

        let renderer = Renderer::new(session, settings.painter, settings.renderer);
        let render_task = tokio::spawn(guarded(
            "renderer",
            shutdown.clone(),
            renderer.run(requests, shutdown.clone()),
        ));

        let poll = Poller::new(
            source.clone(),
            repaint.clone(),
            signals,
            settings.interval,
            settings.reset_after_refresh,
        );
        let poll_task = tokio::spawn(guarded("poller", shutdown.clone(), poll.run(shutdown.clone())));

        let event_loop = EventLoop::new(events, source, repaint, poller, settings.keys);
        let event_task = tokio::spawn(guarded(
            "event loop",
            shutdown.clone(),
            event_loop.run(shutdown.clone()),
        ));

        info!("Update engine running");
        let reason = shutdown.wait().await;
        info!("Shutting down: {}", reason);

        let (rendered, polled, looped) = tokio::join!(render_task, poll_task, event_task);
        if let Err(e) = polled {
            error!("Poller task failed: {}", e);
        }
        if let Err(e) = looped {
            error!("Event loop task failed: {}", e);
        }
        match rendered {
            Ok(session) => session.close(),
            Err(e) => error!("Renderer task failed, display session lost: {}", e),
        }

        reason
    }
}

/// Triggers shutdown when dropped, unless something already did
struct ExitGuard {
    task: &'static str,
    shutdown: Shutdown,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.shutdown.trigger(ShutdownReason::TaskFailed(self.task)) {
            error!("{} task stopped before shutdown", self.task);
        }
    }
}

/// Run `task` so that ending early, by return or by panic, stops everything
async fn guarded<F: Future>(task: &'static str, shutdown: Shutdown, future: F) -> F::Output {
    let _guard = ExitGuard { task, shutdown };
    future.await
}
