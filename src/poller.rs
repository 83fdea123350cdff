//! Poller
//!
//! Background task re-querying the music daemon on a fixed interval and
//! handing each result to the renderer. Failed fetches keep the previous
//! label; the next cycle simply tries again.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::renderer::{Origin, RendererGone, RepaintHandle};
use crate::shutdown::Shutdown;
use crate::track::{MusicConnector, TrackSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Rendering,
    Stopped,
}

/// Messages other tasks send to the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerSignal {
    /// Run a cycle right away (SIGHUP)
    ForceRefresh,
    /// Someone else just refreshed the window
    Refreshed,
}

#[derive(Clone)]
pub struct PollerHandle {
    tx: mpsc::Sender<PollerSignal>,
}

pub fn channel() -> (PollerHandle, mpsc::Receiver<PollerSignal>) {
    let (tx, rx) = mpsc::channel(4);
    (PollerHandle { tx }, rx)
}

impl PollerHandle {
    pub fn force_refresh(&self) {
        self.send(PollerSignal::ForceRefresh);
    }

    pub fn refreshed(&self) {
        self.send(PollerSignal::Refreshed);
    }

    fn send(&self, signal: PollerSignal) {
        match self.tx.try_send(signal) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Poller busy, {:?} dropped", signal),
            Err(TrySendError::Closed(_)) => trace!("Poller stopped, {:?} dropped", signal),
        }
    }
}

pub struct Poller<C> {
    source: TrackSource<C>,
    repaint: RepaintHandle,
    signals: mpsc::Receiver<PollerSignal>,
    interval: Duration,
    /// Restart the interval after a refresh from the event loop
    reset_after_refresh: bool,
    state: PollerState,
}

impl<C: MusicConnector> Poller<C> {
    pub fn new(
        source: TrackSource<C>,
        repaint: RepaintHandle,
        signals: mpsc::Receiver<PollerSignal>,
        interval: Duration,
        reset_after_refresh: bool,
    ) -> Self {
        Self {
            source,
            repaint,
            signals,
            interval,
            reset_after_refresh,
            state: PollerState::Idle,
        }
    }

    /// Poll until shutdown. The first cycle runs immediately.
    pub async fn run(mut self, shutdown: Shutdown) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Poller started, interval {:?}", self.interval);

        loop {
            self.set_state(PollerState::Idle);
            let origin = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                Some(signal) = self.signals.recv() => match signal {
                    PollerSignal::ForceRefresh => Origin::Forced,
                    PollerSignal::Refreshed => {
                        if self.reset_after_refresh {
                            ticker.reset();
                        }
                        continue;
                    }
                },
                _ = ticker.tick() => Origin::Scheduled,
            };

            self.set_state(PollerState::Fetching);
            let ticket = self.repaint.ticket();
            let fetched = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                fetched = self.source.current_title() => fetched,
            };
            let outcome = match fetched {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Fetching current track failed, keeping previous label: {}", e);
                    continue;
                }
            };

            self.set_state(PollerState::Rendering);
            match self.repaint.submit(ticket, outcome, origin).await {
                Ok(result) => trace!("Poll cycle done: {:?}", result),
                Err(RendererGone) => {
                    debug!("Renderer gone, stopping poller");
                    break;
                }
            }
        }

        self.set_state(PollerState::Stopped);
    }

    fn set_state(&mut self, state: PollerState) {
        if self.state != state {
            trace!("Poller {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LabelField, RedrawPolicy};
    use crate::display::{Anchor, Geometry};
    use crate::error::FetchError;
    use crate::painter::TextPainter;
    use crate::renderer::{self, Renderer, RendererSettings};
    use crate::shutdown::ShutdownReason;
    use crate::testing::{FakeConnector, FakeSession};
    use tokio::task::JoinHandle;

    struct Harness {
        session: FakeSession,
        shutdown: Shutdown,
        handle: PollerHandle,
        poller: JoinHandle<()>,
        renderer: JoinHandle<FakeSession>,
    }

    impl Harness {
        fn start(connector: &FakeConnector, interval: Duration, reset_after_refresh: bool) -> Self {
            let session = FakeSession::new(Geometry::new(500, 100));
            let shutdown = Shutdown::new();
            let (repaint, requests) = renderer::channel(16);
            let renderer = Renderer::new(
                session.clone(),
                TextPainter::new("7x13", Anchor { x: 10, y: 20 }),
                RendererSettings {
                    policy: RedrawPolicy::OnChange,
                    idle_text: String::new(),
                    max_draw_failures: 3,
                },
            );
            let (handle, signals) = channel();
            let source = TrackSource::new(connector.clone(), Duration::from_millis(500), LabelField::File);
            let poller = Poller::new(source, repaint, signals, interval, reset_after_refresh);

            Self {
                session,
                handle,
                renderer: tokio::spawn(renderer.run(requests, shutdown.clone())),
                poller: tokio::spawn(poller.run(shutdown.clone())),
                shutdown,
            }
        }

        async fn stop(self) -> FakeSession {
            self.shutdown.trigger(ShutdownReason::Quit);
            self.poller.await.unwrap();
            self.renderer.await.unwrap();
            self.session
        }
    }

    #[tokio::test(start_paused = true)]
    async fn label_follows_last_successful_fetch() {
        let connector = FakeConnector::new();
        connector.push_playing("a.mp3");
        connector.push_error(FetchError::Unreachable("connection refused".into()));
        connector.push_playing("b.mp3");
        connector.push_error(FetchError::SessionReset);

        let harness = Harness::start(&connector, Duration::from_secs(1), false);
        // Cycles at 0s, 1s, 2s, 3s and 4s
        time::sleep(Duration::from_millis(4500)).await;
        let session = harness.stop().await;

        assert_eq!(connector.connects(), 5);
        assert_eq!(session.texts(), vec!["a.mp3", "b.mp3"]);
        assert_eq!(session.visible_text().as_deref(), Some("b.mp3"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_playback_clears_window() {
        let connector = FakeConnector::new();
        connector.push_playing("a.mp3");
        connector.push_stopped();

        let harness = Harness::start(&connector, Duration::from_secs(1), false);
        time::sleep(Duration::from_millis(1500)).await;
        let session = harness.stop().await;

        assert_eq!(session.fills().len(), 2);
        assert_eq!(session.visible_text(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fetch_after_shutdown() {
        let connector = FakeConnector::new();
        connector.push_playing("a.mp3");

        let harness = Harness::start(&connector, Duration::from_secs(1), false);
        harness.shutdown.trigger(ShutdownReason::Quit);
        time::sleep(Duration::from_secs(3)).await;
        harness.stop().await;

        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_runs_a_cycle() {
        let connector = FakeConnector::new();
        connector.push_playing("a.mp3");

        let harness = Harness::start(&connector, Duration::from_secs(3600), false);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.connects(), 1);

        harness.handle.force_refresh();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.connects(), 2);

        // Same label, but forced cycles always repaint
        let session = harness.stop().await;
        assert_eq!(session.texts(), vec!["a.mp3", "a.mp3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_restarts_interval() {
        let connector = FakeConnector::new();
        connector.push_playing("a.mp3");

        let harness = Harness::start(&connector, Duration::from_secs(10), true);
        time::sleep(Duration::from_secs(6)).await;
        harness.handle.refreshed();
        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(connector.connects(), 1);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.connects(), 2);
        harness.stop().await;
    }
}
