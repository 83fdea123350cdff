//! Event loop
//!
//! Waits for window events and dispatches them. Exposure redraws the label
//! already known, the refresh key and mouse clicks fetch a fresh one inline,
//! the quit key and window-manager close end the program.

use tracing::{debug, error, info, trace, warn};

use crate::config::KeysConfig;
use crate::display::{DisplayEvent, EventSource};
use crate::poller::PollerHandle;
use crate::renderer::{Origin, RepaintHandle};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::track::{MusicConnector, TrackSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Waiting,
    Dispatching,
    Terminating,
}

enum Flow {
    Continue,
    Terminate,
}

pub struct EventLoop<E, C> {
    events: E,
    source: TrackSource<C>,
    repaint: RepaintHandle,
    poller: PollerHandle,
    keys: KeysConfig,
    state: EventState,
}

impl<E: EventSource, C: MusicConnector> EventLoop<E, C> {
    pub fn new(
        events: E,
        source: TrackSource<C>,
        repaint: RepaintHandle,
        poller: PollerHandle,
        keys: KeysConfig,
    ) -> Self {
        Self {
            events,
            source,
            repaint,
            poller,
            keys,
            state: EventState::Waiting,
        }
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        debug!(
            "Event loop started (quit key {}, refresh key {})",
            self.keys.quit, self.keys.refresh
        );

        loop {
            self.set_state(EventState::Waiting);
            let event = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                event = self.events.next_event() => event,
            };

            let event = match event {
                Ok(event) => event,
                Err(lost) => {
                    error!("Lost display connection: {}", lost);
                    shutdown.trigger(ShutdownReason::ConnectionLost(lost.to_string()));
                    break;
                }
            };

            self.set_state(EventState::Dispatching);
            if let Flow::Terminate = self.dispatch(event, &shutdown).await {
                break;
            }
        }

        self.set_state(EventState::Terminating);
    }

    async fn dispatch(&mut self, event: DisplayEvent, shutdown: &Shutdown) -> Flow {
        match event {
            DisplayEvent::Expose => {
                trace!("Expose");
                self.repaint.expose();
                Flow::Continue
            }
            DisplayEvent::KeyRelease { code } if code == self.keys.quit => {
                info!("Quit key released");
                shutdown.trigger(ShutdownReason::Quit);
                Flow::Terminate
            }
            DisplayEvent::KeyRelease { code } if code == self.keys.refresh => {
                self.refresh(shutdown).await
            }
            DisplayEvent::ButtonPress { button } => {
                debug!("Button {} pressed, refreshing", button);
                self.refresh(shutdown).await
            }
            DisplayEvent::CloseRequested => {
                info!("Window manager asked to close the window");
                shutdown.trigger(ShutdownReason::CloseRequested);
                Flow::Terminate
            }
            DisplayEvent::Destroyed => {
                error!("Window destroyed");
                shutdown.trigger(ShutdownReason::ConnectionLost("window destroyed".into()));
                Flow::Terminate
            }
            DisplayEvent::KeyRelease { code } => {
                trace!("Ignoring key {}", code);
                Flow::Continue
            }
            DisplayEvent::Ignored => Flow::Continue,
        }
    }

    /// Fetch and show the current track right now
    async fn refresh(&mut self, shutdown: &Shutdown) -> Flow {
        let ticket = self.repaint.ticket();
        let fetched = tokio::select! {
            biased;
            _ = shutdown.wait() => return Flow::Terminate,
            fetched = self.source.current_title() => fetched,
        };

        match fetched {
            Ok(outcome) => match self.repaint.submit(ticket, outcome, Origin::Forced).await {
                Ok(result) => debug!("Refreshed: {:?}", result),
                Err(e) => {
                    debug!("Refresh dropped: {}", e);
                    return Flow::Terminate;
                }
            },
            Err(e) => warn!("Refresh failed, keeping previous label: {}", e),
        }

        self.poller.refreshed();
        Flow::Continue
    }

    fn set_state(&mut self, state: EventState) {
        if self.state != state {
            trace!("Event loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
