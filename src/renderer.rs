//! Renderer
//!
//! The one task that owns the display session and the displayed label. The
//! poller and the event loop reach it only through a `RepaintHandle`: each
//! wake-up drains everything queued, keeps the newest fetch result and
//! repaints at most once, so a clear from one producer can never meet a draw
//! from the other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::config::RedrawPolicy;
use crate::display::DisplaySession;
use crate::error::DrawError;
use crate::painter::TextPainter;
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::track::TrackOutcome;

/// Order of a fetch, reserved before the fetch starts.
///
/// A result with an older ticket than the label on screen is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Who asked for the repaint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Interval timer
    Scheduled,
    /// Key, click or signal
    Forced,
}

pub enum RepaintRequest {
    /// Redraw the current label, nothing new was fetched
    Expose,
    /// Show a freshly fetched result
    Update {
        ticket: Ticket,
        outcome: TrackOutcome,
        origin: Origin,
        done: oneshot::Sender<RepaintOutcome>,
    },
}

/// What became of a submitted update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepaintOutcome {
    Painted { generation: u64 },
    /// Applied, but the window already shows it
    Unchanged,
    /// A newer result arrived in the same batch
    Superseded,
    /// Older than the label already applied
    Stale,
    Failed(DrawError),
}

#[derive(Debug, Error)]
#[error("renderer stopped")]
pub struct RendererGone;

/// Producer side of the repaint queue
#[derive(Clone)]
pub struct RepaintHandle {
    tx: mpsc::Sender<RepaintRequest>,
    tickets: Arc<AtomicU64>,
    /// Set before every expose is queued, so a full queue cannot lose one
    expose_pending: Arc<AtomicBool>,
}

/// Consumer side of the repaint queue
pub struct RepaintQueue {
    rx: mpsc::Receiver<RepaintRequest>,
    expose_pending: Arc<AtomicBool>,
}

/// Create the repaint queue holding at most `depth` pending requests
pub fn channel(depth: usize) -> (RepaintHandle, RepaintQueue) {
    let (tx, rx) = mpsc::channel(depth);
    let expose_pending = Arc::new(AtomicBool::new(false));
    let handle = RepaintHandle {
        tx,
        tickets: Arc::new(AtomicU64::new(0)),
        expose_pending: expose_pending.clone(),
    };
    (handle, RepaintQueue { rx, expose_pending })
}

impl RepaintQueue {
    /// Everything queued behind `first`, plus an expose that did not fit
    fn drain(&mut self, first: RepaintRequest) -> Vec<RepaintRequest> {
        let mut batch = vec![first];
        while let Ok(request) = self.rx.try_recv() {
            batch.push(request);
        }
        if self.expose_pending.swap(false, Ordering::AcqRel) {
            batch.push(RepaintRequest::Expose);
        }
        batch
    }
}

impl RepaintHandle {
    /// Reserve the ticket for a fetch about to start
    pub fn ticket(&self) -> Ticket {
        Ticket(self.tickets.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Queue a redraw without waiting.
    ///
    /// When the queue is full the expose rides along with the next batch,
    /// which the queued requests are about to wake.
    pub fn expose(&self) {
        self.expose_pending.store(true, Ordering::Release);
        match self.tx.try_send(RepaintRequest::Expose) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Repaint queue full, expose deferred to next batch"),
            Err(TrySendError::Closed(_)) => debug!("Renderer stopped, expose dropped"),
        }
    }

    /// Queue a fetch result and wait until the renderer dealt with it
    pub async fn submit(
        &self,
        ticket: Ticket,
        outcome: TrackOutcome,
        origin: Origin,
    ) -> Result<RepaintOutcome, RendererGone> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(RepaintRequest::Update {
                ticket,
                outcome,
                origin,
                done,
            })
            .await
            .map_err(|_| RendererGone)?;
        result.await.map_err(|_| RendererGone)
    }
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub policy: RedrawPolicy,
    /// Label for `NoTrack`
    pub idle_text: String,
    pub max_draw_failures: u32,
}

/// What the window shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    /// Last successfully fetched label
    pub label: String,
    pub label_ticket: Ticket,
    /// Bumped on every completed repaint
    pub generation: u64,
    /// The window does not show `label` yet
    pub dirty: bool,
}

/// Owner of the display session.
///
/// Drawing requests are checked synchronously, so a repaint blocks the worker
/// thread it runs on for a few server round-trips. `main` runs on the
/// multi-thread runtime, which keeps the other tasks moving meanwhile.
pub struct Renderer<S> {
    session: S,
    painter: TextPainter,
    settings: RendererSettings,
    state: DisplayState,
    failures: u32,
}

impl<S: DisplaySession> Renderer<S> {
    pub fn new(session: S, painter: TextPainter, settings: RendererSettings) -> Self {
        Self {
            session,
            painter,
            settings,
            state: DisplayState {
                dirty: true,
                ..Default::default()
            },
            failures: 0,
        }
    }

    /// Serve repaint requests until shutdown, then hand the session back.
    ///
    /// A batch in progress always completes; shutdown is checked between
    /// batches and whatever is still queued is dropped.
    pub async fn run(mut self, mut queue: RepaintQueue, shutdown: Shutdown) -> S {
        debug!("Renderer started");
        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                request = queue.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let batch = queue.drain(first);
            if let Some(reason) = self.handle_batch(batch) {
                shutdown.trigger(reason);
                break;
            }
        }
        debug!("Renderer stopped at generation {}", self.state.generation);
        self.session
    }

    /// Apply one batch of requests. Returns a reason when the display is no
    /// longer usable.
    pub fn handle_batch(&mut self, batch: Vec<RepaintRequest>) -> Option<ShutdownReason> {
        let mut expose = false;
        let mut updates = Vec::new();
        for request in batch {
            match request {
                RepaintRequest::Expose => expose = true,
                RepaintRequest::Update {
                    ticket,
                    outcome,
                    origin,
                    done,
                } => updates.push((ticket, outcome, origin, done)),
            }
        }

        updates.sort_by_key(|(ticket, ..)| *ticket);
        let newest = updates.pop();
        for (ticket, _, _, done) in updates {
            let _ = done.send(self.rejection(ticket));
        }

        let mut forced = false;
        let mut always = false;
        let mut waiting = None;
        if let Some((ticket, outcome, origin, done)) = newest {
            if ticket <= self.state.label_ticket {
                let _ = done.send(RepaintOutcome::Stale);
            } else {
                self.apply(ticket, outcome);
                forced = origin == Origin::Forced;
                always = origin == Origin::Scheduled && self.settings.policy == RedrawPolicy::Always;
                waiting = Some(done);
            }
        }

        if !(expose || forced || always || self.state.dirty) {
            if let Some(done) = waiting {
                let _ = done.send(RepaintOutcome::Unchanged);
            }
            return None;
        }

        match self.painter.repaint(&self.session, &self.state.label) {
            Ok(geometry) => {
                self.state.generation += 1;
                self.state.dirty = false;
                self.failures = 0;
                trace!(
                    "Repainted {:?} in {}x{} (generation {})",
                    self.state.label, geometry.width, geometry.height, self.state.generation
                );
                if let Some(done) = waiting {
                    let _ = done.send(RepaintOutcome::Painted {
                        generation: self.state.generation,
                    });
                }
                None
            }
            Err(e) => {
                self.state.dirty = true;
                if let Some(done) = waiting {
                    let _ = done.send(RepaintOutcome::Failed(e.clone()));
                }
                self.escalate(e)
            }
        }
    }

    /// Take a fetched result as the current label. It sticks even if the
    /// repaint that follows fails.
    fn apply(&mut self, ticket: Ticket, outcome: TrackOutcome) {
        let label = match outcome {
            TrackOutcome::Title(title) => title,
            TrackOutcome::NoTrack => self.settings.idle_text.clone(),
        };
        if label != self.state.label {
            debug!("Label changed to {:?}", label);
            self.state.label = label;
            self.state.dirty = true;
        }
        self.state.label_ticket = ticket;
    }

    fn rejection(&self, ticket: Ticket) -> RepaintOutcome {
        if ticket <= self.state.label_ticket {
            RepaintOutcome::Stale
        } else {
            RepaintOutcome::Superseded
        }
    }

    fn escalate(&mut self, e: DrawError) -> Option<ShutdownReason> {
        if e.is_connection_lost() {
            error!("Repaint failed at {}: {}", e.step(), e);
            return Some(ShutdownReason::ConnectionLost(e.to_string()));
        }

        self.failures += 1;
        warn!(
            "Repaint failed ({}/{}): {}",
            self.failures, self.settings.max_draw_failures, e
        );
        if self.failures >= self.settings.max_draw_failures {
            error!("Giving up after {} consecutive draw failures", self.failures);
            return Some(ShutdownReason::DrawFailures(self.failures));
        }
        None
    }
}
