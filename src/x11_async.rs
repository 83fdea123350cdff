//! X11 Async Event Stream
//!
//! Non-blocking X11 event polling: a mio thread watches the connection's file
//! descriptor and wakes the event loop when it becomes readable.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};
use tracing::{info, trace, warn};
use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{Atom, Window};
use x11rb::rust_connection::RustConnection;

use crate::display::{DisplayEvent, EventSource};
use crate::error::ConnectionLost;

/// Upper bound on how long buffered events can wait unnoticed.
///
/// A reply wait on the drawing side may read events off the socket into
/// x11rb's queue, in which case the descriptor never turns readable for them.
const REPOLL_INTERVAL: Duration = Duration::from_millis(100);

/// X11 event stream with async polling support
pub struct X11EventStream {
    conn: Arc<RustConnection>,
    window: Window,
    wm_delete: Option<Atom>,
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    /// Create a new event stream for `window`
    ///
    /// Spawns a blocking task that polls the X11 file descriptor with mio and
    /// stops once the stream is dropped.
    pub fn new(conn: Arc<RustConnection>, window: Window, wm_delete: Option<Atom>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .context("Failed to register X11 FD with mio")?;

        tokio::task::spawn_blocking(move || {
            loop {
                if guard.is_closed() {
                    info!("X11 socket polling thread shutting down");
                    return;
                }

                match poll.poll(&mut events, Some(REPOLL_INTERVAL)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        // The event loop keeps re-polling on its own timer
                        warn!("X11 socket poll failed, stopping readiness thread: {:?}", err);
                        return;
                    }
                }

                events
                    .iter()
                    .filter(|event| event.token() == mio::Token(0))
                    .for_each(|_| task_notify.notify_one());
            }
        });

        Ok(Self {
            conn,
            window,
            wm_delete,
            notify,
            _task_guard: task_guard,
        })
    }

    /// Non-blocking: next event from x11rb's queue, if any
    pub fn poll_next_event(&self) -> Result<Option<Event>, ConnectionError> {
        self.conn.poll_for_event()
    }

    /// Wait until the descriptor is readable or the re-poll interval elapses
    pub async fn wait_readable(&self) {
        let _ = tokio::time::timeout(REPOLL_INTERVAL, self.notify.notified()).await;
    }
}

#[async_trait]
impl EventSource for X11EventStream {
    async fn next_event(&mut self) -> Result<DisplayEvent, ConnectionLost> {
        loop {
            if let Some(event) = self.poll_next_event()? {
                return Ok(translate(&event, self.window, self.wm_delete));
            }
            self.wait_readable().await;
        }
    }
}

/// Reduce an X11 event to what the event loop cares about
fn translate(event: &Event, window: Window, wm_delete: Option<Atom>) -> DisplayEvent {
    match event {
        // Only the last expose of a series triggers a redraw
        Event::Expose(e) if e.window == window && e.count == 0 => DisplayEvent::Expose,
        Event::KeyRelease(e) => DisplayEvent::KeyRelease { code: e.detail },
        Event::ButtonPress(e) => DisplayEvent::ButtonPress { button: e.detail },
        Event::ClientMessage(e)
            if e.format == 32 && Some(e.data.as_data32()[0]) == wm_delete =>
        {
            DisplayEvent::CloseRequested
        }
        Event::DestroyNotify(e) if e.window == window => DisplayEvent::Destroyed,
        Event::Error(e) => {
            warn!(
                "X11 error {:?} (opcode {}), ignoring",
                e.error_kind, e.major_opcode
            );
            DisplayEvent::Ignored
        }
        _ => {
            trace!("Ignoring unhandled event");
            DisplayEvent::Ignored
        }
    }
}
