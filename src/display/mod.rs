//! Display collaborators
//!
//! The update engine talks to the display server only through these traits:
//! `DisplaySession` for drawing into the one window, `EventSource` for the
//! events that window receives. `x11` implements both on x11rb.

pub mod x11;

use async_trait::async_trait;

use crate::error::{ConnectionLost, DrawError};

/// Graphics context id
pub type GcId = u32;

/// Window size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

impl Geometry {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Text anchor inside the window (baseline origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub x: i16,
    pub y: i16,
}

/// Drawing requests against a single window.
///
/// Every call is checked: it returns only after the server accepted or
/// rejected the request.
pub trait DisplaySession: Send + 'static {
    /// Current window size, queried from the server
    fn geometry(&self) -> Result<Geometry, DrawError>;

    /// Graphics context with the foreground colour and the named font
    fn create_text_gc(&self, font: &str) -> Result<GcId, DrawError>;

    /// Graphics context whose foreground is the window background
    fn create_fill_gc(&self) -> Result<GcId, DrawError>;

    fn fill_rectangle(&self, gc: GcId, geometry: Geometry) -> Result<(), DrawError>;

    fn draw_text(&self, gc: GcId, anchor: Anchor, text: &[u8]) -> Result<(), DrawError>;

    fn free_gc(&self, gc: GcId) -> Result<(), DrawError>;

    fn flush(&self) -> Result<(), DrawError>;

    /// Release the window. Called once, after every task stopped.
    fn close(&self);
}

/// Window-system events the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The window (or the last region of a damage series) needs redrawing
    Expose,
    KeyRelease { code: u8 },
    ButtonPress { button: u8 },
    /// WM_DELETE_WINDOW from the window manager
    CloseRequested,
    /// The window was destroyed under us
    Destroyed,
    /// Anything else, including asynchronous protocol errors
    Ignored,
}

/// Source of display events
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next event. An error means the connection is unusable.
    async fn next_event(&mut self) -> Result<DisplayEvent, ConnectionLost>;
}
