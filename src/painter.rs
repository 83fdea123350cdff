//! Text painter
//!
//! Clear-then-draw against a `DisplaySession`. Every request is checked before
//! the next one is sent; a graphics context acquired before a failure is
//! always released.

use tracing::debug;

use crate::display::{Anchor, DisplaySession, Geometry};
use crate::error::DrawError;

/// Longest string a single core-protocol text request carries
pub const MAX_TEXT_BYTES: usize = 255;

#[derive(Debug, Clone)]
pub struct TextPainter {
    font: String,
    anchor: Anchor,
}

impl TextPainter {
    pub fn new(font: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            font: font.into(),
            anchor,
        }
    }

    /// Draw `text` at the anchor. Empty text draws nothing.
    pub fn paint<S: DisplaySession + ?Sized>(&self, session: &S, text: &str) -> Result<(), DrawError> {
        if text.is_empty() {
            return Ok(());
        }

        let gc = session.create_text_gc(&self.font)?;
        let drawn = session.draw_text(gc, self.anchor, clip_text(text));
        release(session, gc, drawn)
    }

    /// Fill `geometry` with the window background
    pub fn clear<S: DisplaySession + ?Sized>(
        &self,
        session: &S,
        geometry: Geometry,
    ) -> Result<(), DrawError> {
        let gc = session.create_fill_gc()?;
        let filled = session.fill_rectangle(gc, geometry);
        release(session, gc, filled)
    }

    /// One repaint cycle: fresh geometry, clear, draw, flush.
    ///
    /// Returns the geometry that was cleared.
    pub fn repaint<S: DisplaySession + ?Sized>(
        &self,
        session: &S,
        text: &str,
    ) -> Result<Geometry, DrawError> {
        let geometry = session.geometry()?;
        self.clear(session, geometry)?;
        self.paint(session, text)?;
        session.flush()?;
        Ok(geometry)
    }
}

/// Free `gc`, reporting the earlier failure first if there was one
fn release<S: DisplaySession + ?Sized>(
    session: &S,
    gc: u32,
    result: Result<(), DrawError>,
) -> Result<(), DrawError> {
    let freed = session.free_gc(gc);
    match (result, freed) {
        (Err(e), Err(free_err)) => {
            debug!("Also failed to free graphics context {}: {}", gc, free_err);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), freed) => freed,
    }
}

/// Cut `text` to the protocol limit on a character boundary
pub fn clip_text(text: &str) -> &[u8] {
    if text.len() <= MAX_TEXT_BYTES {
        return text.as_bytes();
    }
    let mut end = MAX_TEXT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text.as_bytes()[..end]
}
