//! x11rb-backed display session
//!
//! Creates (or adopts) the window at startup and implements the checked
//! drawing requests the painter needs.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::ErrorKind;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::COPY_FROM_PARENT;

use super::{Anchor, DisplaySession, GcId, Geometry};
use crate::config::WindowConfig;
use crate::error::{DrawError, DrawStep};
use crate::x11_async::X11EventStream;

/// WM_CLASS instance and class, NUL separated
const WM_CLASS: &[u8] = b"xmpdp\0Xmpdp\0";

/// The connection and the one window the program draws into
pub struct X11Session {
    conn: Arc<RustConnection>,
    window: Window,
    /// False when drawing on the root window
    owned: bool,
    wm_delete: Option<Atom>,
    foreground: u32,
    background: u32,
}

impl X11Session {
    /// Connect to the X server and create, name and map the window
    pub fn open(config: &WindowConfig) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);

        let (root, visual) = {
            let screen = conn
                .setup()
                .roots
                .get(screen_num)
                .context("Cannot open screen")?;
            (screen.root, screen.root_visual)
        };
        info!("Connected to X server, screen {}, root window {}", screen_num, root);

        if config.use_root {
            conn.change_window_attributes(
                root,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::EXPOSURE),
            )?
            .check()
            .context("Cannot select events on the root window")?;
            conn.flush()?;
            info!("Drawing on the root window");
            return Ok(Self {
                conn,
                window: root,
                owned: false,
                wm_delete: None,
                foreground: config.foreground,
                background: config.background,
            });
        }

        let window = conn.generate_id()?;
        conn.create_window(
            COPY_FROM_PARENT as u8,
            window,
            root,
            config.x,
            config.y,
            config.width,
            config.height,
            config.border,
            WindowClass::INPUT_OUTPUT,
            visual,
            &CreateWindowAux::new()
                .background_pixel(config.background)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::KEY_RELEASE
                        | EventMask::BUTTON_PRESS
                        | EventMask::STRUCTURE_NOTIFY,
                ),
        )?
        .check()
        .context("Cannot create window")?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            config.title.as_bytes(),
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            WM_CLASS,
        )?;

        // Let the window manager ask us to close instead of killing the client
        let wm_protocols = conn.intern_atom(false, b"WM_PROTOCOLS")?.reply()?.atom;
        let wm_delete = conn.intern_atom(false, b"WM_DELETE_WINDOW")?.reply()?.atom;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            wm_protocols,
            AtomEnum::ATOM,
            &[wm_delete],
        )?;

        conn.map_window(window)?
            .check()
            .context("Cannot map window")?;
        conn.flush().context("Cannot flush")?;

        info!(
            "Window {} created: {}x{}+{}+{}",
            window, config.width, config.height, config.x, config.y
        );

        Ok(Self {
            conn,
            window,
            owned: true,
            wm_delete: Some(wm_delete),
            foreground: config.foreground,
            background: config.background,
        })
    }

    /// Event stream for this session's window
    pub fn event_stream(&self) -> Result<X11EventStream> {
        X11EventStream::new(self.conn.clone(), self.window, self.wm_delete)
    }

    fn new_id(&self, step: DrawStep) -> Result<u32, DrawError> {
        self.conn
            .generate_id()
            .map_err(|e| DrawError::from_reply_or_id(step, e))
    }
}

/// Send a request and wait for the server to accept or reject it
fn checked<C: RequestConnection>(
    step: DrawStep,
    request: Result<VoidCookie<'_, C>, ConnectionError>,
) -> Result<(), DrawError> {
    request
        .map_err(|e| DrawError::from_connection(step, e))?
        .check()
        .map_err(|e| DrawError::from_reply(step, e))
}

impl DisplaySession for X11Session {
    fn geometry(&self) -> Result<Geometry, DrawError> {
        let step = DrawStep::QueryGeometry;
        let reply = self
            .conn
            .get_geometry(self.window)
            .map_err(|e| DrawError::from_connection(step, e))?
            .reply()
            .map_err(|e| match e {
                // The window is gone; nothing left to draw into
                ReplyError::X11Error(ref x)
                    if matches!(x.error_kind, ErrorKind::Drawable | ErrorKind::Window) =>
                {
                    DrawError::ConnectionLost {
                        step,
                        reason: "window no longer exists".into(),
                    }
                }
                other => DrawError::from_reply(step, other),
            })?;
        Ok(Geometry::new(reply.width, reply.height))
    }

    fn create_text_gc(&self, font: &str) -> Result<GcId, DrawError> {
        let font_id = self.new_id(DrawStep::OpenFont)?;
        checked(
            DrawStep::OpenFont,
            self.conn.open_font(font_id, font.as_bytes()),
        )?;

        let created = self.new_id(DrawStep::CreateGc).and_then(|gc| {
            checked(
                DrawStep::CreateGc,
                self.conn.create_gc(
                    gc,
                    self.window,
                    &CreateGCAux::new()
                        .foreground(self.foreground)
                        .background(self.background)
                        .font(font_id),
                ),
            )
            .map(|()| gc)
        });

        // The GC keeps its own reference to the font
        let closed = checked(DrawStep::CloseFont, self.conn.close_font(font_id));

        let gc = created?;
        if let Err(e) = closed {
            let _ = self.free_gc(gc);
            return Err(e);
        }
        Ok(gc)
    }

    fn create_fill_gc(&self) -> Result<GcId, DrawError> {
        let gc = self.new_id(DrawStep::CreateGc)?;
        checked(
            DrawStep::CreateGc,
            self.conn.create_gc(
                gc,
                self.window,
                &CreateGCAux::new()
                    .foreground(self.background)
                    .graphics_exposures(0u32),
            ),
        )?;
        Ok(gc)
    }

    fn fill_rectangle(&self, gc: GcId, geometry: Geometry) -> Result<(), DrawError> {
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: geometry.width,
            height: geometry.height,
        };
        checked(
            DrawStep::FillRectangle,
            self.conn.poly_fill_rectangle(self.window, gc, &[rect]),
        )
    }

    fn draw_text(&self, gc: GcId, anchor: Anchor, text: &[u8]) -> Result<(), DrawError> {
        checked(
            DrawStep::DrawText,
            self.conn
                .image_text8(self.window, gc, anchor.x, anchor.y, text),
        )
    }

    fn free_gc(&self, gc: GcId) -> Result<(), DrawError> {
        checked(DrawStep::FreeGc, self.conn.free_gc(gc))
    }

    fn flush(&self) -> Result<(), DrawError> {
        self.conn
            .flush()
            .map_err(|e| DrawError::from_connection(DrawStep::Flush, e))
    }

    fn close(&self) {
        if self.owned {
            if let Err(e) = self.conn.destroy_window(self.window) {
                debug!("Failed to destroy window {}: {}", self.window, e);
            }
        }
        if let Err(e) = self.conn.flush() {
            debug!("Failed to flush on close: {}", e);
        }
        info!("Display session released");
    }
}
