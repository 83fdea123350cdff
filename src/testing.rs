//! Fakes for the display and music collaborators, recording every request

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use xmpdp_mpd::{PlayerState, Song};

use crate::display::{Anchor, DisplayEvent, DisplaySession, EventSource, GcId, Geometry};
use crate::error::{ConnectionLost, DrawError, DrawStep, FetchError};
use crate::track::{MusicConnector, MusicSession};

/// A display request the fake accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Geometry(Geometry),
    CreateTextGc { gc: GcId, font: String },
    CreateFillGc(GcId),
    Fill { gc: GcId, geometry: Geometry },
    Text { gc: GcId, anchor: Anchor, text: String },
    FreeGc(GcId),
    Flush,
    Close,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

struct SessionState {
    geometry: Geometry,
    ops: Vec<Op>,
    failures: HashMap<DrawStep, DrawError>,
    next_gc: GcId,
    live_gcs: HashSet<GcId>,
    on_fill: Option<Hook>,
}

/// In-memory window that records what was drawn
#[derive(Clone)]
pub struct FakeSession {
    state: Arc<Mutex<SessionState>>,
}

impl FakeSession {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                geometry,
                ops: Vec::new(),
                failures: HashMap::new(),
                next_gc: 1,
                live_gcs: HashSet::new(),
                on_fill: None,
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_geometry(&self, geometry: Geometry) {
        self.with(|s| s.geometry = geometry);
    }

    /// Make every request of `step` fail with `error` until cleared
    pub fn fail(&self, step: DrawStep, error: DrawError) {
        self.with(|s| s.failures.insert(step, error));
    }

    pub fn clear_failures(&self) {
        self.with(|s| s.failures.clear());
    }

    /// Run `hook` whenever a rectangle gets filled
    pub fn on_fill(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.with(|s| s.on_fill = Some(Arc::new(hook)));
    }

    pub fn ops(&self) -> Vec<Op> {
        self.with(|s| s.ops.clone())
    }

    pub fn fills(&self) -> Vec<Geometry> {
        self.with(|s| {
            s.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Fill { geometry, .. } => Some(*geometry),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.with(|s| {
            s.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Text { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Text currently on screen: the last text drawn after the last clear
    pub fn visible_text(&self) -> Option<String> {
        self.with(|s| {
            s.ops.iter().fold(None, |visible, op| match op {
                Op::Fill { .. } => None,
                Op::Text { text, .. } => Some(text.clone()),
                _ => visible,
            })
        })
    }

    pub fn live_gcs(&self) -> usize {
        self.with(|s| s.live_gcs.len())
    }

    /// Repaints that started before the previous one flushed.
    ///
    /// Only meaningful for runs without injected failures, since a failed
    /// repaint never reaches its flush.
    pub fn overlaps(&self) -> usize {
        self.with(|s| {
            let mut open = false;
            let mut overlaps = 0;
            for op in &s.ops {
                match op {
                    Op::Geometry(_) if open => overlaps += 1,
                    Op::Geometry(_) => open = true,
                    Op::Flush => open = false,
                    _ => {}
                }
            }
            overlaps
        })
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.ops.iter().filter(|op| **op == Op::Close).count())
    }

    fn check(s: &SessionState, step: DrawStep) -> Result<(), DrawError> {
        match s.failures.get(&step) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn new_gc(s: &mut SessionState) -> GcId {
        let gc = s.next_gc;
        s.next_gc += 1;
        s.live_gcs.insert(gc);
        gc
    }
}

impl DisplaySession for FakeSession {
    fn geometry(&self) -> Result<Geometry, DrawError> {
        self.with(|s| {
            Self::check(s, DrawStep::QueryGeometry)?;
            s.ops.push(Op::Geometry(s.geometry));
            Ok(s.geometry)
        })
    }

    fn create_text_gc(&self, font: &str) -> Result<GcId, DrawError> {
        self.with(|s| {
            Self::check(s, DrawStep::OpenFont)?;
            Self::check(s, DrawStep::CreateGc)?;
            let gc = Self::new_gc(s);
            s.ops.push(Op::CreateTextGc {
                gc,
                font: font.to_string(),
            });
            Ok(gc)
        })
    }

    fn create_fill_gc(&self) -> Result<GcId, DrawError> {
        self.with(|s| {
            Self::check(s, DrawStep::CreateGc)?;
            let gc = Self::new_gc(s);
            s.ops.push(Op::CreateFillGc(gc));
            Ok(gc)
        })
    }

    fn fill_rectangle(&self, gc: GcId, geometry: Geometry) -> Result<(), DrawError> {
        let hook = self.with(|s| {
            Self::check(s, DrawStep::FillRectangle)?;
            s.ops.push(Op::Fill { gc, geometry });
            Ok::<_, DrawError>(s.on_fill.clone())
        })?;
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn draw_text(&self, gc: GcId, anchor: Anchor, text: &[u8]) -> Result<(), DrawError> {
        self.with(|s| {
            Self::check(s, DrawStep::DrawText)?;
            s.ops.push(Op::Text {
                gc,
                anchor,
                text: String::from_utf8_lossy(text).into_owned(),
            });
            Ok(())
        })
    }

    fn free_gc(&self, gc: GcId) -> Result<(), DrawError> {
        self.with(|s| {
            // The server frees the context even when it reports an error
            s.live_gcs.remove(&gc);
            Self::check(s, DrawStep::FreeGc)?;
            s.ops.push(Op::FreeGc(gc));
            Ok(())
        })
    }

    fn flush(&self) -> Result<(), DrawError> {
        self.with(|s| {
            Self::check(s, DrawStep::Flush)?;
            s.ops.push(Op::Flush);
            Ok(())
        })
    }

    fn close(&self) {
        self.with(|s| s.ops.push(Op::Close));
    }
}

type Reply = Result<(PlayerState, Option<Song>), FetchError>;

struct ConnectorState {
    script: VecDeque<Reply>,
    /// Repeated once the script runs out
    last: Reply,
    delay: Duration,
    connects: usize,
    closes: usize,
}

/// Scripted music daemon. Each session consumes one scripted reply.
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState {
                script: VecDeque::new(),
                last: Ok((PlayerState::Stop, None)),
                delay: Duration::ZERO,
                connects: 0,
                closes: 0,
            })),
        }
    }

    fn push(&self, reply: Reply) {
        self.state.lock().unwrap().script.push_back(reply);
    }

    pub fn push_playing(&self, file: &str) {
        let song = Song {
            file: file.to_string(),
            ..Default::default()
        };
        self.push(Ok((PlayerState::Play, Some(song))));
    }

    pub fn push_stopped(&self) {
        self.push(Ok((PlayerState::Stop, None)));
    }

    /// Stopped, with a song still selected in the queue
    pub fn push_stopped_with(&self, file: &str) {
        let song = Song {
            file: file.to_string(),
            ..Default::default()
        };
        self.push(Ok((PlayerState::Stop, Some(song))));
    }

    pub fn push_error(&self, error: FetchError) {
        self.push(Err(error));
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

pub struct FakeMusicSession {
    state: PlayerState,
    song: Option<Song>,
    owner: Arc<Mutex<ConnectorState>>,
}

#[async_trait]
impl MusicConnector for FakeConnector {
    type Session = FakeMusicSession;

    async fn connect(&self) -> Result<Self::Session, FetchError> {
        let (reply, delay) = {
            let mut s = self.state.lock().unwrap();
            s.connects += 1;
            if let Some(reply) = s.script.pop_front() {
                s.last = reply;
            }
            (s.last.clone(), s.delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let (state, song) = reply?;
        Ok(FakeMusicSession {
            state,
            song,
            owner: self.state.clone(),
        })
    }
}

#[async_trait]
impl MusicSession for FakeMusicSession {
    async fn player_state(&mut self) -> Result<PlayerState, FetchError> {
        Ok(self.state)
    }

    async fn current_song(&mut self) -> Result<Option<Song>, FetchError> {
        Ok(self.song.clone())
    }

    async fn close(&mut self) {
        self.owner.lock().unwrap().closes += 1;
    }
}

pub type EventSender = mpsc::UnboundedSender<Result<DisplayEvent, ConnectionLost>>;

/// Event source fed from a channel. Once the sender is gone it waits forever.
pub struct FakeEvents {
    rx: mpsc::UnboundedReceiver<Result<DisplayEvent, ConnectionLost>>,
}

pub fn fake_events() -> (EventSender, FakeEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, FakeEvents { rx })
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn next_event(&mut self) -> Result<DisplayEvent, ConnectionLost> {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}
