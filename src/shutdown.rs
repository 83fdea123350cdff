//! Shared shutdown signal
//!
//! The first reason recorded wins; every task watches the same value.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Why the program is stopping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Quit key released in the window
    Quit,
    /// The window manager asked the window to close
    CloseRequested,
    /// Termination signal from outside
    Signal(&'static str),
    /// The display connection or the window is gone
    ConnectionLost(String),
    /// Drawing kept failing
    DrawFailures(u32),
    /// A task ended on its own before shutdown
    TaskFailed(&'static str),
}

impl ShutdownReason {
    /// Whether the process should report failure on exit
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::DrawFailures(_) | Self::TaskFailed(_)
        )
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "quit key pressed"),
            Self::CloseRequested => write!(f, "window closed"),
            Self::Signal(name) => write!(f, "received {name}"),
            Self::ConnectionLost(reason) => write!(f, "display connection lost: {reason}"),
            Self::DrawFailures(n) => write!(f, "{n} consecutive draw failures"),
            Self::TaskFailed(name) => write!(f, "{name} task stopped unexpectedly"),
        }
    }
}

/// Cloneable handle to the shutdown state
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Record `reason` unless shutdown already started. Returns true if this
    /// call started it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.rx.borrow().clone()
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives as long as any handle, including this one
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
