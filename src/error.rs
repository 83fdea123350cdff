//! Error types shared by the update engine
//!
//! Errors local to one cycle (a fetch, a single draw) are absorbed where they
//! happen. Only `ConnectionLost` and repeated draw failures reach the
//! supervisor.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use xmpdp_mpd::MpdError;

/// The display-server request a draw error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawStep {
    QueryGeometry,
    OpenFont,
    CreateGc,
    CloseFont,
    FillRectangle,
    DrawText,
    FreeGc,
    Flush,
}

impl fmt::Display for DrawStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryGeometry => "query window geometry",
            Self::OpenFont => "open font",
            Self::CreateGc => "create graphics context",
            Self::CloseFont => "close font",
            Self::FillRectangle => "fill rectangle",
            Self::DrawText => "draw text",
            Self::FreeGc => "free graphics context",
            Self::Flush => "flush requests",
        };
        f.write_str(name)
    }
}

/// A drawing request failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DrawError {
    /// The server answered the request with an error; the connection is fine
    #[error("cannot {step}: request rejected ({kind})")]
    Rejected { step: DrawStep, kind: String },

    /// The connection itself is unusable
    #[error("cannot {step}: display connection lost ({reason})")]
    ConnectionLost { step: DrawStep, reason: String },
}

impl DrawError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    pub fn step(&self) -> DrawStep {
        match self {
            Self::Rejected { step, .. } | Self::ConnectionLost { step, .. } => *step,
        }
    }

    pub fn from_connection(step: DrawStep, err: ConnectionError) -> Self {
        Self::ConnectionLost {
            step,
            reason: err.to_string(),
        }
    }

    pub fn from_reply(step: DrawStep, err: ReplyError) -> Self {
        match err {
            ReplyError::ConnectionError(e) => Self::from_connection(step, e),
            ReplyError::X11Error(e) => Self::Rejected {
                step,
                kind: format!("{:?}", e.error_kind),
            },
        }
    }

    pub fn from_reply_or_id(step: DrawStep, err: ReplyOrIdError) -> Self {
        match err {
            ReplyOrIdError::ConnectionError(e) => Self::from_connection(step, e),
            ReplyOrIdError::X11Error(e) => Self::Rejected {
                step,
                kind: format!("{:?}", e.error_kind),
            },
            ReplyOrIdError::IdsExhausted => Self::Rejected {
                step,
                kind: "resource ids exhausted".into(),
            },
        }
    }
}

/// Fetching the current track failed. Never fatal: the previous label stays.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("music daemon unreachable: {0}")]
    Unreachable(String),

    #[error("malformed reply from music daemon: {0}")]
    Malformed(String),

    #[error("music daemon closed the session mid-query")]
    SessionReset,

    #[error("music daemon rejected {command}: {message}")]
    Rejected { command: String, message: String },

    #[error("music daemon did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<MpdError> for FetchError {
    fn from(err: MpdError) -> Self {
        match err {
            MpdError::Io(e) => Self::Unreachable(e.to_string()),
            MpdError::Greeting(g) => Self::Malformed(format!("greeting {g:?}")),
            MpdError::Malformed(m) => Self::Malformed(m),
            MpdError::Closed => Self::SessionReset,
            MpdError::Ack {
                command, message, ..
            } => Self::Rejected { command, message },
        }
    }
}

/// The display connection broke while waiting for events
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("display connection lost: {0}")]
pub struct ConnectionLost(pub String);

impl From<ConnectionError> for ConnectionLost {
    fn from(err: ConnectionError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpd_errors_map_to_fetch_errors() {
        assert_eq!(FetchError::from(MpdError::Closed), FetchError::SessionReset);
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(matches!(
            FetchError::from(MpdError::Io(refused)),
            FetchError::Unreachable(_)
        ));
    }

    #[test]
    fn only_connection_errors_are_fatal() {
        let rejected = DrawError::Rejected {
            step: DrawStep::CreateGc,
            kind: "GContext".into(),
        };
        assert!(!rejected.is_connection_lost());

        let lost = DrawError::from_connection(DrawStep::Flush, ConnectionError::UnknownError);
        assert!(lost.is_connection_lost());
        assert_eq!(lost.step(), DrawStep::Flush);
    }
}
