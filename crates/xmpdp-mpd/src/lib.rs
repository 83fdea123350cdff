//! Xmpdp MPD client
//!
//! Just enough of the MPD text protocol to ask a running daemon what it is
//! playing. One client is one session; callers open a session per query and
//! close it when done.

mod proto;

pub use proto::{PlayerState, Song, Status};

use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Port MPD listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 6600;

const GREETING_PREFIX: &str = "OK MPD ";

/// Errors raised by an MPD session
#[derive(Debug, Error)]
pub enum MpdError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected greeting {0:?}")]
    Greeting(String),

    #[error("{command} failed with code {code}: {message}")]
    Ack {
        code: u32,
        command: String,
        message: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("connection closed by the daemon")]
    Closed,
}

/// A connected MPD session
pub struct MpdClient<S = TcpStream> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    version: String,
}

impl MpdClient<TcpStream> {
    /// Connect to the daemon over TCP and read its greeting
    pub async fn connect(host: &str, port: u16) -> Result<Self, MpdError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream).await
    }
}

impl<S: AsyncRead + AsyncWrite> MpdClient<S> {
    /// Start a session on an already connected stream
    pub async fn from_stream(stream: S) -> Result<Self, MpdError> {
        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(MpdError::Closed);
        }
        let greeting = line.trim_end();
        let version = greeting
            .strip_prefix(GREETING_PREFIX)
            .ok_or_else(|| MpdError::Greeting(greeting.to_string()))?
            .to_string();

        debug!("Connected to MPD {}", version);
        Ok(Self {
            reader,
            writer,
            version,
        })
    }

    /// Protocol version announced by the daemon
    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn password(&mut self, password: &str) -> Result<(), MpdError> {
        self.command(&format!("password {}", quote(password)))
            .await
            .map(|_| ())
    }

    /// The selected song, `None` when the queue has nothing selected
    pub async fn current_song(&mut self) -> Result<Option<Song>, MpdError> {
        let pairs = self.command("currentsong").await?;
        Song::from_pairs(pairs)
    }

    pub async fn status(&mut self) -> Result<Status, MpdError> {
        let pairs = self.command("status").await?;
        Status::from_pairs(pairs)
    }

    /// Ask the daemon to end the session. MPD closes without replying.
    pub async fn close(&mut self) -> Result<(), MpdError> {
        self.writer.write_all(b"close\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send one command line and collect the `key: value` pairs of its response
    pub async fn command(&mut self, command: &str) -> Result<Vec<(String, String)>, MpdError> {
        trace!(command, "mpd request");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut pairs = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(MpdError::Closed);
            }
            let entry = line.trim_end_matches(['\n', '\r']);

            if entry == "OK" {
                return Ok(pairs);
            }
            if let Some(rest) = entry.strip_prefix("ACK ") {
                return Err(proto::parse_ack(rest));
            }
            match entry.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
                None => return Err(MpdError::Malformed(entry.to_string())),
            }
        }
    }
}

/// Quote a command argument
fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
