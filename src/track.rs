//! Track source
//!
//! Asks the music daemon what is playing. Every query opens its own session
//! and closes it afterwards, so a daemon restart between cycles is harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};
use xmpdp_mpd::{MpdClient, PlayerState, Song};

use crate::config::{LabelField, MpdConfig};
use crate::error::FetchError;

/// What one successful query found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Something is playing or paused; the label to show
    Title(String),
    /// Player stopped or nothing selected
    NoTrack,
}

/// One open session with the music daemon
#[async_trait]
pub trait MusicSession: Send {
    async fn player_state(&mut self) -> Result<PlayerState, FetchError>;

    async fn current_song(&mut self) -> Result<Option<Song>, FetchError>;

    async fn close(&mut self);
}

/// Opens sessions with the music daemon
#[async_trait]
pub trait MusicConnector: Send + Sync + 'static {
    type Session: MusicSession;

    async fn connect(&self) -> Result<Self::Session, FetchError>;
}

/// Connector for a daemon reachable over TCP
#[derive(Debug, Clone)]
pub struct MpdConnector {
    host: String,
    port: u16,
    password: Option<String>,
}

impl MpdConnector {
    pub fn new(config: &MpdConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl MusicConnector for MpdConnector {
    type Session = MpdClient;

    async fn connect(&self) -> Result<Self::Session, FetchError> {
        let mut client = MpdClient::connect(&self.host, self.port).await?;
        if let Some(password) = &self.password {
            client.password(password).await?;
        }
        Ok(client)
    }
}

#[async_trait]
impl MusicSession for MpdClient {
    async fn player_state(&mut self) -> Result<PlayerState, FetchError> {
        Ok(self.status().await?.state)
    }

    async fn current_song(&mut self) -> Result<Option<Song>, FetchError> {
        Ok(MpdClient::current_song(self).await?)
    }

    async fn close(&mut self) {
        if let Err(e) = MpdClient::close(self).await {
            trace!("Closing MPD session failed: {}", e);
        }
    }
}

/// Queries the current track through a connector
pub struct TrackSource<C> {
    connector: Arc<C>,
    timeout: Duration,
    field: LabelField,
}

impl<C> Clone for TrackSource<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            timeout: self.timeout,
            field: self.field,
        }
    }
}

impl<C: MusicConnector> TrackSource<C> {
    pub fn new(connector: C, timeout: Duration, field: LabelField) -> Self {
        Self {
            connector: Arc::new(connector),
            timeout,
            field,
        }
    }

    /// The label for whatever is playing now
    pub async fn current_title(&self) -> Result<TrackOutcome, FetchError> {
        tokio::time::timeout(self.timeout, self.query())
            .await
            .unwrap_or(Err(FetchError::Timeout(self.timeout)))
    }

    pub async fn player_state(&self) -> Result<PlayerState, FetchError> {
        tokio::time::timeout(self.timeout, async {
            let mut session = self.connector.connect().await?;
            let state = session.player_state().await;
            session.close().await;
            state
        })
        .await
        .unwrap_or(Err(FetchError::Timeout(self.timeout)))
    }

    async fn query(&self) -> Result<TrackOutcome, FetchError> {
        let mut session = self.connector.connect().await?;
        let outcome = self.read(&mut session).await;
        session.close().await;
        outcome
    }

    async fn read(&self, session: &mut C::Session) -> Result<TrackOutcome, FetchError> {
        // A stopped player still reports the selected song
        if session.player_state().await? == PlayerState::Stop {
            debug!("Player stopped");
            return Ok(TrackOutcome::NoTrack);
        }

        Ok(match session.current_song().await? {
            Some(song) => TrackOutcome::Title(label_for(&song, self.field)),
            None => TrackOutcome::NoTrack,
        })
    }
}

fn label_for(song: &Song, field: LabelField) -> String {
    match field {
        LabelField::File => song.file.clone(),
        LabelField::Title => song
            .title
            .as_ref()
            .or(song.name.as_ref())
            .unwrap_or(&song.file)
            .clone(),
    }
}
