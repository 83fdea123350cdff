//! Response types for the MPD text protocol

use std::str::FromStr;

use crate::MpdError;

/// Playback state reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Play,
    Pause,
    Stop,
}

impl FromStr for PlayerState {
    type Err = MpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "stop" => Ok(Self::Stop),
            other => Err(MpdError::Malformed(format!("unknown player state {other:?}"))),
        }
    }
}

/// The song MPD reports from `currentsong`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Song {
    /// URI of the song relative to the music directory
    pub file: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Stream name (radio stations)
    pub name: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Position in the queue
    pub pos: Option<u32>,
    pub id: Option<u32>,
}

impl Song {
    /// Build a song from the pairs of a `currentsong` response.
    ///
    /// An empty response means nothing is selected and yields `None`.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Option<Self>, MpdError> {
        if pairs.is_empty() {
            return Ok(None);
        }

        let mut song = Song::default();
        let mut has_file = false;
        for (key, value) in pairs {
            match key.as_str() {
                "file" => {
                    song.file = value;
                    has_file = true;
                }
                "Title" => song.title = Some(value),
                "Artist" => song.artist = Some(value),
                "Album" => song.album = Some(value),
                "Name" => song.name = Some(value),
                "duration" => song.duration = Some(parse_field(&key, &value)?),
                // Older daemons only send the integral `Time`
                "Time" if song.duration.is_none() => {
                    song.duration = Some(parse_field(&key, &value)?)
                }
                "Pos" => song.pos = Some(parse_field(&key, &value)?),
                "Id" => song.id = Some(parse_field(&key, &value)?),
                _ => {}
            }
        }

        if !has_file {
            return Err(MpdError::Malformed(
                "currentsong response without a file entry".into(),
            ));
        }
        Ok(Some(song))
    }
}

/// Subset of the `status` response
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: PlayerState,
    /// `None` when the output has no mixer
    pub volume: Option<u8>,
    /// Queue position of the current song
    pub song: Option<u32>,
    pub elapsed: Option<f64>,
}

impl Status {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, MpdError> {
        let mut state = None;
        let mut volume = None;
        let mut song = None;
        let mut elapsed = None;

        for (key, value) in pairs {
            match key.as_str() {
                "state" => state = Some(value.parse()?),
                "volume" => {
                    let v: i32 = parse_field(&key, &value)?;
                    volume = u8::try_from(v).ok();
                }
                "song" => song = Some(parse_field(&key, &value)?),
                "elapsed" => elapsed = Some(parse_field(&key, &value)?),
                _ => {}
            }
        }

        let state =
            state.ok_or_else(|| MpdError::Malformed("status response without a state".into()))?;
        Ok(Self {
            state,
            volume,
            song,
            elapsed,
        })
    }
}

fn parse_field<T: FromStr>(key: &str, value: &str) -> Result<T, MpdError> {
    value
        .parse()
        .map_err(|_| MpdError::Malformed(format!("invalid value {value:?} for {key}")))
}

/// Parse the remainder of an `ACK [code@index] {command} message` line.
pub(crate) fn parse_ack(rest: &str) -> MpdError {
    let malformed = || MpdError::Malformed(format!("ACK {rest}"));

    let Some(rest) = rest.strip_prefix('[') else {
        return malformed();
    };
    let Some((location, rest)) = rest.split_once(']') else {
        return malformed();
    };
    let code = location
        .split_once('@')
        .and_then(|(code, _)| code.parse().ok())
        .unwrap_or(0);

    let rest = rest.trim_start();
    let (command, message) = match rest
        .strip_prefix('{')
        .and_then(|r| r.split_once('}'))
    {
        Some((command, message)) => (command.to_string(), message.trim().to_string()),
        None => (String::new(), rest.to_string()),
    };

    MpdError::Ack {
        code,
        command,
        message,
    }
}
