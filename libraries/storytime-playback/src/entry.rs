//! Playlog entries
//!
//! One entry per line: `<walltime> <event> <filename> <position> <duration>`.
//! The filename may contain spaces, so the first two and the last two
//! space-separated fields are reserved and everything in between is the
//! filename.

use crate::types::Nanos;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Event token for starting playback
pub const EVENT_START: &str = "start";
/// Event token for pausing
pub const EVENT_STOP: &str = "stop";
/// Event token for the position a seek landed on
pub const EVENT_SEEK_TO: &str = "seekto";
/// Event token for the position a seek left from
pub const EVENT_SEEK_FROM: &str = "seekfrom";
/// Event token for autosaved positions
pub const EVENT_AUTO: &str = "auto";
/// Event token for files the backend could not load
pub const EVENT_LOAD_FAIL: &str = "loadfail";
/// Event token for reaching the end of the book
pub const EVENT_END_OF_BOOK: &str = "eob";

/// Why a playlog line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseEntryError {
    #[error("expected at least 5 fields")]
    MissingFields,

    #[error("invalid walltime: {0:?}")]
    Walltime(String),

    #[error("invalid position: {0:?}")]
    Position(String),

    #[error("invalid duration: {0:?}")]
    Duration(String),

    #[error("empty event")]
    EmptyEvent,
}

/// A single playlog event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the Unix epoch
    pub walltime: u64,

    /// Event token (start, stop, seekto, ...)
    pub event: String,

    /// File relative to the audiobook directory
    pub filename: String,

    /// Position within the file
    pub position: Nanos,

    /// Duration of the file
    pub duration: Nanos,
}

impl LogEntry {
    pub fn new(
        walltime: u64,
        event: impl Into<String>,
        filename: impl Into<String>,
        position: Nanos,
        duration: Nanos,
    ) -> Self {
        Self {
            walltime,
            event: event.into(),
            filename: filename.into(),
            position,
            duration,
        }
    }

    /// Parse one line, with or without its trailing newline
    pub fn parse(line: &str) -> Result<Self, ParseEntryError> {
        line.parse()
    }

    /// Whether `event` can be stored as a single playlog token
    pub fn is_valid_event(event: &str) -> bool {
        !event.is_empty() && !event.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.walltime, self.event, self.filename, self.position, self.duration
        )
    }
}

impl FromStr for LogEntry {
    type Err = ParseEntryError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\n').unwrap_or(line);

        let mut head = line.splitn(3, ' ');
        let walltime = head.next().ok_or(ParseEntryError::MissingFields)?;
        let event = head.next().ok_or(ParseEntryError::MissingFields)?;
        let rest = head.next().ok_or(ParseEntryError::MissingFields)?;

        let mut tail = rest.rsplitn(3, ' ');
        let duration = tail.next().ok_or(ParseEntryError::MissingFields)?;
        let position = tail.next().ok_or(ParseEntryError::MissingFields)?;
        let filename = tail.next().ok_or(ParseEntryError::MissingFields)?;

        if event.is_empty() {
            return Err(ParseEntryError::EmptyEvent);
        }

        Ok(Self {
            walltime: walltime
                .parse()
                .map_err(|_| ParseEntryError::Walltime(walltime.to_string()))?,
            event: event.to_string(),
            filename: filename.to_string(),
            position: position
                .parse()
                .map_err(|_| ParseEntryError::Position(position.to_string()))?,
            duration: duration
                .parse()
                .map_err(|_| ParseEntryError::Duration(duration.to_string()))?,
        })
    }
}
