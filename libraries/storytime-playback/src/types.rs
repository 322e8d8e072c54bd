//! Core types for audiobook playback

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Positions and durations are signed nanoseconds.
///
/// Negative values show up transiently while resolving a seek that
/// crosses into an earlier file.
pub type Nanos = i64;

/// One second in [`Nanos`]
pub const SECOND: Nanos = 1_000_000_000;

/// Suffix appended to the playlog path to get the autosave path
pub const AUTOSAVE_SUFFIX: &str = ".auto";

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Paused, or nothing loaded yet
    Stopped,

    /// Currently playing
    Playing,

    /// Tried to advance past the last file
    EndOfBook,
}

/// Snapshot of where the listener is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
    /// File relative to the audiobook directory (None before the first load)
    pub filename: Option<String>,

    /// Position within the file
    pub position: Nanos,

    /// Duration of the file
    pub duration: Nanos,
}

/// Configuration for the playback controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Audiobook directory
    pub directory: PathBuf,

    /// Playlog path, relative to `directory` unless absolute (default: `.playlog`)
    #[serde(default = "default_playlog_file")]
    pub playlog_file: PathBuf,

    /// How often the position is autosaved while playing (default: 60s)
    #[serde(default = "default_autosave_interval", with = "seconds")]
    pub autosave_interval: Duration,

    /// How far to rewind after pausing (default: 10s, zero disables)
    #[serde(default = "default_backtrack", with = "seconds")]
    pub backtrack: Duration,

    /// Extra extensions treated as audio, without the leading dot
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Start playing right after resuming (default: false)
    #[serde(default)]
    pub autoplay: bool,
}

impl PlaybackConfig {
    /// Configuration with defaults for the given audiobook directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            playlog_file: default_playlog_file(),
            autosave_interval: default_autosave_interval(),
            backtrack: default_backtrack(),
            extensions: Vec::new(),
            autoplay: false,
        }
    }

    /// Resolved playlog path
    pub fn playlog_path(&self) -> PathBuf {
        resolve(&self.directory, &self.playlog_file)
    }

    /// Resolved autosave path (playlog path plus [`AUTOSAVE_SUFFIX`])
    pub fn autosave_path(&self) -> PathBuf {
        let mut path = self.playlog_path().into_os_string();
        path.push(AUTOSAVE_SUFFIX);
        PathBuf::from(path)
    }

    /// Backtrack as nanoseconds
    pub fn backtrack_nanos(&self) -> Nanos {
        duration_to_nanos(self.backtrack)
    }
}

/// Convert a [`Duration`] to [`Nanos`], saturating at `i64::MAX`
pub fn duration_to_nanos(duration: Duration) -> Nanos {
    Nanos::try_from(duration.as_nanos()).unwrap_or(Nanos::MAX)
}

fn resolve(directory: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        directory.join(file)
    }
}

fn default_playlog_file() -> PathBuf {
    PathBuf::from(".playlog")
}

fn default_autosave_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_backtrack() -> Duration {
    Duration::from_secs(10)
}

/// Durations are written as whole seconds in config files
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
