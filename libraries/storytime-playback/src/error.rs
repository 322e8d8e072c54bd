//! Error types for audiobook playback

use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The backend could not open or decode a file
    #[error("Failed to load {file}: {reason}")]
    LoadFailed { file: String, reason: String },

    /// The audiobook directory holds nothing playable
    #[error("No valid files in audiobook directory")]
    NoPlayableFiles,

    /// Nothing has been loaded yet
    #[error("No file loaded")]
    NoCurrentFile,

    /// Event names end up as a single token in the playlog
    #[error("Invalid event name: {0:?}")]
    InvalidEvent(String),

    /// Position token could not be parsed
    #[error("Invalid position: {0:?}")]
    InvalidPosition(String),

    /// Volume was not a finite number
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    /// Command line did not match any known verb or handler
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// Known verb with the wrong arguments
    #[error("Failed to parse: {0:?}")]
    MalformedCommand(String),

    /// Backend player error
    #[error("Backend error: {0}")]
    Backend(String),

    /// The controller has been shut down
    #[error("Controller has been shut down")]
    ShutDown,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
