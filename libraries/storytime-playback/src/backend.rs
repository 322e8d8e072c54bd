//! Media backend contract
//!
//! The controller never decodes audio itself. It drives a `BackendPlayer`
//! that loads one file at a time and reports positions in nanoseconds.

use crate::controller::Shared;
use crate::error::Result;
use crate::types::Nanos;
use std::path::Path;
use std::sync::Weak;

/// Platform-specific media player
///
/// Every method is called with the controller's lock held and is expected
/// to return promptly.
pub trait BackendPlayer: Send {
    /// Load a file, paused at its start, and return its duration
    fn load(&mut self, path: &Path) -> Result<Nanos>;

    /// Start playing at the current position
    ///
    /// When the stream reaches its end the backend calls
    /// [`EndOfStream::fire`] on the token it was handed here. It must do so
    /// from its own thread, never from inside a `BackendPlayer` method.
    fn play(&mut self, end_of_stream: EndOfStream);

    /// Pause playback
    fn pause(&mut self);

    /// Seek within the loaded file
    fn seek(&mut self, position: Nanos);

    /// Current position, or None if the backend cannot tell right now
    fn position(&self) -> Option<Nanos>;

    /// Duration of the loaded file, or None if unknown right now
    fn duration(&self) -> Option<Nanos>;

    /// Current volume (1.0 = unity)
    fn volume(&self) -> f64 {
        1.0
    }

    /// Set volume
    fn set_volume(&mut self, volume: f64) {
        let _ = volume;
    }

    /// Release resources; no further calls follow
    fn shutdown(&mut self) {}
}

/// End-of-stream notification handed to [`BackendPlayer::play`]
///
/// Carries the controller's generation at the time playback started. Every
/// load, seek and pause moves the generation on, so a token fired after the
/// listener has moved elsewhere is ignored.
#[derive(Debug, Clone)]
pub struct EndOfStream {
    generation: u64,
    controller: Weak<Shared>,
}

impl EndOfStream {
    pub(crate) fn new(generation: u64, controller: Weak<Shared>) -> Self {
        Self {
            generation,
            controller,
        }
    }

    /// Generation this token was issued for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that the stream ended
    ///
    /// Blocks until the controller has handled it. Does nothing if the
    /// controller is gone or the token is stale.
    pub fn fire(self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.end_of_stream(self.generation);
        }
    }
}
