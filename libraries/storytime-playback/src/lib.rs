//! Storytime - Audiobook Playback
//!
//! Tracks where the listener is in a directory of sequential audio files and
//! keeps that position safe across pauses, restarts and crashes.
//!
//! This crate provides:
//! - A durable, append-only playlog of play/pause/seek events
//! - Crash-recovery autosave of the position while playing
//! - Seeks that cross file boundaries (past the end lands in the next file)
//! - Backtrack after pausing
//! - A line-oriented command router for stdin, named pipes and the like
//! - Typed notifications for a presentation layer
//!
//! # Architecture
//!
//! `storytime-playback` never decodes audio. The platform supplies a
//! [`BackendPlayer`] that loads, plays, pauses and seeks one file at a time;
//! the [`Controller`] owns everything else.
//!
//! All state sits behind a single lock. Commands from several threads, the
//! autosave timer and end-of-stream signals from the backend are applied one
//! at a time, and the playlog records them in that order.
//!
//! # Example: Driving Playback
//!
//! ```rust,no_run
//! use storytime_playback::{
//!     BackendPlayer, CommandRouter, Controller, EndOfStream, Nanos, Outcome, PlaybackConfig,
//!     Result,
//! };
//! use std::path::Path;
//!
//! struct Silence;
//!
//! impl BackendPlayer for Silence {
//!     fn load(&mut self, _path: &Path) -> Result<Nanos> {
//!         Ok(60 * storytime_playback::SECOND)
//!     }
//!     fn play(&mut self, _end_of_stream: EndOfStream) {}
//!     fn pause(&mut self) {}
//!     fn seek(&mut self, _position: Nanos) {}
//!     fn position(&self) -> Option<Nanos> {
//!         Some(0)
//!     }
//!     fn duration(&self) -> Option<Nanos> {
//!         Some(60 * storytime_playback::SECOND)
//!     }
//! }
//!
//! let controller = Controller::new(PlaybackConfig::new("/books/dune"), Box::new(Silence))?;
//! let events = controller.subscribe();
//! controller.start()?;
//!
//! let router = CommandRouter::new(controller.clone());
//! router.execute("seek 02.mp3 1:30")?;
//! if router.execute("quit")? == Outcome::Quit {
//!     controller.shutdown();
//! }
//! # drop(events);
//! # Ok::<(), storytime_playback::PlaybackError>(())
//! ```

mod backend;
mod controller;
mod entry;
mod error;
mod events;
mod library;
mod position;
mod position_log;
mod router;
mod timer;
pub mod types;

// Public exports
pub use backend::{BackendPlayer, EndOfStream};
pub use controller::{Controller, Session, MAX_VOLUME};
pub use entry::{
    LogEntry, ParseEntryError, EVENT_AUTO, EVENT_END_OF_BOOK, EVENT_LOAD_FAIL, EVENT_SEEK_FROM,
    EVENT_SEEK_TO, EVENT_START, EVENT_STOP,
};
pub use error::{PlaybackError, Result};
pub use events::PlaybackEvent;
pub use library::Library;
pub use position::{format_position, parse_position, PositionToken};
pub use position_log::{Appended, PositionLog, Recovery};
pub use router::{CommandRouter, Handler, Outcome};
pub use timer::RepeatingTimer;
pub use types::{
    duration_to_nanos, Nanos, PlaybackConfig, PlaybackState, PositionReport, SECOND,
};
