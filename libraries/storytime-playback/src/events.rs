//! Playback Events
//!
//! Notifications for the presentation layer. Subscribers get their own
//! unbounded channel, so sending never blocks the controller.

use crate::entry::LogEntry;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Events emitted by the playback controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Something failed but playback carries on
    Error {
        /// Human-readable description
        message: String,
    },

    /// Good moment to re-poll the position (play, pause, seek)
    PositionChanged,

    /// Playing flag changed
    PlayingChanged { playing: bool },

    /// End-of-book flag changed
    EndOfBookChanged { end_of_book: bool },

    /// A different file is loaded
    FileChanged { filename: String },

    /// An entry was added to the playlog
    LogAppended { entry: LogEntry },

    /// Backend volume changed
    VolumeChanged { volume: f64 },
}

/// Fan-out of events to any number of subscribers
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send to every live subscriber, dropping the ones that hung up
    pub(crate) fn emit(&mut self, event: PlaybackEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(PlaybackEvent::Error { message });
    }
}
