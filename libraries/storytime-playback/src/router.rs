//! Text command router
//!
//! Turns command lines from any number of sources into controller calls.
//! Each line is parsed and dispatched inside a single controller
//! transaction, so commands from different sources interleave line by line
//! but never within a line.
//!
//! Grammar: `<verb> [filename words...] [position]`

use crate::controller::{Controller, Session};
use crate::error::{PlaybackError, Result};
use crate::position::{parse_position, PositionToken};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Handler for a registered extension verb
///
/// Receives the locked session and the words after the verb.
pub type Handler = dyn Fn(&mut Session, &[&str]) -> Result<()> + Send + Sync;

/// What the caller should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading commands
    Continue,

    /// A `quit` command was received
    Quit,
}

/// Parses command lines and dispatches them to the controller
pub struct CommandRouter {
    controller: Controller,
    handlers: RwLock<HashMap<String, Arc<Handler>>>,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("handlers", &self.handlers.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// The controller commands are dispatched to
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Register a handler for a verb the router does not know
    ///
    /// Built-in verbs always win. Registering a verb twice replaces the
    /// earlier handler.
    pub fn register<F>(&self, verb: impl Into<String>, handler: F)
    where
        F: Fn(&mut Session, &[&str]) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().insert(verb.into(), Arc::new(handler));
    }

    /// Parse and run one command line
    ///
    /// Blank lines are ignored. A line that cannot be parsed raises an
    /// error notification echoing it and changes nothing.
    pub fn execute(&self, line: &str) -> Result<Outcome> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(&verb) = words.first() else {
            return Ok(Outcome::Continue);
        };

        let handler = self.handlers.read().get(verb).cloned();
        debug!("Dispatching {:?}", line.trim());

        self.controller.transaction(|session| {
            let result = match dispatch(session, &words) {
                Dispatch::Done(result) => result.map(|()| Outcome::Continue),
                Dispatch::Quit => Ok(Outcome::Quit),
                Dispatch::Unknown => match &handler {
                    Some(handler) => handler(session, &words[1..]).map(|()| Outcome::Continue),
                    None => Err(PlaybackError::UnknownCommand(line.trim().to_string())),
                },
                Dispatch::Malformed => {
                    Err(PlaybackError::MalformedCommand(line.trim().to_string()))
                }
            };

            if let Err(
                PlaybackError::UnknownCommand(_)
                | PlaybackError::MalformedCommand(_)
                | PlaybackError::InvalidPosition(_),
            ) = &result
            {
                session.report_error(format!("Failed to parse: \"{}\"", line.trim()));
            }
            result
        })
    }
}

enum Dispatch {
    Done(Result<()>),
    Quit,
    Unknown,
    Malformed,
}

fn dispatch(session: &mut Session, words: &[&str]) -> Dispatch {
    let arg = words.get(1).copied();
    let argc = words.len() - 1;

    match (words[0], argc) {
        ("play", _) => match target(words) {
            Ok((None, Some(token))) if token.relative => {
                Dispatch::Done(session.play_relative(token.nanos))
            }
            Ok((file, token)) => Dispatch::Done(session.play(file, token.map(|t| t.nanos))),
            Err(_) => Dispatch::Malformed,
        },
        ("seek", _) => match target(words) {
            Ok((None, Some(token))) if token.relative => {
                Dispatch::Done(session.seek_relative(token.nanos))
            }
            Ok((file, token)) => Dispatch::Done(session.seek(file, token.map(|t| t.nanos))),
            Err(_) => Dispatch::Malformed,
        },
        ("pause", _) => Dispatch::Done(session.pause()),
        ("dseek", 1) => match arg.map(parse_position) {
            Some(Ok(token)) => Dispatch::Done(session.seek_relative(token.nanos)),
            _ => Dispatch::Malformed,
        },
        ("stepfile", 1) => match arg.map(str::parse::<i64>) {
            Some(Ok(delta)) => Dispatch::Done(session.step_file(delta)),
            _ => Dispatch::Malformed,
        },
        ("play_pause", 0) => Dispatch::Done(session.play_pause()),
        ("volume", 1) => match arg.map(str::parse::<f64>) {
            Some(Ok(volume)) => Dispatch::Done(session.set_volume(volume)),
            _ => Dispatch::Malformed,
        },
        ("dvolume", 1) => match arg.map(str::parse::<f64>) {
            Some(Ok(delta)) => Dispatch::Done(session.adjust_volume(delta)),
            _ => Dispatch::Malformed,
        },
        ("mark", 1) => match arg {
            Some(name) => Dispatch::Done(session.mark(name).map(|_| ())),
            None => Dispatch::Malformed,
        },
        ("quit", 0) => Dispatch::Quit,
        ("play_pause" | "dseek" | "stepfile" | "volume" | "dvolume" | "mark" | "quit", _) => {
            Dispatch::Malformed
        }
        _ => Dispatch::Unknown,
    }
}

/// Split `verb [file words...] [position]` into its optional parts
///
/// With three or more words everything between the verb and the last word
/// is the filename, joined by single spaces.
fn target(words: &[&str]) -> Result<(Option<String>, Option<PositionToken>)> {
    let file = (words.len() >= 3).then(|| words[1..words.len() - 1].join(" "));
    let position = match words.last() {
        Some(last) if words.len() >= 2 => Some(parse_position(last)?),
        _ => None,
    };
    Ok((file, position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SECOND;

    #[test]
    fn target_without_arguments() {
        assert_eq!(target(&["play"]).unwrap(), (None, None));
    }

    #[test]
    fn target_with_position_only() {
        let (file, position) = target(&["seek", "-30"]).unwrap();
        assert_eq!(file, None);
        assert_eq!(
            position,
            Some(PositionToken {
                relative: true,
                nanos: -30 * SECOND
            })
        );
    }

    #[test]
    fn target_joins_filename_words() {
        let (file, position) = target(&["play", "Chapter", "01.mp3", "1:00"]).unwrap();
        assert_eq!(file.as_deref(), Some("Chapter 01.mp3"));
        assert_eq!(position.unwrap().nanos, 60 * SECOND);
    }

    #[test]
    fn target_requires_trailing_position() {
        assert!(target(&["play", "Chapter 01.mp3"]).is_err());
        assert!(target(&["play", "01.mp3", "start"]).is_err());
    }
}
