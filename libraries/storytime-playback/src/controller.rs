//! Playback controller - the audiobook state machine
//!
//! Owns "which file, where, playing or not" and keeps it consistent across
//! file boundaries. All state sits behind one lock: every public operation,
//! autosave tick and end-of-stream signal takes it for its whole duration,
//! so playlog entries appear in exactly the order operations were accepted.
//!
//! State machine:
//! - `Stopped --play/seek--> Playing`
//! - `Playing --pause--> Stopped` (then optional backtrack)
//! - `Playing --end of stream--> Playing` on the next file, or `EndOfBook`
//! - `EndOfBook --play/seek--> Playing`

use crate::backend::{BackendPlayer, EndOfStream};
use crate::entry::{
    LogEntry, EVENT_END_OF_BOOK, EVENT_LOAD_FAIL, EVENT_SEEK_FROM, EVENT_SEEK_TO, EVENT_START,
    EVENT_STOP,
};
use crate::error::{PlaybackError, Result};
use crate::events::{EventBus, PlaybackEvent};
use crate::library::Library;
use crate::position_log::{PositionLog, Recovery};
use crate::timer::RepeatingTimer;
use crate::types::{Nanos, PlaybackConfig, PlaybackState, PositionReport};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// Highest volume accepted by [`Session::set_volume`]
pub const MAX_VOLUME: f64 = 10.0;

/// What a positioning request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    /// Start or continue playing
    Play,
    /// Move the position; playback resumes only if it was already running
    Seek,
}

/// State shared between controller handles, the autosave timer and
/// end-of-stream tokens
pub(crate) struct Shared {
    state: Mutex<Session>,
}

impl Shared {
    pub(crate) fn end_of_stream(&self, generation: u64) {
        self.state.lock().handle_end_of_stream(generation);
    }

    fn autosave_tick(&self) {
        self.state.lock().autosave_tick();
    }
}

/// Handle to the playback controller
///
/// Cheap to clone; all clones drive the same state.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Create the controller, load the playlog and recover any autosave
    ///
    /// Nothing is loaded into the backend until [`Controller::start`], so
    /// subscribers registered in between see the startup events.
    pub fn new(config: PlaybackConfig, backend: Box<dyn BackendPlayer>) -> Result<Self> {
        let library = Library::new(&config.directory, &config.extensions);
        let log = PositionLog::new(config.playlog_path(), config.autosave_path());
        let interval = config.autosave_interval;

        let shared = Arc::new(Shared {
            state: Mutex::new(Session {
                config,
                library,
                backend,
                log,
                events: EventBus::default(),
                current_file: None,
                loaded: false,
                playing: false,
                end_of_book: false,
                previewing: false,
                last_known_duration: 0,
                has_played: false,
                generation: 0,
                shut_down: false,
                this: Weak::new(),
            }),
        });

        let weak = Arc::downgrade(&shared);
        let tick_target = weak.clone();
        let timer = RepeatingTimer::spawn("storytime-autosave", interval, move || {
            if let Some(shared) = tick_target.upgrade() {
                shared.autosave_tick();
            }
        })?;

        {
            let mut session = shared.state.lock();
            session.this = weak;
            session.log.set_timer(timer);
            session.open_log();
        }

        Ok(Self { shared })
    }

    /// Resume from the playlog, or the first file, and autoplay if configured
    pub fn start(&self) -> Result<()> {
        self.transaction(|session| session.resume())
    }

    /// Subscribe to playback events
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.shared.state.lock().events.subscribe()
    }

    /// Run several operations under one lock acquisition
    ///
    /// Nothing else touches the playback state until `f` returns. Do not
    /// fire an [`EndOfStream`] token from inside `f`.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.shared.state.lock();
        f(&mut session)
    }

    /// See [`Session::play`]
    pub fn play(&self, file: Option<String>, position: Option<Nanos>) -> Result<()> {
        self.transaction(|session| session.play(file, position))
    }

    /// See [`Session::seek`]
    pub fn seek(&self, file: Option<String>, position: Option<Nanos>) -> Result<()> {
        self.transaction(|session| session.seek(file, position))
    }

    /// See [`Session::seek_relative`]
    pub fn seek_relative(&self, delta: Nanos) -> Result<()> {
        self.transaction(|session| session.seek_relative(delta))
    }

    /// See [`Session::pause`]
    pub fn pause(&self) -> Result<()> {
        self.transaction(Session::pause)
    }

    /// See [`Session::play_pause`]
    pub fn play_pause(&self) -> Result<()> {
        self.transaction(Session::play_pause)
    }

    /// See [`Session::position`]
    pub fn position(&self) -> PositionReport {
        self.transaction(|session| session.position())
    }

    /// See [`Session::mark`]
    pub fn mark(&self, name: &str) -> Result<LogEntry> {
        self.transaction(|session| session.mark(name))
    }

    /// See [`Session::adjacent_file`]
    pub fn adjacent_file(&self, delta: i64) -> Option<String> {
        self.transaction(|session| session.adjacent_file(delta))
    }

    /// See [`Session::state`]
    pub fn state(&self) -> PlaybackState {
        self.transaction(|session| session.state())
    }

    /// Copy of the in-memory playlog
    pub fn playlog(&self) -> Vec<LogEntry> {
        self.transaction(|session| session.playlog().to_vec())
    }

    /// Pause, stop autosaving, flush the playlog and release the backend
    ///
    /// Further operations fail with [`PlaybackError::ShutDown`].
    pub fn shutdown(&self) {
        let timer = self.transaction(Session::shutdown);
        if let Some(timer) = timer {
            timer.shutdown();
        }
    }
}

/// The locked playback state and every operation on it
///
/// Reached through [`Controller::transaction`] or the `Controller` shortcuts.
pub struct Session {
    config: PlaybackConfig,
    library: Library,
    backend: Box<dyn BackendPlayer>,
    log: PositionLog,
    events: EventBus,

    /// None until something has been loaded
    current_file: Option<String>,

    /// Backend holds `current_file`; false after a failed load
    loaded: bool,
    playing: bool,
    end_of_book: bool,

    /// Position was last set by a seek while paused
    previewing: bool,

    /// Duration reported by the last successful load
    last_known_duration: Nanos,

    /// Current file has been played since it was loaded
    has_played: bool,

    /// Moves on whenever a pending end of stream becomes meaningless
    generation: u64,

    shut_down: bool,
    this: Weak<Shared>,
}

impl Session {
    // ===== Queries =====

    /// Stopped, playing or at the end of the book
    pub fn state(&self) -> PlaybackState {
        if self.end_of_book {
            PlaybackState::EndOfBook
        } else if self.playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_end_of_book(&self) -> bool {
        self.end_of_book
    }

    /// True after a seek while paused, until playback starts
    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// In-memory playlog, oldest first
    pub fn playlog(&self) -> &[LogEntry] {
        self.log.entries()
    }

    /// Subscribe to playback events
    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Current file, position and duration
    ///
    /// Falls back to 0 (never played) or the load-time duration (played,
    /// backend not answering) when the backend cannot report a position.
    pub fn position(&self) -> PositionReport {
        let fallback = if self.has_played {
            self.last_known_duration
        } else {
            0
        };

        PositionReport {
            filename: self.current_file.clone(),
            position: self.backend.position().unwrap_or(fallback),
            duration: self.current_duration(),
        }
    }

    /// File `delta` steps from the current one in directory order
    pub fn adjacent_file(&self, delta: i64) -> Option<String> {
        let current = self.current_file.as_deref()?;
        self.library.adjacent(current, delta)
    }

    /// Audio files of the book, sorted
    pub fn list_files(&self) -> Vec<String> {
        self.library.list_files()
    }

    // ===== Operations =====

    /// Play from the current location, or from `file`/`position` if given
    ///
    /// A no-op when already playing and no target is given.
    pub fn play(&mut self, file: Option<String>, position: Option<Nanos>) -> Result<()> {
        if self.playing && file.is_none() && position.is_none() {
            return Ok(());
        }
        self.resolve(file, position, false, Intent::Play, true)
    }

    /// Move to `file`/`position`
    ///
    /// Playback continues if it was running; otherwise the new position is
    /// only previewed. A no-op when neither file nor position is given.
    pub fn seek(&mut self, file: Option<String>, position: Option<Nanos>) -> Result<()> {
        if file.is_none() && position.is_none() {
            return Ok(());
        }
        self.resolve(file, position, false, Intent::Seek, true)
    }

    /// Seek `delta` nanoseconds from the current position
    pub fn seek_relative(&mut self, delta: Nanos) -> Result<()> {
        let (file, position) = self.current_location();
        self.resolve(
            file,
            Some(position.saturating_add(delta)),
            false,
            Intent::Seek,
            true,
        )
    }

    /// Play from `delta` nanoseconds away from the current position
    pub fn play_relative(&mut self, delta: Nanos) -> Result<()> {
        let (file, position) = self.current_location();
        self.resolve(
            file,
            Some(position.saturating_add(delta)),
            false,
            Intent::Play,
            true,
        )
    }

    /// Move `delta` files and seek to the start of that file
    ///
    /// A no-op when there is no such file.
    pub fn step_file(&mut self, delta: i64) -> Result<()> {
        match self.adjacent_file(delta) {
            Some(file) => self.seek(Some(file), Some(0)),
            None => Ok(()),
        }
    }

    /// Pause, then rewind by the configured backtrack
    ///
    /// A no-op when already paused. The rewind is a paused seek, so it is
    /// logged as a single `seekto` and does not pause (or rewind) again.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_running()?;
        if !self.playing {
            return Ok(());
        }

        self.halt(true, Intent::Play);

        let backtrack = self.config.backtrack_nanos();
        if backtrack > 0 {
            self.seek_relative(-backtrack)?;
        }
        Ok(())
    }

    /// Pause if playing, play otherwise
    pub fn play_pause(&mut self) -> Result<()> {
        if self.playing {
            self.pause()
        } else {
            self.play(None, None)
        }
    }

    /// Log a named event at the current position without changing playback
    pub fn mark(&mut self, name: &str) -> Result<LogEntry> {
        self.ensure_running()?;
        self.append_event(name)
    }

    /// Backend volume
    pub fn volume(&self) -> f64 {
        self.backend.volume()
    }

    /// Set backend volume, clamped to `[0, MAX_VOLUME]`
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.ensure_running()?;
        if !volume.is_finite() {
            return Err(PlaybackError::InvalidVolume(volume.to_string()));
        }

        let volume = volume.clamp(0.0, MAX_VOLUME);
        self.backend.set_volume(volume);
        self.events.emit(PlaybackEvent::VolumeChanged { volume });
        Ok(())
    }

    /// Change backend volume by `delta`, clamped to `[0, MAX_VOLUME]`
    pub fn adjust_volume(&mut self, delta: f64) -> Result<()> {
        let volume = self.backend.volume() + delta;
        self.set_volume(volume)
    }

    /// Raise an error notification without touching playback
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.events.error(message);
    }

    // ===== Lifecycle =====

    fn open_log(&mut self) {
        self.log.load();
        match self.log.recover_autosave() {
            Ok(Recovery::Recovered(entry)) => {
                self.events.emit(PlaybackEvent::LogAppended { entry });
            }
            Ok(_) => {}
            Err(e) => self.events.error(format!(
                "Failed to write to play log, data will be included in next write: {} ({})",
                self.log.playlog_path().display(),
                e
            )),
        }
    }

    fn resume(&mut self) -> Result<()> {
        self.ensure_running()?;

        if let Some(last) = self.log.last().cloned() {
            info!("Resuming {} at {}", last.filename, last.position);
            self.resolve(
                Some(last.filename),
                Some(last.position),
                false,
                Intent::Seek,
                false,
            )?;
        } else if let Some(first) = self.library.list_files().into_iter().next() {
            info!("Starting {} from the beginning", first);
            self.resolve(Some(first), None, false, Intent::Seek, false)?;
        } else {
            self.events.error("No valid files in audiobook directory.");
            return Err(PlaybackError::NoPlayableFiles);
        }

        if self.config.autoplay {
            self.play(None, None)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Option<RepeatingTimer> {
        if self.shut_down {
            return None;
        }

        if let Err(e) = self.pause() {
            debug!("Pause during shutdown failed: {}", e);
        }
        self.log.stop_autosave();
        if let Err(e) = self.log.flush_pending() {
            self.events.error(format!(
                "Failed to write to play log on shutdown: {} ({})",
                self.log.playlog_path().display(),
                e
            ));
        }
        self.backend.shutdown();
        self.shut_down = true;
        info!("Playback controller shut down");
        self.log.take_timer()
    }

    // ===== Internals =====

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            Err(PlaybackError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn current_location(&self) -> (Option<String>, Nanos) {
        let report = self.position();
        (report.filename, report.position)
    }

    fn current_duration(&self) -> Nanos {
        self.backend.duration().unwrap_or(self.last_known_duration)
    }

    /// Move to a location and, unless this is a paused seek, play from it
    ///
    /// `from_end` adds the duration of the target file to `position`
    /// first. Positions before the start of a file land in earlier files,
    /// positions past its end in later ones; the first and last files clamp.
    fn resolve(
        &mut self,
        file: Option<String>,
        position: Option<Nanos>,
        from_end: bool,
        intent: Intent,
        log: bool,
    ) -> Result<()> {
        self.ensure_running()?;

        let file = match (file, &self.current_file) {
            (Some(file), _) => Some(file),
            // Retry a file whose last load failed
            (None, Some(current)) if !self.loaded => Some(current.clone()),
            (None, Some(_)) => None,
            (None, None) => match self.library.list_files().into_iter().next() {
                Some(first) => Some(first),
                None => {
                    debug!("Nothing to play, ignoring positioning request");
                    return Ok(());
                }
            },
        };

        self.set_end_of_book(false);

        let paused_seek = intent == Intent::Seek && !self.playing;

        self.halt(log, intent);

        if let Some(file) = file {
            if !self.loaded || self.current_file.as_deref() != Some(file.as_str()) {
                self.load_file(&file)?;
            }
        }

        if let Some(position) = position {
            self.place(position, from_end)?;
        }

        if log {
            self.log_event(if intent == Intent::Seek {
                EVENT_SEEK_TO
            } else {
                EVENT_START
            });
            if !paused_seek {
                self.start_autosave();
            }
        }

        if paused_seek {
            self.previewing = true;
        } else {
            self.begin_playback();
        }

        self.events.emit(PlaybackEvent::PositionChanged);
        Ok(())
    }

    /// Cross file boundaries until `position` falls inside a file, then seek there
    fn place(&mut self, mut position: Nanos, mut from_end: bool) -> Result<()> {
        let boundaries = self.library.list_files().len() + 1;

        for _ in 0..=boundaries {
            let duration = self.current_duration();
            if from_end {
                position = position.saturating_add(duration);
                from_end = false;
            }

            if position < 0 {
                match self.adjacent_file(-1) {
                    Some(previous) => {
                        self.load_file(&previous)?;
                        from_end = true;
                    }
                    None => {
                        self.backend_seek(0);
                        return Ok(());
                    }
                }
            } else if position < duration {
                self.backend_seek(position);
                return Ok(());
            } else {
                match self.adjacent_file(1) {
                    Some(next) => {
                        position -= duration;
                        self.load_file(&next)?;
                    }
                    None => {
                        self.backend_seek(duration);
                        return Ok(());
                    }
                }
            }
        }

        error!("Seek did not settle within {} file boundaries", boundaries);
        Err(PlaybackError::Backend(
            "seek crossed more file boundaries than the book has".to_string(),
        ))
    }

    /// Stop playing; logs and stops autosave when `log` is set
    fn halt(&mut self, log: bool, intent: Intent) {
        if !self.playing {
            return;
        }

        self.set_playing(false);
        self.clear_end_of_stream();
        self.backend.pause();

        if log {
            self.log_event(if intent == Intent::Seek {
                EVENT_SEEK_FROM
            } else {
                EVENT_STOP
            });
            self.stop_autosave();
        }
        self.events.emit(PlaybackEvent::PositionChanged);
    }

    fn load_file(&mut self, file: &str) -> Result<()> {
        self.current_file = Some(file.to_string());
        self.events.emit(PlaybackEvent::FileChanged {
            filename: file.to_string(),
        });
        self.clear_end_of_stream();
        self.has_played = false;

        match self.backend.load(&self.library.path_of(file)) {
            Ok(duration) => {
                debug!("Loaded {} ({} ns)", file, duration);
                self.loaded = true;
                self.last_known_duration = duration;
                Ok(())
            }
            Err(e) => {
                self.loaded = false;
                self.last_known_duration = 0;
                self.log_event(EVENT_LOAD_FAIL);
                self.stop_autosave();
                self.set_playing(false);
                self.events.error(format!("Failed to load {}: {}", file, e));
                Err(PlaybackError::LoadFailed {
                    file: file.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn backend_seek(&mut self, position: Nanos) {
        self.clear_end_of_stream();
        self.backend.seek(position);
    }

    fn begin_playback(&mut self) {
        self.previewing = false;
        self.has_played = true;
        self.set_playing(true);
        let token = EndOfStream::new(self.generation, self.this.clone());
        self.backend.play(token);
    }

    /// Make any end-of-stream token issued so far stale
    fn clear_end_of_stream(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn handle_end_of_stream(&mut self, generation: u64) {
        if self.shut_down || generation != self.generation || !self.playing {
            debug!(
                "Ignoring stale end of stream (generation {}, current {})",
                generation, self.generation
            );
            return;
        }

        if let Some(next) = self.adjacent_file(1) {
            info!("Advancing to {}", next);
            if let Err(e) = self.resolve(Some(next), None, false, Intent::Play, false) {
                debug!("Advancing past end of stream failed: {}", e);
            }
            return;
        }

        info!("Reached the end of the book");
        self.set_end_of_book(true);
        self.set_playing(false);
        self.events.emit(PlaybackEvent::PositionChanged);
        self.log_event(EVENT_END_OF_BOOK);
        self.stop_autosave();
    }

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.events.emit(PlaybackEvent::PlayingChanged { playing });
        }
    }

    fn set_end_of_book(&mut self, end_of_book: bool) {
        if self.end_of_book != end_of_book {
            self.end_of_book = end_of_book;
            self.events.emit(PlaybackEvent::EndOfBookChanged { end_of_book });
        }
    }

    /// Append `event` at the current position, reporting write failures
    fn append_event(&mut self, event: &str) -> Result<LogEntry> {
        let at = self.position();
        let appended = self.log.log_now(event, &at)?;
        self.events.emit(PlaybackEvent::LogAppended {
            entry: appended.entry.clone(),
        });
        if let Err(e) = appended.flush {
            self.events.error(format!(
                "Failed to write to play log, data will be included in next write: {} ({})",
                self.log.playlog_path().display(),
                e
            ));
        }
        Ok(appended.entry)
    }

    fn log_event(&mut self, event: &str) {
        if let Err(e) = self.append_event(event) {
            debug!("Not logging {}: {}", event, e);
        }
    }

    fn start_autosave(&mut self) {
        let at = self.position();
        if let Err(e) = self.log.start_autosave(&at) {
            self.events.error(format!(
                "Failed to write to auto log: {} ({})",
                self.log.autosave_path().display(),
                e
            ));
        }
    }

    fn stop_autosave(&mut self) {
        self.log.stop_autosave();
    }

    fn autosave_tick(&mut self) {
        if self.shut_down {
            return;
        }
        let at = self.position();
        if let Err(e) = self.log.autosave_tick(&at) {
            self.events.error(format!(
                "Failed to write to auto log: {} ({})",
                self.log.autosave_path().display(),
                e
            ));
        }
    }
}
