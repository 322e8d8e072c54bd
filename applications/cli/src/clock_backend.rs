//! Headless backend that keeps time without producing sound
//!
//! Durations come from the file headers (via lofty); the position is a
//! monotonic clock that runs while "playing". A watcher thread fires the
//! end-of-stream token when the clock passes the duration.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use lofty::AudioFile;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use storytime_playback::{
    duration_to_nanos, BackendPlayer, EndOfStream, Nanos, PlaybackError, Result,
};
use tracing::{debug, trace};

/// Reads the duration of an audio file
pub type Probe = dyn Fn(&Path) -> Result<Nanos> + Send + Sync;

/// Duration from the file's audio properties
pub fn probe_duration(path: &Path) -> Result<Nanos> {
    let tagged_file = lofty::read_from_path(path)
        .map_err(|e| PlaybackError::Backend(format!("{}: {}", path.display(), e)))?;
    Ok(duration_to_nanos(tagged_file.properties().duration()))
}

#[derive(Default)]
struct Clock {
    loaded: Option<PathBuf>,
    duration: Nanos,

    /// Position when the clock was last stopped or moved
    offset: Nanos,

    /// Set while running
    started: Option<Instant>,

    volume: f64,
    end_of_stream: Option<EndOfStream>,
    shut_down: bool,
}

impl Clock {
    fn position(&self) -> Nanos {
        let running = self
            .started
            .map_or(0, |started| duration_to_nanos(started.elapsed()));
        self.offset.saturating_add(running).min(self.duration)
    }

    fn stop(&mut self) {
        self.offset = self.position();
        self.started = None;
    }
}

/// Clock-driven [`BackendPlayer`]
pub struct ClockBackend {
    clock: Arc<Mutex<Clock>>,
    probe: Box<Probe>,
    wake: Sender<()>,
    watcher: Option<JoinHandle<()>>,
}

impl ClockBackend {
    /// Backend probing durations with lofty
    pub fn new() -> std::io::Result<Self> {
        Self::with_probe(probe_duration)
    }

    /// Backend with a custom duration probe
    pub fn with_probe<F>(probe: F) -> std::io::Result<Self>
    where
        F: Fn(&Path) -> Result<Nanos> + Send + Sync + 'static,
    {
        let clock = Arc::new(Mutex::new(Clock {
            volume: 1.0,
            ..Clock::default()
        }));
        let (wake, woken) = unbounded();

        let watched = Arc::clone(&clock);
        let watcher = thread::Builder::new()
            .name("storytime-clock".to_string())
            .spawn(move || watch(&watched, &woken))?;

        Ok(Self {
            clock,
            probe: Box::new(probe),
            wake,
            watcher: Some(watcher),
        })
    }

    fn poke(&self) {
        let _ = self.wake.send(());
    }
}

/// Sleep until the running clock reaches the end, then fire the token
///
/// The clock lock is released before firing: the controller calls back
/// into the backend while handling the end of stream.
fn watch(clock: &Mutex<Clock>, woken: &Receiver<()>) {
    loop {
        let remaining = {
            let mut clock = clock.lock();
            if clock.shut_down {
                break;
            }

            if clock.started.is_none() {
                None
            } else {
                let remaining = clock.duration - clock.position();
                if remaining <= 0 {
                    clock.stop();
                    let token = clock.end_of_stream.take();
                    drop(clock);
                    if let Some(token) = token {
                        debug!("End of stream (generation {})", token.generation());
                        token.fire();
                    }
                    continue;
                }
                Some(Duration::from_nanos(remaining.unsigned_abs()))
            }
        };

        let woke = match remaining {
            Some(wait) => match woken.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => false,
            },
            None => woken.recv().is_ok(),
        };
        if !woke {
            break;
        }
    }
    trace!("Clock watcher stopped");
}

impl BackendPlayer for ClockBackend {
    fn load(&mut self, path: &Path) -> Result<Nanos> {
        let probed = (self.probe)(path);

        let mut clock = self.clock.lock();
        clock.started = None;
        clock.offset = 0;
        clock.end_of_stream = None;
        match probed {
            Ok(duration) => {
                clock.loaded = Some(path.to_path_buf());
                clock.duration = duration;
            }
            Err(_) => {
                clock.loaded = None;
                clock.duration = 0;
            }
        }
        drop(clock);

        self.poke();
        probed
    }

    fn play(&mut self, end_of_stream: EndOfStream) {
        let mut clock = self.clock.lock();
        if clock.loaded.is_none() {
            return;
        }
        if clock.started.is_none() {
            clock.started = Some(Instant::now());
        }
        clock.end_of_stream = Some(end_of_stream);
        drop(clock);
        self.poke();
    }

    fn pause(&mut self) {
        let mut clock = self.clock.lock();
        clock.stop();
        clock.end_of_stream = None;
        drop(clock);
        self.poke();
    }

    fn seek(&mut self, position: Nanos) {
        let mut clock = self.clock.lock();
        clock.offset = position.clamp(0, clock.duration);
        if clock.started.is_some() {
            clock.started = Some(Instant::now());
        }
        drop(clock);
        self.poke();
    }

    fn position(&self) -> Option<Nanos> {
        let clock = self.clock.lock();
        clock.loaded.as_ref().map(|_| clock.position())
    }

    fn duration(&self) -> Option<Nanos> {
        let clock = self.clock.lock();
        clock.loaded.as_ref().map(|_| clock.duration)
    }

    fn volume(&self) -> f64 {
        self.clock.lock().volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.clock.lock().volume = volume;
    }

    fn shutdown(&mut self) {
        let mut clock = self.clock.lock();
        clock.shut_down = true;
        clock.started = None;
        clock.end_of_stream = None;
        drop(clock);
        self.poke();
    }
}

impl Drop for ClockBackend {
    fn drop(&mut self) {
        self.clock.lock().shut_down = true;
        self.poke();
        // The watcher may be waiting on the controller lock; never join it here
        drop(self.watcher.take());
    }
}
