//! Durable playlog and crash-recovery autosave
//!
//! The playlog is append-only: every entry is flushed and synced to storage
//! as soon as it is added. Entries that fail to reach the disk stay pending
//! and are retried on the next append or autosave tick.
//!
//! While playing, the autosave file holds a single `auto` entry with the
//! latest position. It is overwritten on every tick and removed when
//! playback stops, so it only survives a crash.
//!
//! `PositionLog` has no lock of its own. It lives inside the controller
//! state and is only reached through the controller's lock.

use crate::entry::LogEntry;
use crate::error::{PlaybackError, Result};
use crate::timer::RepeatingTimer;
use crate::types::PositionReport;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of merging a leftover autosave into the playlog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// No autosave file was found
    NoAutosave,

    /// The autosaved entry was appended to the playlog
    Recovered(LogEntry),

    /// The autosave was older than the playlog, or not a single entry
    Discarded,
}

/// Result of appending an entry
///
/// The entry is part of the in-memory playlog either way; `flush` tells
/// whether it (and anything pending before it) reached the disk.
#[derive(Debug)]
#[must_use]
pub struct Appended {
    pub entry: LogEntry,
    pub flush: io::Result<()>,
}

/// Durable playlog plus autosave file
#[derive(Debug)]
pub struct PositionLog {
    playlog_path: PathBuf,
    autosave_path: PathBuf,

    /// Everything loaded or appended, oldest first
    playlog: Vec<LogEntry>,

    /// Appended entries not yet on disk
    pending: Vec<LogEntry>,

    /// Whether autosave writes are currently wanted
    autosave_active: bool,

    timer: Option<RepeatingTimer>,
}

impl PositionLog {
    /// Create an empty log for the given files. Nothing is read yet.
    pub fn new(playlog_path: impl Into<PathBuf>, autosave_path: impl Into<PathBuf>) -> Self {
        Self {
            playlog_path: playlog_path.into(),
            autosave_path: autosave_path.into(),
            playlog: Vec::new(),
            pending: Vec::new(),
            autosave_active: false,
            timer: None,
        }
    }

    /// Attach the timer that drives autosave ticks
    pub fn set_timer(&mut self, timer: RepeatingTimer) {
        self.timer = Some(timer);
    }

    /// Detach the timer so it can be shut down outside any lock
    pub fn take_timer(&mut self) -> Option<RepeatingTimer> {
        self.timer.take()
    }

    /// Read the playlog from disk, replacing the in-memory copy
    ///
    /// Malformed lines are skipped. A missing or unreadable file is an
    /// empty playlog.
    pub fn load(&mut self) -> &[LogEntry] {
        self.playlog = read_entries(&self.playlog_path);
        debug!(
            "Loaded {} playlog entries from {}",
            self.playlog.len(),
            self.playlog_path.display()
        );
        &self.playlog
    }

    /// Merge a leftover autosave into the playlog and delete it
    ///
    /// The autosaved entry is only trusted when it is the single entry in
    /// the file and is not older than the last playlog entry. The file is
    /// removed whatever the outcome.
    pub fn recover_autosave(&mut self) -> Result<Recovery> {
        if !self.autosave_path.exists() {
            return Ok(Recovery::NoAutosave);
        }

        let mut auto = read_entries(&self.autosave_path);
        let logtime = self.playlog.last().map_or(0, |entry| entry.walltime);

        let outcome = match auto.pop() {
            Some(entry) if auto.is_empty() && entry.walltime >= logtime => {
                info!(
                    "Recovering autosaved position {} in {:?}",
                    entry.position, entry.filename
                );
                let appended = self.append(entry);
                remove_quietly(&self.autosave_path);
                appended.flush?;
                Recovery::Recovered(appended.entry)
            }
            _ => {
                debug!("Discarding stale autosave {}", self.autosave_path.display());
                remove_quietly(&self.autosave_path);
                Recovery::Discarded
            }
        };

        Ok(outcome)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[LogEntry] {
        &self.playlog
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&LogEntry> {
        self.playlog.last()
    }

    /// Number of entries waiting to be written
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Path of the playlog file
    pub fn playlog_path(&self) -> &Path {
        &self.playlog_path
    }

    /// Path of the autosave file
    pub fn autosave_path(&self) -> &Path {
        &self.autosave_path
    }

    /// Append an entry and try to flush everything pending
    pub fn append(&mut self, entry: LogEntry) -> Appended {
        self.playlog.push(entry.clone());
        self.pending.push(entry.clone());
        Appended {
            entry,
            flush: self.flush_pending(),
        }
    }

    /// Build an entry for `event` at the given position, stamped now, and append it
    pub fn log_now(&mut self, event: &str, at: &PositionReport) -> Result<Appended> {
        if !LogEntry::is_valid_event(event) {
            return Err(PlaybackError::InvalidEvent(event.to_string()));
        }
        let entry = entry_now(event, at)?;
        Ok(self.append(entry))
    }

    /// Write all pending entries in one append
    pub fn flush_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let data: String = self
            .pending
            .iter()
            .map(|entry| format!("{}\n", entry))
            .collect();

        match write_file(&self.playlog_path, WriteMode::Append, &data) {
            Ok(()) => {
                self.pending.clear();
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to write to playlog {}, {} entries kept for the next write: {}",
                    self.playlog_path.display(),
                    self.pending.len(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Whether autosave writes are currently wanted
    pub fn autosave_active(&self) -> bool {
        self.autosave_active
    }

    /// Start the autosave timer and write the first autosave immediately
    pub fn start_autosave(&mut self, at: &PositionReport) -> io::Result<()> {
        self.autosave_active = true;
        if let Some(timer) = &self.timer {
            timer.start();
        }
        self.autosave_tick(at)
    }

    /// One autosave tick
    ///
    /// Retries pending playlog entries, then overwrites the autosave file
    /// unless autosave has been stopped in the meantime. The first error
    /// is returned after both steps were attempted.
    pub fn autosave_tick(&mut self, at: &PositionReport) -> io::Result<()> {
        let flushed = self.flush_pending();

        if !self.autosave_active {
            return flushed;
        }

        let written = match entry_now(crate::entry::EVENT_AUTO, at) {
            Ok(entry) => write_file(
                &self.autosave_path,
                WriteMode::Truncate,
                &format!("{}\n", entry),
            )
            .map_err(|e| {
                warn!(
                    "Failed to write autosave {}: {}",
                    self.autosave_path.display(),
                    e
                );
                e
            }),
            // Nothing loaded, nothing to save
            Err(_) => Ok(()),
        };

        flushed.and(written)
    }

    /// Stop the autosave timer and delete the autosave file
    ///
    /// Deletion is best effort; a stale autosave is discarded on the next
    /// startup by the walltime check.
    pub fn stop_autosave(&mut self) {
        self.autosave_active = false;
        if let Some(timer) = &self.timer {
            timer.stop();
        }
        remove_quietly(&self.autosave_path);
    }
}

fn entry_now(event: &str, at: &PositionReport) -> Result<LogEntry> {
    let filename = at.filename.clone().ok_or(PlaybackError::NoCurrentFile)?;
    let walltime = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
    Ok(LogEntry::new(
        walltime,
        event,
        filename,
        at.position,
        at.duration,
    ))
}

fn read_entries(path: &Path) -> Vec<LogEntry> {
    let Ok(bytes) = fs::read(path) else {
        return Vec::new();
    };

    let text = String::from_utf8_lossy(&bytes);
    let mut skipped = 0usize;
    let entries: Vec<LogEntry> = text
        .lines()
        .filter_map(|line| match LogEntry::parse(line) {
            Ok(entry) => Some(entry),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        debug!("Skipped {} malformed lines in {}", skipped, path.display());
    }
    entries
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Append,
    Truncate,
}

/// Write, flush and sync to storage, creating the parent directory if needed
fn write_file(path: &Path, mode: WriteMode, data: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            create_private_dir(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        WriteMode::Append => options.append(true),
        WriteMode::Truncate => options.write(true).truncate(true),
    };

    let mut file = options.open(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    file.sync_all()
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}
