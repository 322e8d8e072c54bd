//! Command sources: stdin and named pipes
//!
//! Every source runs on its own thread and feeds lines to the shared
//! [`CommandRouter`]. A `quit` command is passed on to the main thread; the
//! readers themselves stop at the next line once the stop flag is set.

use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use storytime_playback::{CommandRouter, Outcome};
use tracing::{debug, info, warn};

/// Why a reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// A `quit` command was read
    Quit,

    /// The source ran dry or failed
    Exhausted,

    /// The stop flag was set
    Stopped,
}

/// Read commands from `reader` until quit, end of input or stop
pub fn pump<R: BufRead>(reader: R, router: &CommandRouter, stop: &AtomicBool) -> Finished {
    for line in reader.lines() {
        if stop.load(Ordering::SeqCst) {
            return Finished::Stopped;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read command: {}", e);
                return Finished::Exhausted;
            }
        };

        match router.execute(&line) {
            Ok(Outcome::Quit) => return Finished::Quit,
            Ok(Outcome::Continue) => {}
            Err(e) => debug!("Command {:?} failed: {}", line.trim(), e),
        }
    }
    Finished::Exhausted
}

/// Read commands from stdin on a new thread
pub fn spawn_stdin(
    router: Arc<CommandRouter>,
    quit: Sender<()>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("storytime-stdin".to_string())
        .spawn(move || {
            let finished = pump(io::stdin().lock(), &router, &stop);
            debug!("Stdin reader finished: {:?}", finished);
            if finished == Finished::Quit {
                let _ = quit.send(());
            }
        })
}

/// Read commands from a named pipe on a new thread
///
/// The pipe is reopened whenever its last writer closes it.
pub fn spawn_fifo(
    path: PathBuf,
    router: Arc<CommandRouter>,
    quit: Sender<()>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    ensure_fifo(&path)?;
    info!("Reading commands from {}", path.display());

    thread::Builder::new()
        .name("storytime-fifo".to_string())
        .spawn(move || loop {
            // Blocks until a writer opens the pipe
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Failed to open {}: {}", path.display(), e);
                    return;
                }
            };

            match pump(BufReader::new(file), &router, &stop) {
                Finished::Quit => {
                    let _ = quit.send(());
                    return;
                }
                Finished::Stopped => return,
                Finished::Exhausted if stop.load(Ordering::SeqCst) => return,
                Finished::Exhausted => {}
            }
        })
}

/// Create a named pipe at `path` unless something is already there
#[cfg(unix)]
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => return Ok(()),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a named pipe", path.display()),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    nix::unistd::mkfifo(path, Mode::S_IRWXU)?;
    debug!("Created fifo {}", path.display());
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("named pipes are not supported here: {}", path.display()),
    ))
}
