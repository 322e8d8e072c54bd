//! Status writer
//!
//! Prints `<walltime>: <file> <position>/<duration> (vol: <volume>)` every
//! interval while playing, and straight away on every position hint.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use storytime_playback::{format_position, Controller, PlaybackEvent, PositionReport};
use tracing::{debug, error};

/// One status line, without the newline
pub fn status_line(report: &PositionReport, volume: f64, walltime: &str) -> String {
    format!(
        "{}: {} {}/{} (vol: {})",
        walltime,
        report.filename.as_deref().unwrap_or("-"),
        format_position(report.position),
        format_position(report.duration),
        volume
    )
}

/// Background thread printing status lines
pub struct StatusWriter {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StatusWriter {
    /// Start printing to `out`, driven by `events` from `controller`
    pub fn spawn<W>(
        controller: Controller,
        events: Receiver<PlaybackEvent>,
        interval: Duration,
        mut out: W,
    ) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (stop, stopped) = bounded(1);

        let handle = thread::Builder::new()
            .name("storytime-status".to_string())
            .spawn(move || {
                let mut playing = controller.state() == storytime_playback::PlaybackState::Playing;
                write_status(&controller, &mut out);

                loop {
                    let timeout = if playing {
                        interval
                    } else {
                        // Nothing moves while paused
                        Duration::from_secs(3600)
                    };

                    select! {
                        recv(stopped) -> _ => break,
                        recv(events) -> event => match event {
                            Ok(PlaybackEvent::PlayingChanged { playing: now }) => playing = now,
                            Ok(PlaybackEvent::PositionChanged | PlaybackEvent::VolumeChanged { .. }) => {
                                write_status(&controller, &mut out);
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        },
                        default(timeout) => {
                            if playing {
                                write_status(&controller, &mut out);
                            }
                        }
                    }
                }

                write_status(&controller, &mut out);
                debug!("Status writer stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Print a last line and stop
    pub fn shutdown(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Status writer panicked");
            }
        }
    }
}

fn write_status(controller: &Controller, out: &mut impl Write) {
    let (report, volume) = controller.transaction(|session| (session.position(), session.volume()));
    let walltime = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let line = status_line(&report, volume, &walltime);

    if let Err(e) = writeln!(out, "{}", line).and_then(|()| out.flush()) {
        debug!("Failed to write status: {}", e);
    }
}
