//! Repeating timer on a dedicated thread
//!
//! Drives the autosave. The tick callback runs on the timer thread, so it
//! must take whatever lock it needs itself and re-check that it is still
//! wanted once it holds it: a `stop()` can arrive while the tick is waiting.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Control {
    Start,
    Stop,
    Shutdown,
}

/// Timer that fires every `interval` while started
#[derive(Debug)]
pub struct RepeatingTimer {
    control: Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    /// Spawn the timer thread, initially stopped
    pub fn spawn<F>(name: &str, interval: Duration, tick: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (control, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut running = false;
                loop {
                    let message = if running {
                        rx.recv_timeout(interval)
                    } else {
                        rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    };

                    match message {
                        Ok(Control::Start) => running = true,
                        Ok(Control::Stop) => running = false,
                        Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => tick(),
                    }
                }
            })?;

        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Start firing. Restarts the countdown if already started.
    pub fn start(&self) {
        let _ = self.control.send(Control::Start);
    }

    /// Stop firing. A tick already in progress still completes.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Stop the thread and wait for it to exit
    ///
    /// Must not be called while holding a lock the tick callback takes.
    pub fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Timer thread panicked");
            }
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        // Detach rather than join: the tick may be blocked on a lock held by the dropper.
        let _ = self.control.send(Control::Shutdown);
    }
}
