//! Storytime Command-Line Player
//!
//! Wires the playback controller to a headless clock backend, command
//! readers (stdin, named pipe) and a status writer.
//!
//! This library exposes the components for testing purposes.

pub mod clock_backend;
pub mod config;
pub mod input;
pub mod status;

// Re-export commonly used types for convenience
pub use clock_backend::{probe_duration, ClockBackend};
pub use config::{Cli, ConfigError, Settings};
pub use input::{ensure_fifo, pump, spawn_fifo, spawn_stdin, Finished};
pub use status::{status_line, StatusWriter};
