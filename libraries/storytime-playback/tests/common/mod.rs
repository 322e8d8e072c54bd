//! Shared helpers for controller and router tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storytime_playback::{
    BackendPlayer, Controller, EndOfStream, Nanos, PlaybackConfig, PlaybackError, Result, SECOND,
};
use tempfile::TempDir;

/// What the mock backend has been asked to do
#[derive(Default)]
pub struct MockState {
    pub durations: HashMap<String, Nanos>,
    pub broken: HashSet<String>,
    pub loaded: Option<String>,
    pub position: Nanos,
    pub playing: bool,
    pub volume: f64,
    pub unavailable: bool,
    pub tokens: Vec<EndOfStream>,
    pub loads: Vec<String>,
}

/// Backend that plays nothing; tests move the position by hand
#[derive(Clone)]
pub struct MockBackend(pub Arc<Mutex<MockState>>);

impl MockBackend {
    pub fn new(files: &[(&str, Nanos)]) -> Self {
        let state = MockState {
            durations: files
                .iter()
                .map(|(name, duration)| ((*name).to_string(), *duration))
                .collect(),
            volume: 1.0,
            ..MockState::default()
        };
        Self(Arc::new(Mutex::new(state)))
    }

    /// Take the most recent end-of-stream token
    pub fn last_token(&self) -> EndOfStream {
        self.0
            .lock()
            .tokens
            .last()
            .cloned()
            .expect("backend was never told to play")
    }

    pub fn set_position(&self, position: Nanos) {
        self.0.lock().position = position;
    }

    pub fn is_playing(&self) -> bool {
        self.0.lock().playing
    }

    pub fn volume(&self) -> f64 {
        self.0.lock().volume
    }
}

impl BackendPlayer for MockBackend {
    fn load(&mut self, path: &Path) -> Result<Nanos> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let mut state = self.0.lock();
        state.loads.push(name.clone());
        state.playing = false;
        state.position = 0;
        if state.broken.contains(&name) {
            state.loaded = None;
            return Err(PlaybackError::Backend(format!("cannot decode {}", name)));
        }
        let duration = state.durations.get(&name).copied().unwrap_or(0);
        state.loaded = Some(name);
        Ok(duration)
    }

    fn play(&mut self, end_of_stream: EndOfStream) {
        let mut state = self.0.lock();
        state.playing = true;
        state.tokens.push(end_of_stream);
    }

    fn pause(&mut self) {
        self.0.lock().playing = false;
    }

    fn seek(&mut self, position: Nanos) {
        self.0.lock().position = position;
    }

    fn position(&self) -> Option<Nanos> {
        let state = self.0.lock();
        (state.loaded.is_some() && !state.unavailable).then_some(state.position)
    }

    fn duration(&self) -> Option<Nanos> {
        let state = self.0.lock();
        if state.unavailable {
            return None;
        }
        let loaded = state.loaded.as_ref()?;
        state.durations.get(loaded).copied()
    }

    fn volume(&self) -> f64 {
        self.0.lock().volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.0.lock().volume = volume;
    }
}

/// A book directory with one empty file per name
pub struct Book {
    pub dir: TempDir,
    pub backend: MockBackend,
}

impl Book {
    /// Files with durations in whole seconds
    pub fn new(files: &[(&str, i64)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, _) in files {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let durations: Vec<(&str, Nanos)> = files
            .iter()
            .map(|(name, seconds)| (*name, seconds * SECOND))
            .collect();
        Self {
            dir,
            backend: MockBackend::new(&durations),
        }
    }

    /// Defaults, except no backtrack and an autosave that never ticks
    pub fn config(&self) -> PlaybackConfig {
        let mut config = PlaybackConfig::new(self.dir.path());
        config.backtrack = Duration::ZERO;
        config.autosave_interval = Duration::from_secs(3600);
        config
    }

    pub fn controller(&self) -> Controller {
        self.controller_with(self.config())
    }

    pub fn controller_with(&self, config: PlaybackConfig) -> Controller {
        let controller = Controller::new(config, Box::new(self.backend.clone())).unwrap();
        controller.start().unwrap();
        controller
    }

    pub fn playlog_path(&self) -> std::path::PathBuf {
        self.dir.path().join(".playlog")
    }

    pub fn autosave_path(&self) -> std::path::PathBuf {
        self.dir.path().join(".playlog.auto")
    }

    pub fn autosave_exists(&self) -> bool {
        self.autosave_path().exists()
    }
}

/// Event tokens of the in-memory playlog
pub fn events(controller: &Controller) -> Vec<String> {
    controller
        .playlog()
        .into_iter()
        .map(|entry| entry.event)
        .collect()
}

/// Current file and position in whole seconds
pub fn at(controller: &Controller) -> (String, i64) {
    let report = controller.position();
    (report.filename.unwrap_or_default(), report.position / SECOND)
}
