/// Command-line and file configuration
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storytime_playback::PlaybackConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Audiobook directory {0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Autosave interval must be at least one second")]
    ZeroAutosaveInterval,

    #[error("No command source: enable stdin or give --fifo")]
    NoCommandSource,

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storytime")]
#[command(about = "Audiobook player that remembers where you were", long_about = None)]
pub struct Cli {
    /// Audiobook directory
    pub directory: PathBuf,

    /// Configuration file (default: $XDG_CONFIG_HOME/storytime/config.toml)
    #[arg(short, long, env = "STORYTIME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Playlog file, relative to the audiobook directory
    #[arg(long)]
    pub playlog_file: Option<PathBuf>,

    /// Extra file extensions to treat as audio (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Seconds between autosaves while playing
    #[arg(long)]
    pub autosave_interval: Option<u32>,

    /// Seconds to rewind after pausing
    #[arg(long)]
    pub backtrack: Option<u32>,

    /// Start playing right away
    #[arg(long)]
    pub autoplay: bool,

    /// Named pipe to read commands from (created if missing)
    #[arg(long)]
    pub fifo: Option<PathBuf>,

    /// Seconds between status lines while playing, 0 disables them
    #[arg(long)]
    pub status_interval: Option<u32>,

    /// Do not read commands from stdin
    #[arg(long)]
    pub no_stdin: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Effective settings after layering file, environment and flags
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub directory: PathBuf,

    #[serde(default = "default_playlog_file")]
    pub playlog_file: PathBuf,

    /// Seconds
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: u64,

    /// Seconds
    #[serde(default = "default_backtrack")]
    pub backtrack: u64,

    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub autoplay: bool,

    #[serde(default)]
    pub fifo: Option<PathBuf>,

    /// Seconds, 0 disables the status writer
    #[serde(default = "default_status_interval")]
    pub status_interval: u64,

    #[serde(default = "default_stdin")]
    pub stdin: bool,
}

impl Settings {
    /// Load from the config file, `STORYTIME_*` variables and the command line
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::load_with(cli, default_config_path())
    }

    /// Like [`Settings::load`], with an explicit fallback config file
    ///
    /// The fallback is only read if it exists; a file given on the
    /// command line must exist.
    pub fn load_with(cli: &Cli, fallback: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut settings = config::Config::builder();

        if let Some(path) = &cli.config {
            settings = settings.add_source(config::File::from(expand_home(path)).required(true));
        } else if let Some(path) = fallback.filter(|path| path.exists()) {
            settings = settings.add_source(config::File::from(path));
        }

        // Override with environment variables (prefixed with STORYTIME_)
        settings = settings.add_source(
            config::Environment::with_prefix("STORYTIME")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("extensions"),
        );

        // Command-line flags win
        settings = settings
            .set_override("directory", path_value(&cli.directory))?
            .set_override_option("playlog_file", cli.playlog_file.as_deref().map(path_value))?
            .set_override_option("extensions", cli.extensions.clone())?
            .set_override_option("autosave_interval", cli.autosave_interval.map(i64::from))?
            .set_override_option("backtrack", cli.backtrack.map(i64::from))?
            .set_override_option("autoplay", cli.autoplay.then_some(true))?
            .set_override_option("fifo", cli.fifo.as_deref().map(path_value))?
            .set_override_option("status_interval", cli.status_interval.map(i64::from))?
            .set_override_option("stdin", cli.no_stdin.then_some(false))?;

        let mut loaded: Self = settings.build()?.try_deserialize()?;
        loaded.directory = expand_home(&loaded.directory);
        loaded.fifo = loaded.fifo.as_deref().map(expand_home);
        Ok(loaded)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.directory.is_dir() {
            return Err(ConfigError::NotADirectory(self.directory.clone()));
        }

        if self.autosave_interval == 0 {
            return Err(ConfigError::ZeroAutosaveInterval);
        }

        if !self.stdin && self.fifo.is_none() {
            return Err(ConfigError::NoCommandSource);
        }

        Ok(())
    }

    /// Controller configuration
    pub fn playback(&self) -> PlaybackConfig {
        let mut config = PlaybackConfig::new(&self.directory);
        config.playlog_file = self.playlog_file.clone();
        config.autosave_interval = Duration::from_secs(self.autosave_interval);
        config.backtrack = Duration::from_secs(self.backtrack);
        config.extensions = self.extensions.clone();
        config.autoplay = self.autoplay;
        config
    }

    /// Status interval, None when disabled
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval > 0).then(|| Duration::from_secs(self.status_interval))
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `$XDG_CONFIG_HOME/storytime/config.toml`, falling back to `~/.config`
pub fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|path| path.is_absolute())
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("storytime").join("config.toml"))
}

/// Replace a leading `~` with `$HOME`
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// Default values
fn default_playlog_file() -> PathBuf {
    PathBuf::from(".playlog")
}

fn default_autosave_interval() -> u64 {
    60
}

fn default_backtrack() -> u64 {
    10
}

fn default_status_interval() -> u64 {
    1
}

fn default_stdin() -> bool {
    true
}
