//! Bootstrap configuration loading
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`~/.config/sravana/config.toml`)
//! 4. System config file (`/etc/sravana/config.toml`, Linux only)
//! 5. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bootstrap configuration loaded from TOML
///
/// Every field has a built-in default so an empty file (or no file) is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database for listening progress
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub sleep_timer: SleepTimerSettings,

    #[serde(default)]
    pub ambient: AmbientSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            playback: PlaybackSettings::default(),
            sleep_timer: SleepTimerSettings::default(),
            ambient: AmbientSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive (tracing-subscriber EnvFilter syntax)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Playback timing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSettings {
    /// Interval between progress checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,

    /// A track counts as completed within this many seconds of its end
    #[serde(default = "default_completion_tolerance")]
    pub completion_tolerance_secs: f64,

    /// Interval of time-update events fed to the controller
    #[serde(default = "default_time_update_interval")]
    pub time_update_interval_ms: u64,

    /// Step used by keyboard skip commands
    #[serde(default = "default_skip_seconds")]
    pub skip_seconds: f64,

    /// Initial volume for a new session (0.0-1.0)
    #[serde(default = "default_playback_volume")]
    pub default_volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval_secs: default_checkpoint_interval(),
            completion_tolerance_secs: default_completion_tolerance(),
            time_update_interval_ms: default_time_update_interval(),
            skip_seconds: default_skip_seconds(),
            default_volume: default_playback_volume(),
        }
    }
}

/// Sleep timer bell options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SleepTimerSettings {
    #[serde(default)]
    pub chime_on_arm: bool,

    #[serde(default = "default_true")]
    pub chime_on_sleep: bool,
}

impl Default for SleepTimerSettings {
    fn default() -> Self {
        Self {
            chime_on_arm: false,
            chime_on_sleep: true,
        }
    }
}

/// Ambient sound options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmbientSettings {
    #[serde(default = "default_ambient_volume")]
    pub default_volume: f32,

    #[serde(default = "default_chime_frequency")]
    pub chime_frequency_hz: f32,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            default_volume: default_ambient_volume(),
            chime_frequency_hz: default_chime_frequency(),
        }
    }
}

fn default_port() -> u16 {
    5790
}

fn default_database_path() -> PathBuf {
    default_data_folder().join("sravana.db")
}

fn default_log_level() -> String {
    "sravana_ap=info,tower_http=info".to_string()
}

fn default_checkpoint_interval() -> u64 {
    30
}

fn default_completion_tolerance() -> f64 {
    10.0
}

fn default_time_update_interval() -> u64 {
    250
}

fn default_skip_seconds() -> f64 {
    15.0
}

fn default_playback_volume() -> f32 {
    0.8
}

fn default_ambient_volume() -> f32 {
    0.3
}

fn default_chime_frequency() -> f32 {
    528.0
}

fn default_true() -> bool {
    true
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.playback.checkpoint_interval_secs == 0 {
            return Err(Error::Config("checkpoint_interval_secs must be > 0".to_string()));
        }
        if self.playback.time_update_interval_ms == 0 {
            return Err(Error::Config("time_update_interval_ms must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.playback.default_volume) {
            return Err(Error::Config("playback.default_volume must be within 0.0-1.0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.ambient.default_volume) {
            return Err(Error::Config("ambient.default_volume must be within 0.0-1.0".to_string()));
        }
        if self.playback.completion_tolerance_secs < 0.0 {
            return Err(Error::Config("completion_tolerance_secs must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// Resolve and load configuration
///
/// `cli_path` wins over `env_var_name`; when neither names a file the
/// platform config locations are tried, then built-in defaults are used.
pub fn resolve_config(cli_path: Option<&Path>, env_var_name: &str) -> Result<TomlConfig> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return TomlConfig::load(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return TomlConfig::load(Path::new(&path));
    }

    // Priority 3/4: Platform config files
    if let Some(path) = find_config_file() {
        return TomlConfig::load(&path);
    }

    // Priority 5: Built-in defaults
    debug!("No config file found, using built-in defaults");
    Ok(TomlConfig::default())
}

/// Locate a platform config file, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("sravana").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/sravana/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("sravana"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/sravana"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("sravana"))
            .unwrap_or_else(|| PathBuf::from("./sravana_data"))
    }
}
