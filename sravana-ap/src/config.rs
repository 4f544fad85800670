//! sravana-ap runtime configuration

use sravana_common::config::{AmbientSettings, PlaybackSettings, SleepTimerSettings, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Process-level settings (server + storage)
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub log_filter: String,
    pub player: PlayerConfig,
}

impl Config {
    /// Apply CLI overrides on top of the TOML bootstrap config
    pub fn from_toml(toml: TomlConfig, port: Option<u16>, database_path: Option<PathBuf>) -> Self {
        Self {
            port: port.unwrap_or(toml.port),
            database_path: database_path.unwrap_or_else(|| toml.database_path.clone()),
            log_filter: toml.logging.level.clone(),
            player: PlayerConfig::from(&toml),
        }
    }
}

/// Settings a `Player` needs
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    pub playback: PlaybackSettings,
    pub sleep_timer: SleepTimerSettings,
    pub ambient: AmbientSettings,
}

impl PlayerConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.playback.checkpoint_interval_secs.max(1))
    }

    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.playback.time_update_interval_ms.max(1))
    }
}

impl From<&TomlConfig> for PlayerConfig {
    fn from(toml: &TomlConfig) -> Self {
        Self {
            playback: toml.playback.clone(),
            sleep_timer: toml.sleep_timer.clone(),
            ambient: toml.ambient.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig::from_toml_str("port = 6100\ndatabase_path = \"/tmp/a.db\"").unwrap();
        let config = Config::from_toml(toml.clone(), Some(7000), None);
        assert_eq!(config.port, 7000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/a.db"));

        let config = Config::from_toml(toml, None, Some(PathBuf::from("/tmp/b.db")));
        assert_eq!(config.port, 6100);
        assert_eq!(config.database_path, PathBuf::from("/tmp/b.db"));
    }

    #[test]
    fn test_intervals() {
        let player = PlayerConfig::default();
        assert_eq!(player.checkpoint_interval(), Duration::from_secs(30));
        assert_eq!(player.time_update_interval(), Duration::from_millis(250));
    }
}
