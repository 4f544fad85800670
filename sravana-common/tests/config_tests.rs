//! Tests for TOML bootstrap configuration

use sravana_common::config::{resolve_config, TomlConfig};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_empty_file_uses_defaults() {
    let config = TomlConfig::from_toml_str("").unwrap();

    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.playback.checkpoint_interval_secs, 30);
    assert_eq!(config.playback.completion_tolerance_secs, 10.0);
    assert_eq!(config.ambient.chime_frequency_hz, 528.0);
    assert!(config.sleep_timer.chime_on_sleep);
    assert!(!config.sleep_timer.chime_on_arm);
}

#[test]
fn test_partial_sections_override() {
    let config = TomlConfig::from_toml_str(
        r#"
        port = 6000
        database_path = "/tmp/progress.db"

        [playback]
        checkpoint_interval_secs = 5
        skip_seconds = 30.0

        [sleep_timer]
        chime_on_arm = true
        "#,
    )
    .unwrap();

    assert_eq!(config.port, 6000);
    assert_eq!(config.database_path.to_str(), Some("/tmp/progress.db"));
    assert_eq!(config.playback.checkpoint_interval_secs, 5);
    assert_eq!(config.playback.skip_seconds, 30.0);
    // Untouched keys keep defaults
    assert_eq!(config.playback.time_update_interval_ms, 250);
    assert!(config.sleep_timer.chime_on_arm);
    assert!(config.sleep_timer.chime_on_sleep);
}

#[test]
fn test_invalid_values_rejected() {
    assert!(TomlConfig::from_toml_str("[playback]\ncheckpoint_interval_secs = 0").is_err());
    assert!(TomlConfig::from_toml_str("[ambient]\ndefault_volume = 1.5").is_err());
    assert!(TomlConfig::from_toml_str("port = \"not a number\"").is_err());
}

#[test]
fn test_cli_path_has_priority() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = 7001").unwrap();

    let config = resolve_config(Some(file.path()), "SRAVANA_TEST_UNSET_CONFIG_VAR").unwrap();
    assert_eq!(config.port, 7001);
}

#[test]
fn test_missing_cli_file_is_error() {
    let result = resolve_config(
        Some(std::path::Path::new("/nonexistent/sravana/config.toml")),
        "SRAVANA_TEST_UNSET_CONFIG_VAR",
    );
    assert!(result.is_err());
}
