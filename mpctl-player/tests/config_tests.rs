//! Player configuration loading tests
//!
//! Exercises `PlayerConfig::load` with real files; the path is always given
//! explicitly so the environment cannot interfere.

use mpctl_player::config::{MAX_POSITION_INTERVAL_MS, MIN_POSITION_INTERVAL_MS};
use mpctl_player::{Error, PlayerConfig};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
        position_update_interval_ms = 250
        prepare_timeout_ms = 5000
        looping = true

        [logging]
        level = "debug"

        [sim]
        duration_ms = 12000
        keyframe_interval_ms = 1000
        child_messages = false
        "#,
    );

    let config = PlayerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.position_update_interval_ms, 250);
    assert_eq!(config.prepare_timeout_ms, 5000);
    assert!(config.looping);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.sim.duration_ms, 12_000);
    assert_eq!(config.sim.keyframe_interval_ms, 1000);
    assert!(!config.sim.child_messages);
    assert_eq!(config.sim.video_width, 1280);
}

#[test]
fn test_load_clamps_out_of_range_values() {
    let file = write_config(
        r#"
        position_update_interval_ms = 2
        prepare_timeout_ms = 0
        "#,
    );

    let config = PlayerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.position_update_interval_ms, MIN_POSITION_INTERVAL_MS);
    assert_eq!(config.prepare_timeout_ms, 30_000);

    let file = write_config("position_update_interval_ms = 999999\n");
    let config = PlayerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.position_update_interval_ms, MAX_POSITION_INTERVAL_MS);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = PlayerConfig::load(Some(&path)).unwrap();
    assert_eq!(config, PlayerConfig::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("position_update_interval_ms = \"often\"\n");

    let result = PlayerConfig::load(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}
