//! Configuration file tests

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use usbd::{BuzzMode, PeripheralKind, UsbdConfig, load_config};

#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("usbd.toml");

    let mut config = UsbdConfig::default();
    config.general.log_level = "debug".to_string();
    config.passthrough.enabled = false;
    config.emulation.always_present = vec![PeripheralKind::Turntable];
    config.emulation.buzz = BuzzMode::OneController;
    config.timing.attach_delay_us = 0;

    config.save(&path).unwrap();
    let loaded = UsbdConfig::load(Some(path)).unwrap();

    assert_eq!(loaded.general.log_level, "debug");
    assert!(!loaded.passthrough.enabled);
    assert_eq!(loaded.emulation.always_present, vec![PeripheralKind::Turntable]);
    assert_eq!(loaded.emulation.buzz, BuzzMode::OneController);
    assert_eq!(loaded.timing.attach_delay(), Duration::ZERO);
}

#[test]
fn test_missing_sections_use_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usbd.toml");
    fs::write(
        &path,
        r#"
[general]
log_level = "warn"

[passthrough]
enabled = true

[timing]
attach_delay_us = 1000
"#,
    )
    .unwrap();

    let config = UsbdConfig::load(Some(path)).unwrap();
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.emulation.always_present.len(), 3);
    assert_eq!(config.emulation.buzz, BuzzMode::None);
    assert_eq!(config.timing.attach_delay(), Duration::from_millis(1));
    assert_eq!(config.timing.busy_interval(), Duration::from_micros(200));
    assert_eq!(config.timing.idle_interval(), Duration::from_millis(500));
}

#[test]
fn test_invalid_files_rejected() {
    let dir = TempDir::new().unwrap();

    let bad_level = dir.path().join("level.toml");
    fs::write(
        &bad_level,
        "[general]\nlog_level = \"loud\"\n[passthrough]\nenabled = true\n",
    )
    .unwrap();
    assert!(UsbdConfig::load(Some(bad_level)).is_err());

    let bad_syntax = dir.path().join("syntax.toml");
    fs::write(&bad_syntax, "[general\nlog_level = ").unwrap();
    assert!(UsbdConfig::load(Some(bad_syntax)).is_err());

    let unknown_kind = dir.path().join("kind.toml");
    fs::write(
        &unknown_kind,
        "[general]\nlog_level = \"info\"\n[passthrough]\nenabled = true\n[emulation]\nalways_present = [\"theremin\"]\n",
    )
    .unwrap();
    assert!(UsbdConfig::load(Some(unknown_kind)).is_err());
}

#[test]
fn test_load_config_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(load_config(path.to_str().unwrap()).is_err());
}

#[test]
fn test_load_config_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usbd.toml");
    UsbdConfig::default().save(&path).unwrap();

    let config = load_config(path.to_str().unwrap()).unwrap();
    assert!(config.passthrough.enabled);
}
