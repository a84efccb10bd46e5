// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_weather_station::config::{Config, MediumKind, StationType};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.station.station_type = StationType::VantagePro;
    config.station.medium.kind = MediumKind::Serial;
    config.station.medium.device = "/dev/ttyUSB0".to_string();
    config.station.archive_interval = 10;
    config.datafeed.enabled = true;
    config.datafeed.port = 11012;
    config.save_to_file(&config_path)?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded.station.station_type, StationType::VantagePro);
    assert_eq!(loaded.station.medium.device, "/dev/ttyUSB0");
    assert_eq!(loaded.station.archive_interval, 10);
    assert!(loaded.datafeed.enabled);
    assert_eq!(loaded.datafeed.port, 11012);

    // A missing file is created with the defaults
    let missing = temp_dir.path().join("missing.yaml");
    let defaults = Config::from_file(&missing)?;
    assert!(missing.exists());
    assert_eq!(defaults.station.station_type, StationType::Simulator);
    assert_eq!(defaults.station.archive_interval, 5);
    assert_eq!(defaults.datafeed.port, 11011);
    assert_eq!(defaults.daemon.poll_interval_secs, 15);

    Ok(())
}

#[test]
fn test_minimal_yaml_uses_section_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "station:\n  type: vantage_pro\n  archive_interval: 15\n  medium:\n    kind: tcp\n    host: 192.168.1.20\n    port: 22222\n",
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.station.medium.kind, MediumKind::Tcp);
    assert_eq!(config.station.medium.port, 22222);
    assert!(config.station.vantage.generates_archives);
    assert_eq!(config.station.vantage.read_recover_max_retries, 5);
    assert_eq!(config.storage.archive_path, "archive.wxa");
    assert!(!config.datafeed.enabled);
    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();
    config.apply_args(
        Some(StationType::VantagePro),
        Some("/dev/ttyUSB1".to_string()),
        Some(true),
        Some(12000),
        Some("/var/lib/wx/archive.wxa".to_string()),
    );
    assert_eq!(config.station.station_type, StationType::VantagePro);
    assert_eq!(config.station.medium.device, "/dev/ttyUSB1");
    assert!(config.datafeed.enabled);
    assert_eq!(config.datafeed.port, 12000);
    assert_eq!(config.storage.archive_path, "/var/lib/wx/archive.wxa");

    // Nothing given, nothing changed
    let before = config.datafeed.port;
    config.apply_args(None, None, None, None, None);
    assert_eq!(config.datafeed.port, before);
}

#[test]
fn test_config_validation() -> Result<()> {
    assert!(Config::default().validate().is_ok());

    let mut bad_interval = Config::default();
    bad_interval.station.archive_interval = 7;
    assert!(bad_interval.validate().is_err());

    let mut no_medium = Config::default();
    no_medium.station.station_type = StationType::VantagePro;
    assert!(no_medium.validate().is_err());

    let mut bad_port = Config::default();
    bad_port.datafeed.enabled = true;
    bad_port.datafeed.port = 0;
    assert!(bad_port.validate().is_err());
    Ok(())
}

#[test]
fn test_invalid_file_writes_sample() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "station:\n  type: weather_rock\n  archive_interval: 5\n",
    )?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err());
    assert!(temp_dir.path().join("config.sample.yaml").exists());
    Ok(())
}
