// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the weather station daemon
//!
//! The configuration is backed by a YAML file and validated against a JSON
//! schema before it is deserialized, then checked against the cross-field
//! rules of [`utils::validate_specific_rules`].
//!
//! ## Configuration Structure
//!
//! - `station`: driver selection, transport and station properties
//! - `calibration`: per-quantity linear corrections
//! - `storage`: archive file location
//! - `datafeed`: datafeed TCP server
//! - `daemon`: polling and housekeeping timers
//!
//! ## Usage
//!
//! ```no_run
//! use rust_weather_station::config::{Config, StationType};
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(StationType::VantagePro),       // Station type
//!     Some("/dev/ttyUSB1".to_string()),    // Device
//!     Some(true),                          // Enable datafeed
//!     None,                                // Datafeed port
//!     None,                                // Archive path
//! );
//!
//! println!("Archive interval: {} min", config.station.archive_interval);
//! ```

pub mod calibration;
pub mod daemon;
pub mod datafeed;
pub mod station;
pub mod storage;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use calibration::{Calibration, CalibrationConfig};
pub use daemon::DaemonConfig;
pub use datafeed::DatafeedConfig;
pub use station::{MediumConfig, MediumKind, StationConfig, StationType, VantageConfig};
pub use storage::StorageConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure for the weather station daemon.
///
/// Every section falls back to its defaults when absent from the file, so
/// a minimal configuration only names what differs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Station driver, transport and station properties.
    #[serde(default)]
    pub station: StationConfig,

    /// Linear corrections applied to the raw sensor values.
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Where archive records are persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Datafeed server publishing readings and archive records.
    #[serde(default)]
    pub datafeed: DatafeedConfig,

    /// Polling and housekeeping timers.
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Embedded JSON schema of the configuration file.
const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

fn schema_validator() -> Result<jsonschema::Validator> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
    let validator = jsonschema::draft202012::options()
        .should_validate_formats(true)
        .build(&schema)?;
    Ok(validator)
}

impl Config {
    /// Write a default configuration next to a rejected one so the user has
    /// a valid starting point.
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory for sample config at {:?}", parent)
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file, creating a default one if missing.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Configuration file not found at {:?}, creating default", path);
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // Validate the generic document first so schema errors name the
        // offending field rather than a serde position
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = serde_json::to_value(&yaml_value)
            .with_context(|| format!("Failed to convert YAML to JSON for validation: {:?}", path))?;

        debug!("Validating {} against schema", path.display());
        if let Err(error) = schema_validator()?.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                anyhow::bail!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                );
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Check an in-memory configuration against the schema and the
    /// cross-field rules.
    pub fn validate(&self) -> Result<()> {
        let json_value =
            serde_json::to_value(self).context("Failed to convert configuration to JSON")?;
        if let Err(error) = schema_validator()?.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }
        utils::validate_specific_rules(self)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `station_type` - Station driver to use
    /// * `device` - Serial device or hidraw node of the console
    /// * `datafeed_enabled` - Enable or disable the datafeed server
    /// * `datafeed_port` - TCP port of the datafeed server
    /// * `archive_path` - Archive file location
    pub fn apply_args(
        &mut self,
        station_type: Option<StationType>,
        device: Option<String>,
        datafeed_enabled: Option<bool>,
        datafeed_port: Option<u16>,
        archive_path: Option<String>,
    ) {
        if let Some(station_type) = station_type {
            debug!("Overriding station type from command line: {:?}", station_type);
            self.station.station_type = station_type;
            if station_type == StationType::Simulator {
                self.station.medium.kind = MediumKind::None;
            }
        }

        if let Some(device) = device {
            debug!("Overriding station device from command line: {}", device);
            self.station.medium.device = device;
        }

        if let Some(enabled) = datafeed_enabled {
            debug!("Overriding datafeed enabled from command line: {}", enabled);
            self.datafeed.enabled = enabled;
        }
        if let Some(port) = datafeed_port {
            debug!("Overriding datafeed port from command line: {}", port);
            self.datafeed.port = port;
        }

        if let Some(path) = archive_path {
            debug!("Overriding archive path from command line: {}", path);
            self.storage.archive_path = path;
        }
    }
}
