// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, MediumKind, StationType};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./rust_weather_station --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(super::CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    // Pretty-print the schema
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    // Output to stdout
    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
///
/// # Arguments
///
/// * `addr` - The address string to validate
///
/// # Returns
///
/// `true` if the address is valid, `false` otherwise
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Archive interval**: must divide an hour so records land on fixed
///   wall-clock boundaries
/// - **Medium**: the selected transport must carry the parameters it needs,
///   and the simulator must not claim one
/// - **Vantage Pro**: recovery and wake-up counters must be non-zero
/// - **Datafeed**: the bind address should be an IP address
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let station = &config.station;
    if station.archive_interval == 0 || 60 % station.archive_interval != 0 {
        anyhow::bail!(
            "Archive interval must divide 60 minutes, got {}",
            station.archive_interval
        );
    }

    let medium = &station.medium;
    match (station.station_type, medium.kind) {
        (StationType::Simulator, MediumKind::None) => {}
        (StationType::Simulator, kind) => {
            anyhow::bail!("The simulator station does not use a transport, got {:?}", kind)
        }
        (station_type, MediumKind::None) => {
            anyhow::bail!("Station type {:?} requires a transport", station_type)
        }
        (StationType::Virtual, kind) if kind != MediumKind::Tcp => {
            anyhow::bail!("The virtual station reads a datafeed over TCP, got {:?}", kind)
        }
        _ => {}
    }

    match medium.kind {
        MediumKind::Serial | MediumKind::UsbHid if medium.device.trim().is_empty() => {
            anyhow::bail!("Medium {:?} requires a device path", medium.kind)
        }
        MediumKind::Serial if medium.baud_rate == 0 => {
            anyhow::bail!("Serial baud rate must be non-zero")
        }
        MediumKind::Tcp if medium.host.trim().is_empty() || medium.port == 0 => {
            anyhow::bail!("TCP medium requires a host and a non-zero port")
        }
        _ => {}
    }

    if station.station_type == StationType::VantagePro {
        if station.vantage.read_recover_max_retries == 0 {
            anyhow::bail!("read_recover_max_retries must be at least 1");
        }
        if station.vantage.initial_wakeup_tries == 0 {
            anyhow::bail!("initial_wakeup_tries must be at least 1");
        }
    }

    if config.datafeed.enabled && config.datafeed.port == 0 {
        anyhow::bail!("Invalid datafeed port number: {}", config.datafeed.port);
    }
    if !is_valid_ip_address(&config.datafeed.address) {
        // Hostnames are accepted by the listener, only warn
        warn!(
            "Potentially invalid datafeed address format: {}",
            config.datafeed.address
        );
    }

    if config.storage.archive_path.trim().is_empty() {
        anyhow::bail!("Archive path must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_interval_must_divide_an_hour() {
        let mut config = Config::default();
        config.station.archive_interval = 7;
        assert!(validate_specific_rules(&config).is_err());
        config.station.archive_interval = 30;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_station_requires_matching_medium() {
        let mut config = Config::default();
        config.station.station_type = StationType::VantagePro;
        assert!(validate_specific_rules(&config).is_err());

        config.station.medium.kind = MediumKind::Serial;
        assert!(validate_specific_rules(&config).is_ok());

        config.station.station_type = StationType::Virtual;
        assert!(validate_specific_rules(&config).is_err());
        config.station.medium.kind = MediumKind::Tcp;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_ip_address_helper() {
        assert!(is_valid_ip_address("127.0.0.1"));
        assert!(is_valid_ip_address("::"));
        assert!(!is_valid_ip_address("weather.local"));
    }
}
