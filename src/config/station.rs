// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Station and transport configuration
//!
//! Selects the station driver, how to reach the console and the station
//! properties the drivers need (position, archive interval, protocol
//! timing).

use serde::{Deserialize, Serialize};

use crate::transport::usbhid::HidFraming;

/// Station driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StationType {
    /// Davis Vantage Pro / Pro2 / Vue console
    VantagePro,
    /// Another daemon's datafeed, consumed as if it were a station
    Virtual,
    /// Synthetic data, no hardware
    Simulator,
}

/// Transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediumKind {
    Serial,
    Tcp,
    UsbHid,
    /// In-memory device; the Vantage Pro driver attaches its console emulator
    Mock,
    /// No transport (simulator)
    None,
}

/// How to reach the station console.
///
/// Only the fields relevant to `kind` are used: `device` and `baud_rate`
/// for serial, `host` and `port` for TCP, `device` and `hid_framing` for
/// USB-HID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediumConfig {
    pub kind: MediumKind,

    /// Serial device or hidraw node, e.g. `/dev/ttyUSB0`, `/dev/hidraw0`
    pub device: String,

    pub baud_rate: u32,

    pub host: String,

    pub port: u16,

    pub hid_framing: HidFraming,

    /// Delay between reopen attempts after a transport failure
    pub restart_delay_ms: u64,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            kind: MediumKind::Serial,
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            host: "127.0.0.1".to_string(),
            port: 22222,
            hid_framing: HidFraming::Raw,
            restart_delay_ms: 5000,
        }
    }
}

/// Vantage Pro protocol options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VantageConfig {
    /// The console is a WeatherLink IP (longer timeouts on every exchange)
    pub is_weatherlink_ip: bool,

    /// Download archive records from the console data logger instead of
    /// letting the daemon build them from readings
    pub generates_archives: bool,

    /// Query reception statistics after each archive download
    pub rx_check: bool,

    /// Wake-up attempts during start-up
    pub initial_wakeup_tries: u32,

    /// Pause between start-up wake-up attempts
    pub wakeup_retry_delay_ms: u64,

    /// Delay before each recovery attempt after a failed read
    pub read_recover_interval_ms: u64,

    /// Failed recovery attempts before the driver gives up
    pub read_recover_max_retries: u32,

    /// Keep start-up exchanges away from the top of the minute, when the
    /// console is busy writing its archive record
    pub avoid_minute_boundary: bool,
}

impl Default for VantageConfig {
    fn default() -> Self {
        Self {
            is_weatherlink_ip: false,
            generates_archives: true,
            rx_check: false,
            initial_wakeup_tries: 20,
            wakeup_retry_delay_ms: 1000,
            read_recover_interval_ms: 2500,
            read_recover_max_retries: 5,
            avoid_minute_boundary: true,
        }
    }
}

/// Station section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(rename = "type")]
    pub station_type: StationType,

    #[serde(default)]
    pub medium: MediumConfig,

    /// Archive interval in minutes; must divide 60
    pub archive_interval: u32,

    /// Elevation in feet
    #[serde(default)]
    pub elevation: f32,

    /// Latitude in degrees, north positive
    #[serde(default)]
    pub latitude: f32,

    /// Longitude in degrees, east positive
    #[serde(default)]
    pub longitude: f32,

    #[serde(default)]
    pub vantage: VantageConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_type: StationType::Simulator,
            medium: MediumConfig {
                kind: MediumKind::None,
                ..MediumConfig::default()
            },
            archive_interval: 5,
            elevation: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            vantage: VantageConfig::default(),
        }
    }
}
