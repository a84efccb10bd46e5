// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Datafeed server configuration

use serde::{Deserialize, Serialize};

/// Configuration for the datafeed TCP server.
///
/// The datafeed pushes readings and archive records to connected clients
/// (for example another daemon running the virtual station driver) and
/// answers their archive requests.
///
/// # Example
///
/// ```
/// use rust_weather_station::config::DatafeedConfig;
///
/// let datafeed = DatafeedConfig {
///     enabled: true,
///     port: 11012,
///     address: "0.0.0.0".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatafeedConfig {
    /// Start the datafeed server.
    pub enabled: bool,

    /// TCP port to listen on, 11011 by default.
    pub port: u16,

    /// Address to bind to. Use "0.0.0.0" to accept remote clients.
    pub address: String,
}

impl Default for DatafeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 11011,
            address: "127.0.0.1".to_string(),
        }
    }
}
