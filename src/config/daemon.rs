// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon scheduling configuration

use serde::{Deserialize, Serialize};

/// Timers driving the station task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between two reading requests
    pub poll_interval_secs: u64,

    /// Hours between two console clock synchronisations (0 disables them)
    pub time_sync_interval_hours: u64,

    /// Seconds between two heartbeat log lines
    pub heartbeat_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            time_sync_interval_hours: 4,
            heartbeat_interval_secs: 60,
        }
    }
}
