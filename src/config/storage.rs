// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Archive storage configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Append-only archive file, created on first use
    pub archive_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            archive_path: "archive.wxa".to_string(),
        }
    }
}
