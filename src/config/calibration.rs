// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor calibration
//!
//! Each quantity is corrected linearly as `value * multiplier + constant`
//! before it is stored or published.

use serde::{Deserialize, Serialize};

/// Linear correction for one quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub multiplier: f32,
    pub constant: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            constant: 0.0,
        }
    }
}

impl Calibration {
    pub fn apply(&self, value: f32) -> f32 {
        value * self.multiplier + self.constant
    }

    pub fn is_identity(&self) -> bool {
        self.multiplier == 1.0 && self.constant == 0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub barometer: Calibration,
    pub pressure: Calibration,
    pub altimeter: Calibration,
    pub in_temp: Calibration,
    pub out_temp: Calibration,
    pub in_humidity: Calibration,
    pub out_humidity: Calibration,
    pub wind_speed: Calibration,
    pub wind_dir: Calibration,
    pub rain: Calibration,
    pub rain_rate: Calibration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_correction() {
        let cal = Calibration {
            multiplier: 1.02,
            constant: -0.5,
        };
        assert!((cal.apply(100.0) - 101.5).abs() < 1e-4);
        assert!(Calibration::default().is_identity());
    }
}
