// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Derived meteorological quantities
//!
//! All inputs and outputs are US customary units (°F, %, mph, inHg, feet).
//! Every function returns [`ARCHIVE_VALUE_NULL`] when one of its inputs is
//! itself null, so derived channels follow the availability of their
//! sources.

use crate::records::{is_null, ARCHIVE_VALUE_NULL};

const GAS_CONSTANT_RATIO: f64 = 29.263;
const ALTIMETER_EXPONENT: f64 = 0.190284;

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * 0.3048
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * 33.8639
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa * 0.0295299
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn fahrenheit_to_kelvin(f: f64) -> f64 {
    fahrenheit_to_celsius(f) + 273.15
}

/// Dewpoint (°F) from temperature (°F) and relative humidity (%).
pub fn dewpoint(temp_f: f32, humidity: f32) -> f32 {
    if is_null(temp_f) || is_null(humidity) || humidity <= 0.0 {
        return ARCHIVE_VALUE_NULL;
    }

    let tc = fahrenheit_to_celsius(temp_f as f64);
    let saturation = 6.11 * 10f64.powf(7.5 * tc / (237.7 + tc));
    let vapor = humidity as f64 * saturation / 100.0;
    let ln_e = vapor.ln();
    let tdc = (-430.22 + 237.7 * ln_e) / (-ln_e + 19.08);
    (9.0 / 5.0 * tdc + 32.0) as f32
}

/// Heat index (°F), equal to the temperature below 75 °F.
pub fn heat_index(temp_f: f32, humidity: f32) -> f32 {
    if is_null(temp_f) || is_null(humidity) {
        return ARCHIVE_VALUE_NULL;
    }
    if temp_f < 75.0 {
        return temp_f;
    }

    let t = temp_f as f64;
    let rh = humidity as f64;
    let hi = -42.379 + 2.04901523 * t + 10.14333127 * rh
        - 0.22475541 * t * rh
        - 6.83783e-3 * t * t
        - 5.481717e-2 * rh * rh
        + 1.22874e-3 * t * t * rh
        + 8.5282e-4 * t * rh * rh
        - 1.99e-6 * t * t * rh * rh;
    hi as f32
}

/// Wind chill (°F), equal to the temperature at or above 50 °F or with
/// winds of 3 mph or less.
pub fn wind_chill(temp_f: f32, wind_mph: f32) -> f32 {
    if is_null(temp_f) || is_null(wind_mph) {
        return ARCHIVE_VALUE_NULL;
    }
    if temp_f >= 50.0 || wind_mph <= 3.0 {
        return temp_f;
    }

    let t = temp_f as f64;
    let v = (wind_mph as f64).powf(0.16);
    (35.74 + 0.6215 * t - 35.75 * v + 0.4275 * t * v) as f32
}

/// Station pressure from sea-level pressure.
///
/// `temp_f` should be a long-term average (the 12-hour mean), not the
/// instantaneous temperature.
pub fn sea_level_to_station_pressure(slp_inhg: f32, elevation_ft: f32, temp_f: f32) -> f32 {
    if is_null(slp_inhg) || is_null(temp_f) {
        return ARCHIVE_VALUE_NULL;
    }
    let exponent =
        -feet_to_meters(elevation_ft as f64) / (fahrenheit_to_kelvin(temp_f as f64) * GAS_CONSTANT_RATIO);
    (slp_inhg as f64 * exponent.exp()) as f32
}

/// Sea-level pressure from station pressure.
pub fn station_to_sea_level_pressure(sp_inhg: f32, elevation_ft: f32, temp_f: f32) -> f32 {
    sea_level_to_station_pressure(sp_inhg, -elevation_ft, temp_f)
}

/// Altimeter setting (inHg) from station pressure.
pub fn altimeter_from_station_pressure(sp_inhg: f32, elevation_ft: f32) -> f32 {
    if is_null(sp_inhg) {
        return ARCHIVE_VALUE_NULL;
    }
    let sp_hpa = inhg_to_hpa(sp_inhg as f64) - 0.3;
    let elevation_m = feet_to_meters(elevation_ft as f64);
    let k = 1013.25f64.powf(ALTIMETER_EXPONENT) * 0.0065 / 288.0;
    let ratio = 1.0 + k * elevation_m / sp_hpa.powf(ALTIMETER_EXPONENT);
    hpa_to_inhg(ratio.powf(1.0 / ALTIMETER_EXPONENT) * sp_hpa) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_dewpoint_saturated_air_equals_temperature() {
        assert_abs_diff_eq!(dewpoint(68.0, 100.0), 68.0, epsilon = 0.2);
        assert_abs_diff_eq!(dewpoint(86.0, 50.0), 65.0, epsilon = 1.0);
        assert_eq!(dewpoint(ARCHIVE_VALUE_NULL, 50.0), ARCHIVE_VALUE_NULL);
    }

    #[test]
    fn test_heat_index_thresholds() {
        assert_eq!(heat_index(70.0, 90.0), 70.0);
        assert_abs_diff_eq!(heat_index(90.0, 70.0), 105.9, epsilon = 0.5);
    }

    #[test]
    fn test_wind_chill_thresholds() {
        assert_eq!(wind_chill(55.0, 20.0), 55.0);
        assert_eq!(wind_chill(20.0, 2.0), 20.0);
        assert_abs_diff_eq!(wind_chill(0.0, 15.0), -19.0, epsilon = 0.5);
    }

    #[test]
    fn test_pressure_conversions() {
        // At sea level nothing changes
        assert_abs_diff_eq!(sea_level_to_station_pressure(30.0, 0.0, 59.0), 30.0);
        assert_abs_diff_eq!(altimeter_from_station_pressure(29.92, 0.0), 29.92, epsilon = 0.02);

        let sp = sea_level_to_station_pressure(30.0, 1000.0, 59.0);
        assert!(sp < 30.0 && sp > 28.5);
        assert_abs_diff_eq!(station_to_sea_level_pressure(sp, 1000.0, 59.0), 30.0, epsilon = 1e-3);
        assert_abs_diff_eq!(altimeter_from_station_pressure(sp, 1000.0), 30.0, epsilon = 0.1);
    }
}
