// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Current-conditions snapshot
//!
//! [`Reading`] is the flat, station independent record filled by every
//! driver on each poll. Field order follows the canonical wire layout
//! (see [`crate::codec::reading`]); units are US customary (inHg, °F, mph,
//! inches).

use serde::{Deserialize, Serialize};

use super::archive::ARCHIVE_VALUE_NULL;

/// Number of slots in the generic extra sensor arrays.
pub const EXTRA_SENSOR_SLOTS: usize = 16;

/// Battery status value meaning "not reported".
pub const BATTERY_STATUS_UNKNOWN: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    // Required by every station
    pub barometer: f32,
    pub station_pressure: f32,
    pub altimeter: f32,
    pub in_temp: f32,
    pub out_temp: f32,
    pub in_humidity: u16,
    pub out_humidity: u16,
    pub wind_speed: u16,
    pub wind_dir: u16,
    pub wind_gust: u16,
    pub wind_gust_dir: u16,
    pub rain_rate: f32,
    /// Rain since the previous reading, inches
    pub sample_rain: f32,
    /// Evapotranspiration since the previous reading, inches
    pub sample_et: f32,
    pub radiation: u16,
    pub uv: f32,
    pub dewpoint: f32,
    pub windchill: f32,
    pub heatindex: f32,

    // Computed by the daemon
    pub storm_rain: f32,
    pub storm_start: i32,
    pub day_rain: f32,
    pub month_rain: f32,
    pub year_rain: f32,
    pub day_et: f32,
    pub month_et: f32,
    pub year_et: f32,
    pub interval_avg_wchill: f32,
    pub interval_avg_wspeed: u16,
    pub year_rain_month: u16,

    // Vantage Pro
    pub rx_check_percent: u16,
    pub ten_minute_avg_wind_speed: u16,
    pub forecast_icon: u16,
    pub forecast_rule: u16,
    pub tx_battery_status: u16,
    pub cons_battery_voltage: u16,
    pub extra_temp1: f32,
    pub extra_temp2: f32,
    pub extra_temp3: f32,
    pub soil_temp1: f32,
    pub soil_temp2: f32,
    pub soil_temp3: f32,
    pub soil_temp4: f32,
    pub leaf_temp1: f32,
    pub leaf_temp2: f32,
    pub extra_humid1: u8,
    pub extra_humid2: u8,
    pub soil_moist1: u8,
    pub soil_moist2: u8,
    pub leaf_wet1: u8,
    pub leaf_wet2: u8,

    // WXT510
    pub hail: f32,
    pub hail_rate: f32,
    pub heating_temp: f32,
    pub heating_voltage: f32,
    pub supply_voltage: f32,
    pub reference_voltage: f32,
    pub rain_duration: f32,
    pub rain_peak_rate: f32,
    pub hail_duration: f32,
    pub hail_peak_rate: f32,
    pub wxt_rain: f32,

    // WMR918
    pub pool_temp: f32,
    pub humid3: u8,
    pub tendency: u8,
    pub wind_battery: u8,
    pub rain_battery: u8,
    pub out_temp_battery: u8,
    pub in_temp_battery: u8,
    pub pool_battery: u8,
    pub extra1_battery: u8,
    pub extra2_battery: u8,
    pub extra3_battery: u8,

    // Generic extra sensors
    pub extra_temp: [f32; EXTRA_SENSOR_SLOTS],
    pub extra_humidity: [u16; EXTRA_SENSOR_SLOTS],
    pub wind_battery_status: u8,
    pub rain_battery_status: u8,
    pub out_temp_battery_status: u8,
    pub console_battery_status: u8,
    pub uv_battery_status: u8,
    pub solar_battery_status: u8,
    pub extra_temp_battery_status: [u8; EXTRA_SENSOR_SLOTS],
}

impl Reading {
    /// A reading with every optional field set to its "not present" value.
    ///
    /// Drivers start each poll from this so that sensors a station lacks
    /// never carry stale or zero data downstream.
    pub fn cleared() -> Self {
        Self {
            sample_et: ARCHIVE_VALUE_NULL,
            radiation: 0xFFFF,
            uv: -1.0,
            rx_check_percent: 0xFFFF,

            hail: ARCHIVE_VALUE_NULL,
            hail_rate: ARCHIVE_VALUE_NULL,
            heating_temp: ARCHIVE_VALUE_NULL,
            heating_voltage: ARCHIVE_VALUE_NULL,
            supply_voltage: ARCHIVE_VALUE_NULL,
            reference_voltage: ARCHIVE_VALUE_NULL,
            rain_duration: ARCHIVE_VALUE_NULL,
            rain_peak_rate: ARCHIVE_VALUE_NULL,
            hail_duration: ARCHIVE_VALUE_NULL,
            hail_peak_rate: ARCHIVE_VALUE_NULL,
            wxt_rain: ARCHIVE_VALUE_NULL,

            wind_battery: BATTERY_STATUS_UNKNOWN,
            rain_battery: BATTERY_STATUS_UNKNOWN,
            out_temp_battery: BATTERY_STATUS_UNKNOWN,
            in_temp_battery: BATTERY_STATUS_UNKNOWN,
            pool_battery: BATTERY_STATUS_UNKNOWN,
            extra1_battery: BATTERY_STATUS_UNKNOWN,
            extra2_battery: BATTERY_STATUS_UNKNOWN,
            extra3_battery: BATTERY_STATUS_UNKNOWN,

            ..Self::default()
        }
    }

    pub fn has_radiation(&self) -> bool {
        self.radiation != 0xFFFF
    }

    pub fn has_uv(&self) -> bool {
        self.uv >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleared_reading_marks_optional_sensors_absent() {
        let reading = Reading::cleared();
        assert!(!reading.has_radiation());
        assert!(!reading.has_uv());
        assert_eq!(reading.rx_check_percent, 0xFFFF);
        assert_eq!(reading.sample_et, ARCHIVE_VALUE_NULL);
        assert_eq!(reading.wind_battery, BATTERY_STATUS_UNKNOWN);
        assert_eq!(reading.out_temp, 0.0);
    }
}
