// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Console units to canonical records

use crate::config::{Calibration, CalibrationConfig};
use crate::records::{is_null, ArchiveRecord, Channel, Reading, ARCHIVE_VALUE_NULL};
use crate::station::calibrate_reading;
use crate::weather;

use super::archive_page::ConsoleRecord;
use super::loop_packet::LoopPacket;

/// Station properties the conversions depend on
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    pub elevation_ft: f32,
    pub rain_ticks_per_inch: f32,
    /// Mean outdoor temperature over the last 12 hours, °F
    pub temp_avg_12h: f32,
    pub interval: i32,
    pub calibration: &'a CalibrationConfig,
}

impl ConversionContext<'_> {
    /// Pressure derivation temperature; the current temperature stands in
    /// until the 12-hour window holds samples.
    fn pressure_temperature(&self, current: f32) -> f32 {
        if is_null(self.temp_avg_12h) {
            current
        } else {
            self.temp_avg_12h
        }
    }
}

/// Tracks a console day counter (rain or ET) to derive per-sample deltas
#[derive(Debug, Clone, Default)]
pub struct DayCounter {
    last: Option<u16>,
}

impl DayCounter {
    /// Delta since the previous sample; the first sample yields 0 and a
    /// counter that went backwards (midnight reset) yields the new value.
    pub fn sample(&mut self, counter: u16) -> u16 {
        if counter == 0xFFFF || counter == 0x7FFF {
            return 0;
        }
        let delta = match self.last {
            None => 0,
            Some(last) if counter >= last => counter - last,
            Some(_) => counter,
        };
        self.last = Some(counter);
        delta
    }
}

fn calibrated(value: f32, calibration: &Calibration) -> f32 {
    if is_null(value) {
        value
    } else {
        calibration.apply(value)
    }
}

fn extra_temp(raw: u8) -> f32 {
    raw as f32 - 90.0
}

fn optional_temp(raw: u8) -> f32 {
    if raw == 0xFF {
        ARCHIVE_VALUE_NULL
    } else {
        extra_temp(raw)
    }
}

fn optional_u8(raw: u8) -> f32 {
    if raw == 0xFF {
        ARCHIVE_VALUE_NULL
    } else {
        raw as f32
    }
}

/// Barometer (already calibrated) to station pressure and altimeter.
fn derive_pressures(barometer: f32, temp_f: f32, elevation_ft: f32) -> (f32, f32) {
    let station = weather::sea_level_to_station_pressure(barometer, elevation_ft, temp_f);
    let altimeter = weather::altimeter_from_station_pressure(station, elevation_ft);
    (station, altimeter)
}

/// Convert a LOOP packet into a reading.
///
/// The LOOP does not report reception quality, so the latest `RXCHECK`
/// result is passed in; rain and ET deltas come from the day counters.
pub fn reading_from_loop(
    packet: &LoopPacket,
    ctx: &ConversionContext<'_>,
    rain_counter: &mut DayCounter,
    et_counter: &mut DayCounter,
    rx_check_percent: u16,
) -> Reading {
    let mut reading = Reading::cleared();

    reading.sample_rain = rain_counter.sample(packet.day_rain) as f32 / ctx.rain_ticks_per_inch;
    reading.sample_et = et_counter.sample(packet.day_et) as f32 / 1000.0;
    reading.rx_check_percent = rx_check_percent;

    if packet.out_temp != 0x7FFF {
        reading.out_temp = packet.out_temp as f32 / 10.0;
    }

    if packet.barometer != 0xFFFF && packet.barometer != 0 {
        let barometer = ctx.calibration.barometer.apply(packet.barometer as f32 / 1000.0);
        let (station, altimeter) = derive_pressures(
            barometer,
            ctx.pressure_temperature(reading.out_temp),
            ctx.elevation_ft,
        );
        reading.barometer = barometer;
        reading.station_pressure = ctx.calibration.pressure.apply(station);
        reading.altimeter = ctx.calibration.altimeter.apply(altimeter);
    }

    if packet.in_temp != 0x7FFF {
        reading.in_temp = packet.in_temp as f32 / 10.0;
    }
    if packet.in_humidity != 0xFF {
        reading.in_humidity = packet.in_humidity as u16;
    }
    if packet.out_humidity != 0xFF {
        reading.out_humidity = packet.out_humidity as u16;
    }
    if packet.wind_speed != 0xFF {
        reading.wind_speed = packet.wind_speed as u16;
        reading.wind_gust = packet.wind_speed as u16;
    }
    if packet.wind_dir != 0xFFFF && packet.wind_dir != 0x7FFF {
        reading.wind_dir = packet.wind_dir;
        reading.wind_gust_dir = packet.wind_dir;
    }
    if packet.rain_rate != 0xFFFF && packet.rain_rate != 0x7FFF {
        reading.rain_rate = packet.rain_rate as f32 / ctx.rain_ticks_per_inch;
    }
    reading.uv = if packet.uv != 0xFF {
        packet.uv as f32 / 10.0
    } else {
        -1.0
    };
    reading.radiation =
        if packet.radiation != 0x7FFF && packet.radiation != 0xFFFF && packet.radiation <= 1800 {
            packet.radiation
        } else {
            0xFFFF
        };
    if packet.ten_minute_avg_wind_speed != 0xFF {
        reading.ten_minute_avg_wind_speed = packet.ten_minute_avg_wind_speed as u16;
    }

    reading.forecast_icon = packet.forecast_icon as u16;
    reading.forecast_rule = packet.forecast_rule as u16;
    reading.tx_battery_status = packet.tx_battery_status as u16;
    reading.cons_battery_voltage = packet.cons_battery_voltage;
    reading.extra_temp1 = extra_temp(packet.extra_temps[0]);
    reading.extra_temp2 = extra_temp(packet.extra_temps[1]);
    reading.extra_temp3 = extra_temp(packet.extra_temps[2]);
    reading.soil_temp1 = extra_temp(packet.soil_temps[0]);
    reading.soil_temp2 = extra_temp(packet.soil_temps[1]);
    reading.soil_temp3 = extra_temp(packet.soil_temps[2]);
    reading.soil_temp4 = extra_temp(packet.soil_temps[3]);
    reading.leaf_temp1 = extra_temp(packet.leaf_temps[0]);
    reading.leaf_temp2 = extra_temp(packet.leaf_temps[1]);
    reading.extra_humid1 = packet.extra_humidities[0];
    reading.extra_humid2 = packet.extra_humidities[1];
    reading.soil_moist1 = packet.soil_moistures[0];
    reading.soil_moist2 = packet.soil_moistures[1];
    if packet.leaf_wetnesses[0] != 0xFF {
        reading.leaf_wet1 = packet.leaf_wetnesses[0];
    }
    if packet.leaf_wetnesses[1] != 0xFF {
        reading.leaf_wet2 = packet.leaf_wetnesses[1];
    }

    reading.storm_rain = packet.storm_rain as f32 / 100.0;
    reading.day_rain = packet.day_rain as f32 / ctx.rain_ticks_per_inch;
    reading.month_rain = packet.month_rain as f32 / ctx.rain_ticks_per_inch;
    reading.year_rain = packet.year_rain as f32 / ctx.rain_ticks_per_inch;
    reading.day_et = packet.day_et as f32 / 1000.0;
    reading.month_et = packet.month_et as f32 / 100.0;
    reading.year_et = packet.year_et as f32 / 100.0;

    calibrate_reading(&mut reading, ctx.calibration);

    let humidity = reading.out_humidity as f32;
    reading.dewpoint = weather::dewpoint(reading.out_temp, humidity);
    reading.heatindex = weather::heat_index(reading.out_temp, humidity);
    reading.windchill = weather::wind_chill(reading.out_temp, reading.wind_speed as f32);
    reading
}

/// Convert a console archive record. Calibration is applied to the raw
/// quantities before the derived values are computed.
pub fn archive_from_console(
    raw: &ConsoleRecord,
    date_time: i32,
    ctx: &ConversionContext<'_>,
    last: &Reading,
) -> ArchiveRecord {
    let cal = ctx.calibration;
    let mut record = ArchiveRecord::new(date_time, ctx.interval);

    if -1500 < raw.out_temp && raw.out_temp < 1500 {
        record.set(Channel::OutTemp, cal.out_temp.apply(raw.out_temp as f32 / 10.0));
    }
    if 1000 < raw.barometer && raw.barometer < 40000 {
        let barometer = cal.barometer.apply(raw.barometer as f32 / 1000.0);
        let temperature = ctx.pressure_temperature(record.get(Channel::OutTemp));
        let (station, altimeter) = derive_pressures(barometer, temperature, ctx.elevation_ft);
        record.set(Channel::Barometer, barometer);
        record.set(Channel::Pressure, cal.pressure.apply(station));
        record.set(Channel::Altimeter, cal.altimeter.apply(altimeter));
    }
    if raw.in_temp < 2000 {
        record.set(Channel::InTemp, cal.in_temp.apply(raw.in_temp as f32 / 10.0));
    }
    if raw.in_humidity <= 100 {
        let value = cal.in_humidity.apply(raw.in_humidity as f32).clamp(0.0, 100.0);
        record.set(Channel::InHumidity, value.floor());
    }
    if raw.out_humidity <= 100 {
        let value = cal.out_humidity.apply(raw.out_humidity as f32).clamp(0.0, 100.0);
        record.set(Channel::OutHumidity, value.floor());
    }
    if raw.avg_wind_speed <= 250 {
        record.set(Channel::WindSpeed, cal.wind_speed.apply(raw.avg_wind_speed as f32).max(0.0));
    }
    if raw.prev_wind_dir < 16 {
        let direction = cal.wind_dir.apply(raw.prev_wind_dir as f32 * 22.5);
        record.set(Channel::WindDir, direction.rem_euclid(360.0));
    }
    if raw.high_wind_speed <= 250 {
        record.set(Channel::WindGust, cal.wind_speed.apply(raw.high_wind_speed as f32).max(0.0));
    }
    if raw.high_wind_dir < 16 {
        let direction = cal.wind_dir.apply(raw.high_wind_dir as f32 * 22.5);
        record.set(Channel::WindGustDir, direction.rem_euclid(360.0));
    }

    record.set(
        Channel::RainRate,
        calibrated(raw.high_rain_rate as f32 / ctx.rain_ticks_per_inch, &cal.rain_rate).max(0.0),
    );
    record.set(
        Channel::Rain,
        calibrated((raw.rain & 0x0FFF) as f32 / ctx.rain_ticks_per_inch, &cal.rain).max(0.0),
    );

    let out_temp = record.get(Channel::OutTemp);
    let out_humidity = record.get(Channel::OutHumidity);
    let wind_speed = record.get(Channel::WindSpeed);
    if !is_null(out_temp) && !is_null(out_humidity) {
        record.set(Channel::Dewpoint, weather::dewpoint(out_temp, out_humidity));
        record.set(Channel::Heatindex, weather::heat_index(out_temp, out_humidity));
    }
    if !is_null(out_temp) && !is_null(wind_speed) {
        record.set(Channel::Windchill, weather::wind_chill(out_temp, wind_speed));
    }

    if raw.et != 0xFF {
        record.set(Channel::Et, raw.et as f32 / 1000.0);
    }
    if raw.radiation != 0x7FFF && raw.radiation != 0xFFFF && raw.radiation <= 1800 {
        record.set(Channel::Radiation, raw.radiation as f32);
    }
    if raw.uv != 0xFF {
        record.set(Channel::Uv, raw.uv as f32 / 10.0);
    }

    record.set(Channel::ExtraTemp1, optional_temp(raw.extra_temps[0]));
    record.set(Channel::ExtraTemp2, optional_temp(raw.extra_temps[1]));
    record.set(Channel::ExtraTemp3, optional_temp(raw.extra_temps[2]));
    record.set(Channel::SoilTemp1, optional_temp(raw.soil_temps[0]));
    record.set(Channel::SoilTemp2, optional_temp(raw.soil_temps[1]));
    record.set(Channel::SoilTemp3, optional_temp(raw.soil_temps[2]));
    record.set(Channel::SoilTemp4, optional_temp(raw.soil_temps[3]));
    record.set(Channel::LeafTemp1, optional_temp(raw.leaf_temps[0]));
    record.set(Channel::LeafTemp2, optional_temp(raw.leaf_temps[1]));
    record.set(Channel::ExtraHumid1, optional_u8(raw.extra_humidities[0]));
    record.set(Channel::ExtraHumid2, optional_u8(raw.extra_humidities[1]));
    record.set(Channel::SoilMoist1, optional_u8(raw.soil_moistures[0]));
    record.set(Channel::SoilMoist2, optional_u8(raw.soil_moistures[1]));
    record.set(Channel::SoilMoist3, optional_u8(raw.soil_moistures[2]));
    record.set(Channel::SoilMoist4, optional_u8(raw.soil_moistures[3]));
    record.set(Channel::LeafWet1, optional_u8(raw.leaf_wetnesses[0]));
    record.set(Channel::LeafWet2, optional_u8(raw.leaf_wetnesses[1]));

    if last.rx_check_percent != 0xFFFF {
        record.set(Channel::RxCheckPercent, last.rx_check_percent as f32);
    }
    record.set(Channel::TxBatteryStatus, last.tx_battery_status as f32);
    record.set(Channel::ConsBatteryVoltage, last.cons_battery_voltage as f32);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn context(calibration: &CalibrationConfig) -> ConversionContext<'_> {
        ConversionContext {
            elevation_ft: 0.0,
            rain_ticks_per_inch: 100.0,
            temp_avg_12h: 60.0,
            interval: 5,
            calibration,
        }
    }

    #[test]
    fn test_day_counter_deltas() {
        let mut counter = DayCounter::default();
        assert_eq!(counter.sample(40), 0);
        assert_eq!(counter.sample(43), 3);
        assert_eq!(counter.sample(0xFFFF), 0);
        // midnight reset
        assert_eq!(counter.sample(2), 2);
        assert_eq!(counter.sample(2), 0);
    }

    #[test]
    fn test_loop_conversion() {
        let calibration = CalibrationConfig::default();
        let ctx = context(&calibration);
        let packet = LoopPacket {
            barometer: 30_012,
            out_temp: 725,
            in_temp: 701,
            out_humidity: 55,
            in_humidity: 40,
            wind_speed: 7,
            wind_dir: 270,
            uv: 34,
            radiation: 2000,
            day_rain: 10,
            extra_temps: [160, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            ..LoopPacket::default()
        };
        let mut rain = DayCounter::default();
        let mut et = DayCounter::default();
        let reading = reading_from_loop(&packet, &ctx, &mut rain, &mut et, 0xFFFF);

        assert_relative_eq!(reading.out_temp, 72.5);
        assert_relative_eq!(reading.barometer, 30.012, epsilon = 1e-4);
        assert_relative_eq!(reading.station_pressure, 30.012, epsilon = 1e-3);
        assert_eq!(reading.wind_gust, 7);
        assert_eq!(reading.wind_gust_dir, 270);
        assert_relative_eq!(reading.uv, 3.4);
        assert_eq!(reading.radiation, 0xFFFF);
        assert_eq!(reading.sample_rain, 0.0);
        assert_relative_eq!(reading.extra_temp1, 70.0);
        assert!(reading.dewpoint < reading.out_temp);

        let packet = LoopPacket {
            day_rain: 13,
            ..packet
        };
        let reading = reading_from_loop(&packet, &ctx, &mut rain, &mut et, 0xFFFF);
        assert_relative_eq!(reading.sample_rain, 0.03);
    }

    #[test]
    fn test_archive_conversion_limits() {
        let calibration = CalibrationConfig {
            out_temp: Calibration {
                multiplier: 1.0,
                constant: 1.0,
            },
            ..CalibrationConfig::default()
        };
        let ctx = context(&calibration);

        let mut raw = ConsoleRecord::blank();
        raw.date = 0;
        raw.time = 0;
        raw.out_temp = 655;
        raw.barometer = 29_921;
        raw.in_temp = 700;
        raw.out_humidity = 80;
        raw.avg_wind_speed = 5;
        raw.prev_wind_dir = 4;
        raw.high_wind_speed = 12;
        raw.high_wind_dir = 16;
        raw.rain = 0x1000 | 25;
        raw.high_rain_rate = 150;
        raw.et = 12;
        raw.extra_temps = [0xFF, 100, 0xFF];

        let mut last = Reading::cleared();
        last.tx_battery_status = 1;
        let record = archive_from_console(&raw, 1_700_000_000, &ctx, &last);

        assert_relative_eq!(record.get(Channel::OutTemp), 66.5);
        assert_relative_eq!(record.get(Channel::Barometer), 29.921, epsilon = 1e-4);
        assert_relative_eq!(record.get(Channel::WindDir), 90.0);
        assert!(record.value(Channel::WindGustDir).is_none());
        assert_relative_eq!(record.get(Channel::Rain), 0.25);
        assert_relative_eq!(record.get(Channel::RainRate), 1.5);
        assert_relative_eq!(record.get(Channel::Et), 0.012);
        assert!(record.value(Channel::InHumidity).is_none());
        assert!(record.value(Channel::ExtraTemp1).is_none());
        assert_relative_eq!(record.get(Channel::ExtraTemp2), 10.0);
        assert!(record.value(Channel::RxCheckPercent).is_none());
        assert_relative_eq!(record.get(Channel::TxBatteryStatus), 1.0);
        assert!(record.value(Channel::Windchill).is_some());
    }
}
