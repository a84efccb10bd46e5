// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Archive records for stations without a data logger
//!
//! Readings taken during an archive interval are summarised into one
//! record at the interval boundary: means for the continuous quantities,
//! a vector mean for the wind direction, the strongest gust, and sums for
//! rain and ET.

use crate::records::{is_null, ArchiveRecord, Channel, Reading};
use crate::weather;

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: f32) {
        if !is_null(value) {
            self.sum += value as f64;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    interval: i32,
    samples: u32,
    barometer: Mean,
    pressure: Mean,
    altimeter: Mean,
    in_temp: Mean,
    out_temp: Mean,
    in_humidity: Mean,
    out_humidity: Mean,
    wind_speed: Mean,
    wind_x: f64,
    wind_y: f64,
    gust: Option<(u16, u16)>,
    rain: f32,
    rain_rate: f32,
    et: f32,
    radiation: Mean,
    uv: Mean,
    rx_check: Mean,
}

impl ArchiveBuilder {
    pub fn new(interval_minutes: i32) -> Self {
        Self {
            interval: interval_minutes,
            ..Self::default()
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn add(&mut self, reading: &Reading) {
        self.samples += 1;
        self.barometer.add(reading.barometer);
        self.pressure.add(reading.station_pressure);
        self.altimeter.add(reading.altimeter);
        self.in_temp.add(reading.in_temp);
        self.out_temp.add(reading.out_temp);
        self.in_humidity.add(reading.in_humidity as f32);
        self.out_humidity.add(reading.out_humidity as f32);
        self.wind_speed.add(reading.wind_speed as f32);

        if reading.wind_speed > 0 {
            let radians = (reading.wind_dir as f64).to_radians();
            self.wind_x += reading.wind_speed as f64 * radians.sin();
            self.wind_y += reading.wind_speed as f64 * radians.cos();
        }
        if self.gust.map_or(true, |(speed, _)| reading.wind_gust > speed) {
            self.gust = Some((reading.wind_gust, reading.wind_gust_dir));
        }

        if !is_null(reading.sample_rain) {
            self.rain += reading.sample_rain.max(0.0);
        }
        if !is_null(reading.rain_rate) {
            self.rain_rate = self.rain_rate.max(reading.rain_rate);
        }
        if !is_null(reading.sample_et) {
            self.et += reading.sample_et.max(0.0);
        }
        if reading.has_radiation() {
            self.radiation.add(reading.radiation as f32);
        }
        if reading.has_uv() {
            self.uv.add(reading.uv);
        }
        if reading.rx_check_percent != 0xFFFF {
            self.rx_check.add(reading.rx_check_percent as f32);
        }
    }

    /// Summarise the interval ending at `date_time` and start a new one.
    /// `None` when no reading arrived during the interval.
    pub fn finish(&mut self, date_time: i32) -> Option<ArchiveRecord> {
        if self.samples == 0 {
            return None;
        }
        let mut record = ArchiveRecord::new(date_time, self.interval);
        let mut set = |channel: Channel, value: Option<f32>| {
            if let Some(value) = value {
                record.set(channel, value);
            }
        };

        set(Channel::Barometer, self.barometer.value());
        set(Channel::Pressure, self.pressure.value());
        set(Channel::Altimeter, self.altimeter.value());
        set(Channel::InTemp, self.in_temp.value());
        set(Channel::OutTemp, self.out_temp.value());
        set(Channel::InHumidity, self.in_humidity.value().map(f32::round));
        set(Channel::OutHumidity, self.out_humidity.value().map(f32::round));
        set(Channel::WindSpeed, self.wind_speed.value());
        if self.wind_x != 0.0 || self.wind_y != 0.0 {
            let direction = self.wind_x.atan2(self.wind_y).to_degrees().rem_euclid(360.0);
            set(Channel::WindDir, Some(direction.round() as f32));
        }
        if let Some((speed, direction)) = self.gust {
            set(Channel::WindGust, Some(speed as f32));
            set(Channel::WindGustDir, Some(direction as f32));
        }
        set(Channel::Rain, Some(self.rain));
        set(Channel::RainRate, Some(self.rain_rate));
        set(Channel::Et, Some(self.et));
        set(Channel::Radiation, self.radiation.value());
        set(Channel::Uv, self.uv.value());
        set(Channel::RxCheckPercent, self.rx_check.value());

        if let (Some(temp), Some(humidity)) = (self.out_temp.value(), self.out_humidity.value()) {
            set(Channel::Dewpoint, Some(weather::dewpoint(temp, humidity)));
            set(Channel::Heatindex, Some(weather::heat_index(temp, humidity)));
        }
        if let (Some(temp), Some(speed)) = (self.out_temp.value(), self.wind_speed.value()) {
            set(Channel::Windchill, Some(weather::wind_chill(temp, speed)));
        }

        *self = Self::new(self.interval);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reading(temp: f32, speed: u16, dir: u16, rain: f32) -> Reading {
        let mut reading = Reading::cleared();
        reading.out_temp = temp;
        reading.out_humidity = 50;
        reading.wind_speed = speed;
        reading.wind_dir = dir;
        reading.wind_gust = speed + 2;
        reading.wind_gust_dir = dir;
        reading.sample_rain = rain;
        reading.sample_et = 0.0;
        reading
    }

    #[test]
    fn test_interval_summary() {
        let mut builder = ArchiveBuilder::new(5);
        assert!(builder.finish(300).is_none());

        builder.add(&reading(60.0, 4, 350, 0.01));
        builder.add(&reading(62.0, 6, 10, 0.02));
        let record = builder.finish(600).unwrap();

        assert_eq!(record.date_time, 600);
        assert_eq!(record.interval, 5);
        assert_relative_eq!(record.get(Channel::OutTemp), 61.0);
        assert_relative_eq!(record.get(Channel::Rain), 0.03, epsilon = 1e-6);
        assert_relative_eq!(record.get(Channel::WindGust), 8.0);
        // Across north, not 180
        let direction = record.get(Channel::WindDir);
        assert!(direction < 10.0 || direction > 350.0);
        assert!(record.value(Channel::Radiation).is_none());

        assert_eq!(builder.samples(), 0);
    }
}
