// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Values the daemon derives from the stream of readings: rain and ET
//! totals for the day, month and year, the current storm, and interval
//! averages of wind speed and wind chill.

use chrono::{DateTime, Datelike, Local};

use crate::accumulator::SlidingWindowAccumulator;
use crate::records::{is_null, Reading};

/// Rain rate that opens a storm, inches per hour.
pub const STORM_TRIGGER_RATE: f32 = 0.05;

/// Hours without rain that close a storm.
pub const STORM_IDLE_HOURS: i64 = 12;

/// Tracks the rain event in progress
#[derive(Debug, Clone, Default)]
pub struct StormTracker {
    start: Option<i64>,
    rain: f32,
    last_rain: i64,
}

impl StormTracker {
    pub fn update(&mut self, now: i64, sample_rain: f32, rain_rate: f32) {
        if self.start.is_none() {
            if rain_rate >= STORM_TRIGGER_RATE {
                self.start = Some(now);
                self.rain = sample_rain.max(0.0);
                self.last_rain = now;
            }
            return;
        }

        if sample_rain > 0.0 {
            self.rain += sample_rain;
            self.last_rain = now;
        } else if now - self.last_rain >= STORM_IDLE_HOURS * 3600 {
            self.start = None;
            self.rain = 0.0;
        }
    }

    /// Unix time the storm began, if one is in progress.
    pub fn start(&self) -> Option<i64> {
        self.start
    }

    pub fn rain(&self) -> f32 {
        self.rain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Day {
    year: i32,
    month: u32,
    day: u32,
}

impl Day {
    fn of(now: &DateTime<Local>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
            day: now.day(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    day: f32,
    month: f32,
    year: f32,
}

impl Totals {
    fn add(&mut self, value: f32) {
        if !is_null(value) && value > 0.0 {
            self.day += value;
            self.month += value;
            self.year += value;
        }
    }

    fn roll(&mut self, previous: Day, current: Day) {
        if previous.year != current.year {
            *self = Totals::default();
        } else if previous.month != current.month {
            self.day = 0.0;
            self.month = 0.0;
        } else if previous.day != current.day {
            self.day = 0.0;
        }
    }
}

/// Running state behind the computed reading fields
#[derive(Debug, Clone)]
pub struct ComputedData {
    rain: Totals,
    et: Totals,
    last_day: Option<Day>,
    storm: StormTracker,
    wind_speed: SlidingWindowAccumulator,
    wind_chill: SlidingWindowAccumulator,
}

impl ComputedData {
    pub fn new(archive_interval_minutes: u32) -> Self {
        let window = archive_interval_minutes.max(1) as i64 * 60;
        Self {
            rain: Totals::default(),
            et: Totals::default(),
            last_day: None,
            storm: StormTracker::default(),
            wind_speed: SlidingWindowAccumulator::new(window),
            wind_chill: SlidingWindowAccumulator::new(window),
        }
    }

    /// Fill the computed fields of `reading` taken at `now`.
    pub fn apply(&mut self, reading: &mut Reading, now: &DateTime<Local>) {
        let today = Day::of(now);
        if let Some(previous) = self.last_day {
            self.rain.roll(previous, today);
            self.et.roll(previous, today);
        }
        self.last_day = Some(today);

        self.rain.add(reading.sample_rain);
        self.et.add(reading.sample_et);
        reading.day_rain = self.rain.day;
        reading.month_rain = self.rain.month;
        reading.year_rain = self.rain.year;
        reading.day_et = self.et.day;
        reading.month_et = self.et.month;
        reading.year_et = self.et.year;
        reading.year_rain_month = 1;

        let timestamp = now.timestamp();
        self.storm
            .update(timestamp, reading.sample_rain.max(0.0), reading.rain_rate);
        reading.storm_rain = self.storm.rain();
        reading.storm_start = self.storm.start().map_or(0, |t| t as i32);

        self.wind_speed
            .add_sample(timestamp, reading.wind_speed as f32);
        reading.interval_avg_wspeed = self.wind_speed.average().round() as u16;
        if !is_null(reading.windchill) {
            self.wind_chill.add_sample(timestamp, reading.windchill);
        }
        reading.interval_avg_wchill = if self.wind_chill.is_empty() {
            reading.windchill
        } else {
            self.wind_chill.average()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    #[test]
    fn test_storm_lifecycle() {
        let mut storm = StormTracker::default();
        storm.update(0, 0.01, 0.02);
        assert!(storm.start().is_none());

        storm.update(60, 0.02, 0.10);
        assert_eq!(storm.start(), Some(60));
        storm.update(120, 0.03, 0.20);
        assert_relative_eq!(storm.rain(), 0.05);

        storm.update(120 + 11 * 3600, 0.0, 0.0);
        assert!(storm.start().is_some());
        storm.update(120 + 12 * 3600, 0.0, 0.0);
        assert!(storm.start().is_none());
        assert_eq!(storm.rain(), 0.0);
    }

    #[test]
    fn test_totals_roll_over_at_midnight() {
        let mut computed = ComputedData::new(5);
        let evening = Local.with_ymd_and_hms(2024, 5, 31, 23, 50, 0).unwrap();
        let morning = Local.with_ymd_and_hms(2024, 6, 1, 0, 5, 0).unwrap();

        let mut reading = Reading::cleared();
        reading.sample_rain = 0.1;
        reading.sample_et = 0.0;
        computed.apply(&mut reading, &evening);
        assert_relative_eq!(reading.day_rain, 0.1);

        computed.apply(&mut reading, &morning);
        assert_relative_eq!(reading.day_rain, 0.1);
        assert_relative_eq!(reading.month_rain, 0.1);
        assert_relative_eq!(reading.year_rain, 0.2);
    }
}
