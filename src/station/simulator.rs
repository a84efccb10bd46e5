// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated station
//!
//! Produces smooth synthetic weather without hardware: a diurnal
//! temperature and humidity cycle, a slow barometric swell, gusty wind and
//! periodic showers. It never generates archive records; the daemon builds
//! them from the readings.

use std::f32::consts::PI;

use async_trait::async_trait;
use chrono::{Local, Timelike};
use log::{debug, info};
use tokio::time::Instant;

use crate::accumulator::SlidingWindowAccumulator;
use crate::config::{CalibrationConfig, StationConfig};
use crate::records::Reading;
use crate::weather;

use super::{
    calibrate_reading, StationContext, StationDriver, StationError, StationEvent, StationPosition,
};

/// Rain rate is the rain of the last 15 minutes scaled to an hour.
const RAIN_RATE_WINDOW_SECS: i64 = 900;

/// Period of the shower cycle.
const SHOWER_PERIOD_SECS: f32 = 6.0 * 3600.0;

/// Rain per reading while a shower is on, inches.
const SHOWER_SAMPLE_RAIN: f32 = 0.01;

pub struct SimulatorStation {
    calibration: CalibrationConfig,
    position: StationPosition,
    context: StationContext,
    rain_window: SlidingWindowAccumulator,
    day_rain: f32,
    last_midnight: Option<i64>,
    station_up: bool,
}

fn cycle(seconds: f32, period: f32, phase: f32) -> f32 {
    (2.0 * PI * seconds / period + phase).sin()
}

impl SimulatorStation {
    pub fn new(
        config: &StationConfig,
        calibration: &CalibrationConfig,
        context: StationContext,
    ) -> Self {
        Self {
            calibration: calibration.clone(),
            position: StationPosition::from_config(config),
            context,
            rain_window: SlidingWindowAccumulator::new(RAIN_RATE_WINDOW_SECS),
            day_rain: 0.0,
            last_midnight: None,
            station_up: false,
        }
    }

    /// Conditions at `timestamp`; `seconds_of_day` is local time.
    pub fn synthesize(&mut self, timestamp: i64, seconds_of_day: u32) -> Reading {
        let t = timestamp as f32;
        let day = seconds_of_day as f32;
        let mut reading = Reading::cleared();

        // Coolest before dawn, warmest mid-afternoon
        let diurnal = cycle(day, 86_400.0, -PI * 0.75);
        reading.out_temp = 60.0 + 12.0 * diurnal;
        reading.in_temp = 70.0 + 1.5 * diurnal;
        reading.out_humidity = (65.0 - 20.0 * diurnal).round() as u16;
        reading.in_humidity = 40;

        reading.barometer = 29.92 + 0.25 * cycle(t, 3.0 * 86_400.0, 0.0);
        reading.station_pressure = weather::sea_level_to_station_pressure(
            reading.barometer,
            self.position.elevation,
            reading.out_temp,
        );
        reading.altimeter =
            weather::altimeter_from_station_pressure(reading.station_pressure, self.position.elevation);

        let wind = 6.0 + 4.0 * cycle(t, 1800.0, 0.0);
        reading.wind_speed = wind.max(0.0).round() as u16;
        reading.wind_gust = (wind * 1.5).max(0.0).round() as u16;
        reading.wind_dir = (225.0 + 60.0 * cycle(t, 7200.0, 1.0)).round() as u16 % 360;
        reading.wind_gust_dir = reading.wind_dir;
        reading.ten_minute_avg_wind_speed = 6;

        let daylight = cycle(day, 86_400.0, -PI / 2.0).max(0.0);
        reading.radiation = (950.0 * daylight).round() as u16;
        reading.uv = (8.0 * daylight * 10.0).round() / 10.0;

        let showering = cycle(t, SHOWER_PERIOD_SECS, 0.0) > 0.85;
        reading.sample_rain = if showering { SHOWER_SAMPLE_RAIN } else { 0.0 };
        self.rain_window.add_sample(timestamp, reading.sample_rain);
        reading.rain_rate = self.rain_window.total_at(timestamp) * 3600.0 / RAIN_RATE_WINDOW_SECS as f32;
        reading.sample_et = 0.0;

        calibrate_reading(&mut reading, &self.calibration);

        let midnight = timestamp - seconds_of_day as i64;
        if self.last_midnight.is_some_and(|m| m != midnight) {
            self.day_rain = 0.0;
        }
        self.last_midnight = Some(midnight);
        self.day_rain += reading.sample_rain;
        reading.day_rain = self.day_rain;

        let humidity = reading.out_humidity as f32;
        reading.dewpoint = weather::dewpoint(reading.out_temp, humidity);
        reading.heatindex = weather::heat_index(reading.out_temp, humidity);
        reading.windchill = weather::wind_chill(reading.out_temp, reading.wind_speed as f32);
        reading.forecast_icon = if showering { 2 } else { 8 };
        reading.cons_battery_voltage = 765;
        reading
    }

    fn current(&mut self) -> Reading {
        let now = Local::now();
        self.synthesize(now.timestamp(), now.num_seconds_from_midnight())
    }
}

#[async_trait]
impl StationDriver for SimulatorStation {
    fn name(&self) -> &'static str {
        "simulator"
    }

    async fn init(&mut self) -> Result<(), StationError> {
        let reading = self.current();
        self.station_up = true;
        info!(
            "Simulated station up at lat {:.2} long {:.2}",
            self.position.latitude, self.position.longitude
        );
        self.context.emit(StationEvent::InitComplete {
            success: true,
            reading: Some(Box::new(reading)),
        });
        Ok(())
    }

    async fn get_readings(&mut self) -> Result<(), StationError> {
        let reading = self.current();
        debug!("Simulated reading: {:.1}F {}%", reading.out_temp, reading.out_humidity);
        self.context.emit(StationEvent::LoopComplete(Box::new(reading)));
        Ok(())
    }

    async fn get_archive(&mut self) -> Result<(), StationError> {
        self.context.emit(StationEvent::Archive(None));
        Ok(())
    }

    async fn data_indicate(&mut self) -> Result<(), StationError> {
        Ok(())
    }

    async fn if_timer_expiry(&mut self) -> Result<(), StationError> {
        Ok(())
    }

    fn generates_archives(&self) -> bool {
        false
    }

    async fn wait_readable(&mut self) -> Result<(), StationError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn timer_deadline(&self) -> Option<Instant> {
        None
    }

    fn position(&self) -> StationPosition {
        self.position
    }

    async fn shutdown(&mut self) {
        self.station_up = false;
        debug!("Simulated station stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryArchiveStore;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn simulator() -> (SimulatorStation, tokio::sync::mpsc::UnboundedReceiver<StationEvent>) {
        let (context, events) = StationContext::channel(
            Arc::new(MemoryArchiveStore::new()),
            Arc::new(AtomicBool::new(true)),
        );
        let station = SimulatorStation::new(
            &StationConfig::default(),
            &CalibrationConfig::default(),
            context,
        );
        (station, events)
    }

    #[test]
    fn test_diurnal_cycle() {
        let (mut station, _events) = simulator();
        let dawn = station.synthesize(1_700_000_000, 5 * 3600);
        let afternoon = station.synthesize(1_700_000_060, 15 * 3600);
        assert!(afternoon.out_temp > dawn.out_temp);
        assert!(afternoon.out_humidity < dawn.out_humidity);
        assert_eq!(dawn.radiation, 0);
        assert!(afternoon.radiation > 0);
        assert!(afternoon.dewpoint <= afternoon.out_temp);
        assert!(afternoon.wind_dir < 360);
    }

    #[test]
    fn test_rain_rate_follows_window() {
        let (mut station, _events) = simulator();
        // Peak of the shower cycle
        let peak = (SHOWER_PERIOD_SECS / 4.0) as i64;
        let first = station.synthesize(peak, 43_200);
        assert_eq!(first.sample_rain, SHOWER_SAMPLE_RAIN);
        let second = station.synthesize(peak + 60, 43_260);
        approx::assert_relative_eq!(second.rain_rate, 2.0 * SHOWER_SAMPLE_RAIN * 4.0, epsilon = 1e-5);
        approx::assert_relative_eq!(second.day_rain, 2.0 * SHOWER_SAMPLE_RAIN, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_events() {
        let (mut station, mut events) = simulator();
        station.init().await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(StationEvent::InitComplete { success: true, reading: Some(_) })
        ));
        station.get_archive().await.unwrap();
        assert_eq!(events.recv().await, Some(StationEvent::Archive(None)));
        station.get_readings().await.unwrap();
        assert!(matches!(events.recv().await, Some(StationEvent::LoopComplete(_))));
        assert!(!station.generates_archives());
    }
}
