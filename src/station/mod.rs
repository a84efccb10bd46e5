// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Station drivers
//!
//! Every supported station implements [`StationDriver`]. The daemon owns a
//! single driver and stimulates it from its event loop:
//! - `get_readings` / `get_archive` when its poll and archive timers fire
//! - `data_indicate` when the transport has input
//! - `if_timer_expiry` when the driver's private [`InterfaceTimer`] expires
//!
//! Drivers answer asynchronously by sending [`StationEvent`]s on the
//! channel held by their [`StationContext`].
//!
//! Available drivers:
//! - [`vantage::VantageDriver`]: Davis Vantage Pro consoles
//! - [`virtual_station::VirtualStation`]: another daemon's datafeed
//! - [`simulator::SimulatorStation`]: synthetic data, no hardware

pub mod simulator;
pub mod timer;
pub mod vantage;
pub mod virtual_station;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::codec::CodecError;
use crate::config::{CalibrationConfig, MediumKind, StationConfig, StationType};
use crate::records::{is_null, ArchiveRecord, Reading};
use crate::storage::{ArchiveStore, StorageError};
use crate::transport::{create_medium, Medium, TransportError};

pub use simulator::SimulatorStation;
pub use timer::InterfaceTimer;
pub use vantage::{VantageDriver, VantageEmulator};
pub use virtual_station::VirtualStation;

/// Errors raised by station drivers
#[derive(Error, Debug)]
pub enum StationError {
    #[error(
        "archive interval mismatch: configured {configured} min, persisted records use {persisted} min"
    )]
    IntervalMismatch { configured: i32, persisted: i32 },

    #[error("archive interval mismatch: configured {configured} min, console uses {console} min")]
    ConsoleIntervalMismatch { configured: i32, console: i32 },

    #[error("checksum error in {0}")]
    Checksum(&'static str),

    #[error("unexpected response to {command}: {detail}")]
    UnexpectedResponse { command: String, detail: String },

    #[error("console did not wake up after {attempts} attempts")]
    WakeupFailed { attempts: u32 },

    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("wire format error: {0}")]
    Codec(#[from] CodecError),

    #[error("archive store error: {0}")]
    Storage(#[from] StorageError),
}

impl StationError {
    pub(crate) fn unexpected(command: &str, detail: impl Into<String>) -> Self {
        StationError::UnexpectedResponse {
            command: command.to_string(),
            detail: detail.into(),
        }
    }
}

/// Asynchronous results raised by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum StationEvent {
    /// Start-up finished; carries the first reading on success.
    InitComplete {
        success: bool,
        reading: Option<Box<Reading>>,
    },
    /// A `get_readings` request completed.
    LoopComplete(Box<Reading>),
    /// A new archive record, or `None` when no record is available.
    Archive(Option<Box<ArchiveRecord>>),
}

/// Geographic position reported by or configured for the station
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StationPosition {
    /// Degrees, north positive
    pub latitude: f32,
    /// Degrees, east positive
    pub longitude: f32,
    /// Feet
    pub elevation: f32,
}

impl StationPosition {
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            latitude: config.latitude,
            longitude: config.longitude,
            elevation: config.elevation,
        }
    }
}

/// What a driver shares with the daemon
#[derive(Clone)]
pub struct StationContext {
    events: mpsc::UnboundedSender<StationEvent>,
    archive: Arc<dyn ArchiveStore>,
    running: Arc<AtomicBool>,
}

impl StationContext {
    pub fn new(
        events: mpsc::UnboundedSender<StationEvent>,
        archive: Arc<dyn ArchiveStore>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            events,
            archive,
            running,
        }
    }

    /// Context plus the receiving end of its event channel.
    pub fn channel(
        archive: Arc<dyn ArchiveStore>,
        running: Arc<AtomicBool>,
    ) -> (Self, mpsc::UnboundedReceiver<StationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, archive, running), rx)
    }

    pub fn emit(&self, event: StationEvent) {
        if self.events.send(event).is_err() {
            debug!("Station event dropped, no receiver");
        }
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Timestamp of the newest persisted archive record.
    pub fn newest_archive_time(&self) -> Result<Option<i32>, StationError> {
        Ok(self.archive.newest()?.map(|r| r.date_time))
    }
}

/// The contract every station driver implements
#[async_trait]
pub trait StationDriver: Send {
    /// Short driver name for logs.
    fn name(&self) -> &'static str;

    /// Open the transport and start the station. Completion is signalled
    /// with [`StationEvent::InitComplete`].
    async fn init(&mut self) -> Result<(), StationError>;

    /// Request current conditions; answered with [`StationEvent::LoopComplete`].
    async fn get_readings(&mut self) -> Result<(), StationError>;

    /// Request new archive records; answered with [`StationEvent::Archive`].
    async fn get_archive(&mut self) -> Result<(), StationError>;

    /// The transport has input.
    async fn data_indicate(&mut self) -> Result<(), StationError>;

    /// The interface timer expired.
    async fn if_timer_expiry(&mut self) -> Result<(), StationError>;

    /// `true` if the station produces its own archive records.
    fn generates_archives(&self) -> bool;

    /// Resolve when the transport has input. Never resolves for drivers
    /// without a transport.
    async fn wait_readable(&mut self) -> Result<(), StationError>;

    /// Deadline of the interface timer, if armed.
    fn timer_deadline(&self) -> Option<Instant>;

    /// Request a station clock synchronisation.
    async fn sync_time(&mut self) -> Result<(), StationError> {
        Ok(())
    }

    fn position(&self) -> StationPosition;

    /// `true` once the driver has given up on the station.
    fn is_failed(&self) -> bool {
        false
    }

    async fn shutdown(&mut self);
}

/// Refuse to mix archive intervals in one dataset.
pub fn verify_archive_interval(
    store: &dyn ArchiveStore,
    configured: i32,
) -> Result<(), StationError> {
    match store.newest()? {
        Some(newest) if newest.interval != configured => Err(StationError::IntervalMismatch {
            configured,
            persisted: newest.interval,
        }),
        _ => Ok(()),
    }
}

/// Apply the per-quantity corrections that do not feed derived pressures.
pub fn calibrate_reading(reading: &mut Reading, calibration: &CalibrationConfig) {
    let apply = |value: f32, cal: &crate::config::Calibration| {
        if is_null(value) {
            value
        } else {
            cal.apply(value)
        }
    };

    reading.in_temp = apply(reading.in_temp, &calibration.in_temp);
    reading.out_temp = apply(reading.out_temp, &calibration.out_temp);
    reading.in_humidity = clamp_humidity(calibration.in_humidity.apply(reading.in_humidity as f32));
    reading.out_humidity =
        clamp_humidity(calibration.out_humidity.apply(reading.out_humidity as f32));
    reading.wind_speed = calibration.wind_speed.apply(reading.wind_speed as f32).max(0.0) as u16;
    reading.wind_gust = calibration.wind_speed.apply(reading.wind_gust as f32).max(0.0) as u16;
    reading.wind_dir = wrap_direction(calibration.wind_dir.apply(reading.wind_dir as f32));
    reading.wind_gust_dir = wrap_direction(calibration.wind_dir.apply(reading.wind_gust_dir as f32));
    reading.rain_rate = apply(reading.rain_rate, &calibration.rain_rate).max(0.0);
    reading.sample_rain = apply(reading.sample_rain, &calibration.rain).max(0.0);
}

fn clamp_humidity(value: f32) -> u16 {
    value.clamp(0.0, 100.0) as u16
}

fn wrap_direction(value: f32) -> u16 {
    (value.round() as i32).rem_euclid(360) as u16
}

/// Build the driver selected by the configuration.
///
/// A Vantage Pro configured with the mock medium talks to the built-in
/// console emulator.
pub fn create_station_driver(
    config: &StationConfig,
    calibration: &CalibrationConfig,
    context: StationContext,
) -> Result<Box<dyn StationDriver>> {
    match config.station_type {
        StationType::VantagePro => {
            let medium: Box<dyn Medium> = match config.medium.kind {
                MediumKind::Mock => Box::new(
                    VantageEmulator::new(config.archive_interval as u8)
                        .with_live_history()
                        .into_medium(),
                ),
                _ => create_medium(&config.medium, context.running())?,
            };
            Ok(Box::new(VantageDriver::new(
                config,
                calibration,
                medium,
                context,
            )))
        }
        StationType::Virtual => {
            let medium = create_medium(&config.medium, context.running())?;
            Ok(Box::new(VirtualStation::new(config, medium, context)))
        }
        StationType::Simulator => Ok(Box::new(SimulatorStation::new(
            config,
            calibration,
            context,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Calibration;
    use crate::storage::MockArchiveStore;

    #[test]
    fn test_interval_verification() {
        let mut store = MockArchiveStore::new();
        store
            .expect_newest()
            .returning(|| Ok(Some(ArchiveRecord::new(1_700_000_000, 10))));

        assert!(matches!(
            verify_archive_interval(&store, 5),
            Err(StationError::IntervalMismatch {
                configured: 5,
                persisted: 10
            })
        ));
        assert!(verify_archive_interval(&store, 10).is_ok());
    }

    #[test]
    fn test_empty_store_accepts_any_interval() {
        let mut store = MockArchiveStore::new();
        store.expect_newest().returning(|| Ok(None));
        assert!(verify_archive_interval(&store, 30).is_ok());
    }

    #[test]
    fn test_calibration_wraps_direction_and_clamps_humidity() {
        let calibration = CalibrationConfig {
            wind_dir: Calibration {
                multiplier: 1.0,
                constant: 20.0,
            },
            out_humidity: Calibration {
                multiplier: 1.1,
                constant: 0.0,
            },
            ..CalibrationConfig::default()
        };
        let mut reading = Reading::cleared();
        reading.wind_dir = 350;
        reading.out_humidity = 98;
        calibrate_reading(&mut reading, &calibration);
        assert_eq!(reading.wind_dir, 10);
        assert_eq!(reading.out_humidity, 100);
    }
}
