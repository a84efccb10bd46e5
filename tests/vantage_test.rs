// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use rust_weather_station::config::{CalibrationConfig, MediumKind, StationConfig, StationType};
use rust_weather_station::records::ArchiveRecord;
use rust_weather_station::station::vantage::emulator::sample_record;
use rust_weather_station::station::vantage::protocol::CANCEL;
use rust_weather_station::station::vantage::{VantageEmulator, VantageState};
use rust_weather_station::station::{
    StationContext, StationDriver, StationError, StationEvent, VantageDriver,
};
use rust_weather_station::storage::{ArchiveStore, MemoryArchiveStore};
use rust_weather_station::transport::MockLog;
use tokio::sync::mpsc::UnboundedReceiver;

fn station_config(interval: u32) -> StationConfig {
    let mut config = StationConfig {
        station_type: StationType::VantagePro,
        archive_interval: interval,
        ..StationConfig::default()
    };
    config.medium.kind = MediumKind::Mock;
    config.vantage.avoid_minute_boundary = false;
    config.vantage.initial_wakeup_tries = 2;
    config.vantage.wakeup_retry_delay_ms = 1;
    config.vantage.read_recover_interval_ms = 10;
    config
}

/// The last `count` interval boundaries before now, oldest first.
fn recent_boundaries(count: i64, interval: i64) -> Vec<NaiveDateTime> {
    let now = Local::now().naive_local();
    let minute = now.minute() as i64;
    let last = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap()
        - Duration::minutes(minute % interval);
    (1..=count)
        .rev()
        .map(|k| last - Duration::minutes(k * interval))
        .collect()
}

struct Harness {
    driver: VantageDriver,
    events: UnboundedReceiver<StationEvent>,
    log: MockLog,
}

fn harness(config: &StationConfig, emulator: VantageEmulator, store: Arc<dyn ArchiveStore>) -> Harness {
    let medium = emulator.into_medium();
    let log = medium.log();
    let (context, events) = StationContext::channel(store, Arc::new(AtomicBool::new(true)));
    let driver = VantageDriver::new(config, &CalibrationConfig::default(), Box::new(medium), context);
    Harness {
        driver,
        events,
        log,
    }
}

impl Harness {
    /// Feed input to the driver until it reaches `state`.
    async fn pump_until(&mut self, state: VantageState) -> Result<()> {
        for _ in 0..64 {
            if self.driver.state() == state {
                return Ok(());
            }
            self.driver.wait_readable().await?;
            self.driver.data_indicate().await?;
        }
        anyhow::bail!("driver stuck in {:?}", self.driver.state())
    }

    fn drain(&mut self) -> Vec<StationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn archived(events: &[StationEvent]) -> Vec<ArchiveRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            StationEvent::Archive(Some(record)) => Some((**record).clone()),
            _ => None,
        })
        .collect()
}

fn init_result(events: &[StationEvent]) -> Option<bool> {
    events.iter().find_map(|event| match event {
        StationEvent::InitComplete { success, .. } => Some(*success),
        _ => None,
    })
}

#[tokio::test]
async fn test_startup_downloads_archive_then_reads_loop() -> Result<()> {
    let records = recent_boundaries(7, 5)
        .into_iter()
        .map(|at| sample_record(at, 655))
        .collect();
    let emulator = VantageEmulator::new(5)
        .with_records(records)
        .with_position(485, -1232, 320);
    let control = emulator.control();
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    assert_eq!(h.driver.state(), VantageState::DumpAfterRequest);
    h.pump_until(VantageState::Running).await?;

    let events = h.drain();
    assert_eq!(init_result(&events), Some(true));
    let records = archived(&events);
    assert_eq!(records.len(), 7);
    assert!(records.windows(2).all(|w| w[0].date_time < w[1].date_time));
    assert!(records.iter().all(|r| r.interval == 5));
    assert_eq!(h.driver.last_archive_time(), records[6].date_time);

    let position = h.driver.position();
    assert!((position.latitude - 48.5).abs() < 1e-4);
    assert!((position.elevation - 320.0).abs() < 1e-4);

    assert_eq!(control.dump_requests(), 1);
    assert_eq!(control.loop_requests(), 1);
    assert!(!h.driver.is_failed());
    Ok(())
}

#[tokio::test]
async fn test_readings_and_empty_archive_request() -> Result<()> {
    let records = recent_boundaries(3, 5)
        .into_iter()
        .map(|at| sample_record(at, 600))
        .collect();
    let emulator = VantageEmulator::new(5).with_records(records);
    let control = emulator.control();
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    h.pump_until(VantageState::Running).await?;
    h.drain();

    h.driver.get_readings().await?;
    assert_eq!(h.driver.state(), VantageState::LoopRequest);
    h.pump_until(VantageState::Running).await?;
    let events = h.drain();
    assert!(matches!(events.as_slice(), [StationEvent::LoopComplete(_)]));

    // Nothing newer than what was already delivered
    h.driver.get_archive().await?;
    h.pump_until(VantageState::Running).await?;
    let events = h.drain();
    assert_eq!(events, vec![StationEvent::Archive(None)]);
    assert_eq!(control.dump_requests(), 2);
    Ok(())
}

#[tokio::test]
async fn test_time_sync_after_next_loop() -> Result<()> {
    let emulator = VantageEmulator::new(5);
    let control = emulator.control();
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    h.pump_until(VantageState::Running).await?;
    assert_eq!(control.clock_sets(), 0);

    h.driver.sync_time().await?;
    h.driver.get_readings().await?;
    h.pump_until(VantageState::Running).await?;
    assert_eq!(control.clock_sets(), 1);
    assert!(h.log.wrote(b"SETTIME"));
    assert!(h.log.wrote(b"EEBWR 12 5"));
    Ok(())
}

#[tokio::test]
async fn test_corrupted_page_cancels_download() -> Result<()> {
    let records = recent_boundaries(7, 5)
        .into_iter()
        .map(|at| sample_record(at, 655))
        .collect();
    let emulator = VantageEmulator::new(5).with_records(records);
    emulator.control().corrupt_page(0, 10);
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    h.pump_until(VantageState::Running).await?;

    let events = h.drain();
    assert!(archived(&events).is_empty());
    assert_eq!(init_result(&events), Some(true));
    assert!(h.log.wrote(&[CANCEL]));
    Ok(())
}

#[tokio::test]
async fn test_corrupted_second_page_keeps_first_page_records() -> Result<()> {
    let boundaries = recent_boundaries(7, 5);
    let records = boundaries.iter().map(|at| sample_record(*at, 655)).collect();
    let emulator = VantageEmulator::new(5).with_records(records);
    emulator.control().corrupt_page(1, 10);
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    h.pump_until(VantageState::Running).await?;

    let events = h.drain();
    assert_eq!(init_result(&events), Some(true));
    let delivered = archived(&events);
    assert_eq!(delivered.len(), 5);
    assert_eq!(h.driver.last_archive_time(), delivered[4].date_time);
    assert!(h.log.wrote(&[CANCEL]));

    // The next download resumes after the last delivered record
    h.driver.get_archive().await?;
    h.pump_until(VantageState::Running).await?;
    let resumed = archived(&h.drain());
    assert_eq!(resumed.len(), 2);
    assert!(resumed[0].date_time > delivered[4].date_time);
    Ok(())
}

#[tokio::test]
async fn test_invalid_dump_header_cancels_download() -> Result<()> {
    for (pages, first_record_index) in [(600, 0), (2, 5)] {
        let records = recent_boundaries(7, 5)
            .into_iter()
            .map(|at| sample_record(at, 655))
            .collect();
        let emulator = VantageEmulator::new(5).with_records(records);
        let control = emulator.control();
        control.override_dump_header(pages, first_record_index);
        let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

        h.driver.init().await?;
        h.pump_until(VantageState::Running).await?;

        let events = h.drain();
        assert_eq!(init_result(&events), Some(true));
        assert!(archived(&events).is_empty());
        assert!(h.log.wrote(&[CANCEL]));
        assert!(!h.driver.is_failed());

        // A fresh request gets a sane header and the full history
        h.driver.get_archive().await?;
        h.pump_until(VantageState::Running).await?;
        assert_eq!(archived(&h.drain()).len(), 7);
        assert_eq!(control.dump_requests(), 2);
    }
    Ok(())
}

#[tokio::test]
async fn test_silent_console_ends_in_error() -> Result<()> {
    let emulator = VantageEmulator::new(5);
    let control = emulator.control();
    let mut h = harness(&station_config(5), emulator, Arc::new(MemoryArchiveStore::new()));

    h.driver.init().await?;
    assert_eq!(h.driver.state(), VantageState::DumpAfterRequest);

    control.set_silent(true);
    h.driver.if_timer_expiry().await?;
    assert_eq!(h.driver.state(), VantageState::ReadRecover);

    for _ in 0..4 {
        h.driver.if_timer_expiry().await?;
        assert_eq!(h.driver.state(), VantageState::ReadRecover);
    }
    h.driver.if_timer_expiry().await?;
    assert_eq!(h.driver.state(), VantageState::Error);
    assert!(h.driver.is_failed());
    assert!(h.driver.timer_deadline().is_none());
    assert_eq!(init_result(&h.drain()), Some(false));

    // Sticky: a later stimulus changes nothing and is reported once
    assert!(!h.driver.error_reported());
    h.driver.if_timer_expiry().await?;
    assert!(h.driver.error_reported());
    h.driver.get_readings().await?;
    assert_eq!(h.driver.state(), VantageState::Error);
    assert!(h.driver.error_reported());
    Ok(())
}

#[tokio::test]
async fn test_interval_mismatch_refuses_to_start() -> Result<()> {
    let now = Local::now().timestamp() as i32;
    let store = Arc::new(MemoryArchiveStore::with_records(vec![ArchiveRecord::new(
        now - 600,
        10,
    )])?);
    let mut h = harness(&station_config(5), VantageEmulator::new(5), store);

    let result = h.driver.init().await;
    assert!(matches!(
        result,
        Err(StationError::IntervalMismatch {
            configured: 5,
            persisted: 10
        })
    ));
    assert_eq!(h.log.opens(), 0);
    assert_eq!(h.log.bytes_written(), 0);
    assert_eq!(h.driver.state(), VantageState::Error);
    assert_eq!(init_result(&h.drain()), Some(false));
    Ok(())
}

#[tokio::test]
async fn test_console_interval_mismatch_fails_start() -> Result<()> {
    let mut h = harness(
        &station_config(5),
        VantageEmulator::new(10),
        Arc::new(MemoryArchiveStore::new()),
    );

    h.driver.init().await?;
    assert_eq!(h.driver.state(), VantageState::Error);
    assert!(h.driver.is_failed());
    assert_eq!(init_result(&h.drain()), Some(false));
    assert!(h.log.wrote(b"EEBRD 2D 1"));
    assert!(!h.log.wrote(b"DMPAFT"));
    assert!(!h.log.wrote(b"LOOP"));
    Ok(())
}
