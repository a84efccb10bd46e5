// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Davis Vantage Pro driver
//!
//! The console conversation is a state machine driven by five stimuli:
//! start, readings request, archive request, transport input and interface
//! timer expiry. Each stimulus runs one bounded exchange and leaves the
//! driver waiting for the next one:
//!
//! ```text
//! StartProcedure ──► DumpAfterRequest ──► DumpAfterAck ──► ReceiveArchivePages
//!        │                                      │                  │
//!        └──────────────► LoopRequest ◄─────────┴──────────────────┘
//!                             │
//!                             ▼
//!                          Running ──► ReadRecover ──► Error
//! ```
//!
//! Read failures move to `ReadRecover`, which retries the wake-up on the
//! recovery interval and gives up in the sticky `Error` state after the
//! configured number of attempts.

pub mod archive_page;
pub mod convert;
pub mod emulator;
pub mod loop_packet;
pub mod protocol;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone, Timelike};
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::accumulator::SlidingWindowAccumulator;
use crate::config::{CalibrationConfig, StationConfig, VantageConfig};
use crate::records::{Channel, Reading, ARCHIVE_VALUE_NULL};
use crate::transport::{Medium, TransportError};

use super::{
    verify_archive_interval, InterfaceTimer, StationContext, StationDriver, StationError,
    StationEvent, StationPosition,
};

use archive_page::{ArchivePage, DumpHeader, ARCHIVE_PAGE_SIZE, DUMP_HEADER_SIZE};
use convert::{archive_from_console, reading_from_loop, ConversionContext, DayCounter};
use loop_packet::{LoopPacket, LOOP_PACKET_SIZE};
use protocol::{
    pack_date_time, rain_ticks_per_inch, rx_check_percent, unpack_date_time, ConsoleLink,
    RxCounters, ACK, CANCEL,
};

pub use emulator::{EmulatorControl, VantageEmulator};

/// Window of the outdoor temperature average used for station pressure.
const TEMP_AVERAGE_WINDOW_SECS: i64 = 12 * 3600;

/// How far back the first download reaches on an empty archive.
const INITIAL_HISTORY_DAYS: i64 = 30;

const ACK_TIMEOUT: Duration = Duration::from_millis(2000);
const ARCHIVE_WAKEUP_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VantageState {
    StartProcedure,
    Running,
    DumpAfterRequest,
    DumpAfterAck,
    ReceiveArchivePages,
    LoopRequest,
    ReadRecover,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stimulus {
    Start,
    Readings,
    Archive,
    Io,
    Timer,
}

pub struct VantageDriver {
    options: VantageConfig,
    calibration: CalibrationConfig,
    interval: i32,
    link: ConsoleLink,
    timer: InterfaceTimer,
    context: StationContext,
    state: VantageState,

    archive_pages: u16,
    current_page: u16,
    first_record_index: usize,
    read_retries: u32,
    rx_counters: Option<RxCounters>,
    rx_check_percent: u16,

    do_loop: bool,
    archive_retry: bool,
    archive_requested: bool,
    records_delivered: usize,
    time_sync_pending: bool,
    station_up: bool,
    error_reported: bool,

    temp_average: SlidingWindowAccumulator,
    last_archive_time: i32,
    rain_ticks_per_inch: f32,
    position: StationPosition,
    last_reading: Reading,
    rain_counter: DayCounter,
    et_counter: DayCounter,
}

/// Console local time to Unix time.
fn local_to_unix(local: &NaiveDateTime) -> Option<i32> {
    Local
        .from_local_datetime(local)
        .earliest()
        .map(|t| t.timestamp() as i32)
}

fn unix_to_local(timestamp: i32) -> Option<NaiveDateTime> {
    Local
        .timestamp_opt(timestamp as i64, 0)
        .single()
        .map(|t| t.naive_local())
}

/// Delay that moves a console exchange clear of the archive write around
/// the top of the minute.
fn minute_boundary_wait(second: u32) -> Option<Duration> {
    let wait = if second > 50 {
        65 - second
    } else if second < 5 {
        5 - second
    } else {
        return None;
    };
    Some(Duration::from_secs(wait as u64))
}

fn is_shutdown(error: &StationError) -> bool {
    matches!(error, StationError::Transport(TransportError::ShuttingDown))
}

impl VantageDriver {
    pub fn new(
        config: &StationConfig,
        calibration: &CalibrationConfig,
        medium: Box<dyn Medium>,
        context: StationContext,
    ) -> Self {
        let interval = config.archive_interval as i32;
        Self {
            options: config.vantage.clone(),
            calibration: calibration.clone(),
            interval,
            link: ConsoleLink::new(medium, config.vantage.is_weatherlink_ip),
            timer: InterfaceTimer::new(),
            context,
            state: VantageState::StartProcedure,
            archive_pages: 0,
            current_page: 0,
            first_record_index: 0,
            read_retries: 0,
            rx_counters: None,
            rx_check_percent: 0xFFFF,
            do_loop: false,
            archive_retry: false,
            archive_requested: false,
            records_delivered: 0,
            time_sync_pending: false,
            station_up: false,
            error_reported: false,
            temp_average: SlidingWindowAccumulator::new(TEMP_AVERAGE_WINDOW_SECS),
            last_archive_time: 0,
            rain_ticks_per_inch: 100.0,
            position: StationPosition::from_config(config),
            last_reading: Reading::cleared(),
            rain_counter: DayCounter::default(),
            et_counter: DayCounter::default(),
        }
    }

    pub fn state(&self) -> VantageState {
        self.state
    }

    /// Timestamp of the newest record the driver has seen.
    pub fn last_archive_time(&self) -> i32 {
        self.last_archive_time
    }

    fn enter(&mut self, state: VantageState) {
        if self.state != state {
            debug!("Vantage state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn temp_average_12h(&self) -> f32 {
        if self.temp_average.is_empty() {
            ARCHIVE_VALUE_NULL
        } else {
            self.temp_average.average()
        }
    }

    /// Load the last 12 hours of outdoor temperature and the resume point
    /// of the archive download from the store.
    fn seed_from_store(&mut self) -> Result<(), StationError> {
        let now = Local::now().timestamp() as i32;
        let store = self.context.archive().clone();

        for record in store.records_since(now - TEMP_AVERAGE_WINDOW_SECS as i32)? {
            if let Some(temp) = record.value(Channel::OutTemp) {
                self.temp_average.add_sample(record.date_time as i64, temp);
            }
        }

        self.last_archive_time = match store.newest()? {
            Some(newest) => newest.date_time,
            None => now - (INITIAL_HISTORY_DAYS * 86_400) as i32,
        };
        debug!(
            "Archive resumes after {}, {} temperature samples in the 12h window",
            self.last_archive_time,
            self.temp_average.len()
        );
        Ok(())
    }

    async fn handle(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        let result = match self.state {
            VantageState::StartProcedure => self.on_start_procedure(stimulus).await,
            VantageState::Running => self.on_running(stimulus).await,
            VantageState::DumpAfterRequest => self.on_dump_after_request(stimulus).await,
            VantageState::DumpAfterAck => self.on_dump_after_ack(stimulus).await,
            VantageState::ReceiveArchivePages => self.on_receive_archive_pages(stimulus).await,
            VantageState::LoopRequest => self.on_loop_request(stimulus).await,
            VantageState::ReadRecover => self.on_read_recover(stimulus).await,
            VantageState::Error => self.on_error(stimulus).await,
        };

        match result {
            Err(e) if !is_shutdown(&e) => {
                self.recover(e);
                Ok(())
            }
            other => other,
        }
    }

    /// Abandon the current exchange and retry on the recovery interval.
    fn recover(&mut self, error: StationError) {
        warn!(
            "Vantage {:?} failed on {}: {}; recovering",
            self.state,
            self.link.describe(),
            error
        );
        self.timer
            .start(Duration::from_millis(self.options.read_recover_interval_ms));
        self.enter(VantageState::ReadRecover);
    }

    fn fail(&mut self, error: &StationError) {
        error!(
            "Vantage driver giving up in {:?} after {} retries: {}",
            self.state, self.read_retries, error
        );
        self.timer.stop();
        self.enter(VantageState::Error);
        if !self.station_up {
            self.context.emit(StationEvent::InitComplete {
                success: false,
                reading: None,
            });
        }
    }

    async fn request_dump(&mut self) -> Result<(), StationError> {
        self.link.send_command("DMPAFT").await?;
        self.timer.start(self.link.response_timeout());
        self.enter(VantageState::DumpAfterRequest);
        Ok(())
    }

    async fn request_loop(&mut self) -> Result<(), StationError> {
        self.link.send_command("LOOP 1").await?;
        self.timer.start(self.link.response_timeout());
        self.enter(VantageState::LoopRequest);
        Ok(())
    }

    async fn send_dump_time(&mut self) -> Result<(), StationError> {
        let (date, time) = unix_to_local(self.last_archive_time)
            .map(|local| pack_date_time(&local))
            .unwrap_or((0, 0));
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&date.to_le_bytes());
        payload.extend_from_slice(&time.to_le_bytes());
        self.link.write_with_crc(&payload).await?;
        self.timer.start(self.link.response_timeout() * 2);
        self.enter(VantageState::DumpAfterAck);
        Ok(())
    }

    async fn wakeup_with_retry(&mut self) -> Result<(), StationError> {
        match self.link.wakeup().await {
            Err(e) if !is_shutdown(&e) => {
                tokio::time::sleep(ARCHIVE_WAKEUP_RETRY_DELAY).await;
                self.link.wakeup().await
            }
            other => other,
        }
    }

    /// Leave a download: LOOP if a reading is owed, otherwise idle.
    async fn after_dump(&mut self) -> Result<(), StationError> {
        if self.archive_requested && self.records_delivered == 0 {
            self.context.emit(StationEvent::Archive(None));
        }
        self.archive_requested = false;
        self.records_delivered = 0;

        if self.do_loop {
            self.link.wakeup().await?;
            self.request_loop().await
        } else {
            self.timer.stop();
            self.enter(VantageState::Running);
            Ok(())
        }
    }

    async fn initial_wakeup(&mut self) -> Result<bool, StationError> {
        for attempt in 1..=self.options.initial_wakeup_tries {
            match self.link.wakeup().await {
                Ok(()) => return Ok(true),
                Err(e) if is_shutdown(&e) => return Err(e),
                Err(e) => debug!("Start-up wake-up {} failed: {}", attempt, e),
            }
            tokio::time::sleep(Duration::from_millis(self.options.wakeup_retry_delay_ms)).await;
        }
        Ok(false)
    }

    async fn read_console_setup(&mut self) -> Result<(), StationError> {
        let console = self.link.read_eeprom(0x2D, 1).await?[0] as i32;
        if console != self.interval {
            return Err(StationError::ConsoleIntervalMismatch {
                configured: self.interval,
                console,
            });
        }

        let setup = self.link.read_eeprom(0x2B, 1).await?[0];
        self.rain_ticks_per_inch = rain_ticks_per_inch(setup);

        let latitude = self.link.read_eeprom(0x0B, 2).await?;
        let longitude = self.link.read_eeprom(0x0D, 2).await?;
        let elevation = self.link.read_eeprom(0x0F, 2).await?;
        self.position = StationPosition {
            latitude: i16::from_le_bytes([latitude[0], latitude[1]]) as f32 / 10.0,
            longitude: i16::from_le_bytes([longitude[0], longitude[1]]) as f32 / 10.0,
            elevation: i16::from_le_bytes([elevation[0], elevation[1]]) as f32,
        };

        info!(
            "Vantage console: interval {} min, {} ticks/in, lat {:.1} long {:.1} elev {} ft",
            self.interval,
            self.rain_ticks_per_inch,
            self.position.latitude,
            self.position.longitude,
            self.position.elevation
        );
        Ok(())
    }

    async fn on_start_procedure(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        if stimulus != Stimulus::Start {
            return Ok(());
        }

        if self.options.avoid_minute_boundary {
            if let Some(wait) = minute_boundary_wait(Local::now().second()) {
                debug!("Waiting {:?} to stay clear of the console archive write", wait);
                tokio::time::sleep(wait).await;
            }
        }

        if !self.initial_wakeup().await? {
            self.fail(&StationError::WakeupFailed {
                attempts: self.options.initial_wakeup_tries,
            });
            return Ok(());
        }

        if let Err(e) = self.read_console_setup().await {
            if is_shutdown(&e) {
                return Err(e);
            }
            self.fail(&e);
            return Ok(());
        }

        self.do_loop = true;
        self.link.wakeup().await?;
        if self.options.generates_archives {
            self.request_dump().await
        } else {
            self.request_loop().await
        }
    }

    async fn on_running(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Readings => {
                self.do_loop = true;
                if let Err(e) = self.link.wakeup().await {
                    if is_shutdown(&e) {
                        return Err(e);
                    }
                    warn!("Console asleep, readings request skipped: {}", e);
                    return Ok(());
                }
                if self.archive_retry {
                    self.request_dump().await
                } else {
                    self.request_loop().await
                }
            }
            Stimulus::Archive => {
                self.archive_retry = true;
                self.archive_requested = true;
                self.wakeup_with_retry().await?;
                self.request_dump().await
            }
            Stimulus::Io => {
                self.link.flush().await;
                Ok(())
            }
            Stimulus::Start | Stimulus::Timer => Ok(()),
        }
    }

    async fn on_dump_after_request(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Io => {
                self.link.expect_ack("DMPAFT", ACK_TIMEOUT).await?;
                self.send_dump_time().await
            }
            Stimulus::Timer => {
                debug!("DMPAFT not acknowledged, asking again");
                self.link.wakeup().await?;
                self.request_dump().await
            }
            Stimulus::Readings => {
                self.do_loop = true;
                Ok(())
            }
            Stimulus::Archive => {
                self.archive_requested = true;
                Ok(())
            }
            Stimulus::Start => Ok(()),
        }
    }

    async fn on_dump_after_ack(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Io => {
                self.link.expect_ack("DMPAFT", ACK_TIMEOUT).await?;
                let timeout = self.link.response_timeout();
                let frame = self
                    .link
                    .read_with_crc(DUMP_HEADER_SIZE, timeout, "dump header")
                    .await?;
                let header = match DumpHeader::parse(&frame) {
                    Ok(header) => header,
                    Err(e) => {
                        warn!("Dump header rejected ({}), cancelling download", e);
                        self.link.send_byte(CANCEL).await?;
                        self.link.flush().await;
                        return self.after_dump().await;
                    }
                };
                debug!(
                    "DMPAFT: {} pages, first record at index {}",
                    header.pages, header.first_record_index
                );

                if header.pages == 0 {
                    self.link.send_byte(CANCEL).await?;
                    self.archive_retry = false;
                    return self.after_dump().await;
                }

                self.archive_pages = header.pages;
                self.current_page = 0;
                self.first_record_index = header.first_record_index as usize;
                self.link.send_byte(ACK).await?;
                self.timer.start(timeout);
                self.enter(VantageState::ReceiveArchivePages);
                Ok(())
            }
            Stimulus::Timer => {
                debug!("No dump header, restarting the download");
                self.link.send_byte(CANCEL).await?;
                self.link.wakeup().await?;
                self.request_dump().await
            }
            Stimulus::Readings => {
                self.do_loop = true;
                Ok(())
            }
            Stimulus::Archive => {
                self.archive_requested = true;
                Ok(())
            }
            Stimulus::Start => Ok(()),
        }
    }

    async fn on_receive_archive_pages(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Io => {
                let timeout = self.link.response_timeout();
                let page = match self
                    .link
                    .read_with_crc(ARCHIVE_PAGE_SIZE, timeout, "archive page")
                    .await
                    .and_then(|frame| ArchivePage::parse(&frame).map_err(StationError::from))
                {
                    Ok(page) => page,
                    Err(e) if is_shutdown(&e) => return Err(e),
                    Err(e) => {
                        warn!(
                            "Archive page {} of {} rejected ({}), cancelling download",
                            self.current_page + 1,
                            self.archive_pages,
                            e
                        );
                        self.link.send_byte(CANCEL).await?;
                        self.link.flush().await;
                        return self.after_dump().await;
                    }
                };

                self.current_page += 1;
                let last_page = self.current_page >= self.archive_pages;
                if !last_page {
                    self.link.send_byte(ACK).await?;
                    self.timer.start(timeout);
                }

                self.process_page(&page);

                if last_page {
                    self.finish_download().await
                } else {
                    Ok(())
                }
            }
            Stimulus::Timer => {
                warn!(
                    "Archive page {} of {} timed out, cancelling download",
                    self.current_page + 1,
                    self.archive_pages
                );
                self.link.send_byte(CANCEL).await?;
                if !self.station_up {
                    self.do_loop = true;
                }
                self.after_dump().await
            }
            Stimulus::Readings => {
                self.do_loop = true;
                Ok(())
            }
            Stimulus::Archive => {
                self.archive_requested = true;
                Ok(())
            }
            Stimulus::Start => Ok(()),
        }
    }

    /// Convert and deliver the new records of a verified page.
    fn process_page(&mut self, page: &ArchivePage) {
        let first_page = self.current_page == 1;
        for (slot, raw) in page.records.iter().enumerate() {
            if first_page && slot < self.first_record_index {
                continue;
            }
            if raw.is_blank() {
                continue;
            }
            let Some(date_time) = unpack_date_time(raw.date, raw.time).and_then(|t| local_to_unix(&t))
            else {
                debug!("Skipping record with invalid date {:#06x} {}", raw.date, raw.time);
                continue;
            };
            if date_time <= self.last_archive_time {
                continue;
            }

            let ctx = ConversionContext {
                elevation_ft: self.position.elevation,
                rain_ticks_per_inch: self.rain_ticks_per_inch,
                temp_avg_12h: self.temp_average_12h(),
                interval: self.interval,
                calibration: &self.calibration,
            };
            let record = archive_from_console(raw, date_time, &ctx, &self.last_reading);

            if let Some(temp) = record.value(Channel::OutTemp) {
                self.temp_average.add_sample(date_time as i64, temp);
            }
            self.last_archive_time = date_time;
            self.archive_retry = false;
            self.records_delivered += 1;
            self.context
                .emit(StationEvent::Archive(Some(Box::new(record))));
        }
    }

    async fn finish_download(&mut self) -> Result<(), StationError> {
        info!(
            "Archive download complete: {} new records",
            self.records_delivered
        );
        self.link.send_byte(CANCEL).await?;
        self.link.flush().await;
        self.link.wakeup().await?;

        if self.options.rx_check {
            match self.link.rx_check().await {
                Ok(current) => {
                    if let Some(previous) = &self.rx_counters {
                        if let Some(percent) = rx_check_percent(previous, &current) {
                            self.rx_check_percent = percent;
                        }
                    }
                    self.rx_counters = Some(current);
                }
                Err(e) if is_shutdown(&e) => return Err(e),
                Err(e) => debug!("RXCHECK failed: {}", e),
            }
        }

        self.after_dump().await
    }

    async fn on_loop_request(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Io => {
                self.link.expect_ack("LOOP", ACK_TIMEOUT).await?;
                let timeout = self.link.response_timeout();
                let frame = self
                    .link
                    .read_with_crc(LOOP_PACKET_SIZE, timeout, "LOOP packet")
                    .await?;
                let packet = LoopPacket::parse(&frame)?;
                self.timer.stop();
                self.do_loop = false;

                let ctx = ConversionContext {
                    elevation_ft: self.position.elevation,
                    rain_ticks_per_inch: self.rain_ticks_per_inch,
                    temp_avg_12h: self.temp_average_12h(),
                    interval: self.interval,
                    calibration: &self.calibration,
                };
                let reading = reading_from_loop(
                    &packet,
                    &ctx,
                    &mut self.rain_counter,
                    &mut self.et_counter,
                    self.rx_check_percent,
                );
                self.last_reading = reading.clone();

                if self.station_up {
                    self.context
                        .emit(StationEvent::LoopComplete(Box::new(reading)));
                } else {
                    self.station_up = true;
                    info!("Vantage console on {} is up", self.link.describe());
                    self.context.emit(StationEvent::InitComplete {
                        success: true,
                        reading: Some(Box::new(reading)),
                    });
                }

                if self.time_sync_pending {
                    self.time_sync_pending = false;
                    if let Err(e) = self.synchronize_clock().await {
                        if is_shutdown(&e) {
                            return Err(e);
                        }
                        warn!("Console clock synchronisation failed: {}", e);
                    }
                }

                self.enter(VantageState::Running);
                Ok(())
            }
            Stimulus::Timer => {
                debug!("LOOP not answered, asking again");
                self.link.wakeup().await?;
                self.request_loop().await
            }
            Stimulus::Readings => Ok(()),
            Stimulus::Archive => {
                self.archive_retry = true;
                self.archive_requested = true;
                Ok(())
            }
            Stimulus::Start => Ok(()),
        }
    }

    async fn synchronize_clock(&mut self) -> Result<(), StationError> {
        let now = Local::now();
        self.link.wakeup().await?;
        self.link.set_time(&now.naive_local()).await?;
        self.link
            .set_gmt_offset(now.offset().local_minus_utc() / 60)
            .await?;
        info!("Console clock set to {}", now.format("%Y-%m-%d %H:%M:%S"));
        Ok(())
    }

    async fn on_read_recover(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        match stimulus {
            Stimulus::Timer => match self.link.wakeup().await {
                Ok(()) => {
                    info!("Console recovered after {} retries", self.read_retries);
                    self.read_retries = 0;
                    if self.do_loop {
                        self.request_loop().await
                    } else {
                        self.enter(VantageState::Running);
                        Ok(())
                    }
                }
                Err(e) if is_shutdown(&e) => Err(e),
                Err(e) => {
                    self.read_retries += 1;
                    if self.read_retries >= self.options.read_recover_max_retries {
                        self.fail(&StationError::RetriesExhausted {
                            attempts: self.read_retries,
                        });
                    } else {
                        debug!("Recovery attempt {} failed: {}", self.read_retries, e);
                        self.timer
                            .start(Duration::from_millis(self.options.read_recover_interval_ms));
                    }
                    Ok(())
                }
            },
            Stimulus::Io => {
                self.link.flush().await;
                Ok(())
            }
            Stimulus::Readings => {
                self.do_loop = true;
                Ok(())
            }
            Stimulus::Archive => {
                self.archive_retry = true;
                Ok(())
            }
            Stimulus::Start => Ok(()),
        }
    }

    async fn on_error(&mut self, stimulus: Stimulus) -> Result<(), StationError> {
        if !self.error_reported {
            self.error_reported = true;
            warn!(
                "Vantage driver on {} is in the error state, ignoring {:?}",
                self.link.describe(),
                stimulus
            );
        }
        if stimulus == Stimulus::Io {
            self.link.flush().await;
        }
        Ok(())
    }

    /// Whether the error state has already been reported.
    pub fn error_reported(&self) -> bool {
        self.error_reported
    }
}

#[async_trait]
impl StationDriver for VantageDriver {
    fn name(&self) -> &'static str {
        "vantage_pro"
    }

    async fn init(&mut self) -> Result<(), StationError> {
        let store = self.context.archive().clone();
        if let Err(e) = verify_archive_interval(store.as_ref(), self.interval) {
            self.fail(&e);
            return Err(e);
        }
        self.seed_from_store()?;

        self.link.open().await?;
        // The first exchanges after opening are often lost
        for _ in 0..2 {
            if let Err(e) = self.link.wakeup().await {
                if is_shutdown(&e) {
                    return Err(e);
                }
            }
        }

        self.state = VantageState::StartProcedure;
        self.handle(Stimulus::Start).await
    }

    async fn get_readings(&mut self) -> Result<(), StationError> {
        self.handle(Stimulus::Readings).await
    }

    async fn get_archive(&mut self) -> Result<(), StationError> {
        self.handle(Stimulus::Archive).await
    }

    async fn data_indicate(&mut self) -> Result<(), StationError> {
        self.handle(Stimulus::Io).await
    }

    async fn if_timer_expiry(&mut self) -> Result<(), StationError> {
        self.timer.stop();
        self.handle(Stimulus::Timer).await
    }

    fn generates_archives(&self) -> bool {
        self.options.generates_archives
    }

    async fn wait_readable(&mut self) -> Result<(), StationError> {
        self.link.readable().await
    }

    fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    async fn sync_time(&mut self) -> Result<(), StationError> {
        self.time_sync_pending = true;
        Ok(())
    }

    fn position(&self) -> StationPosition {
        self.position
    }

    fn is_failed(&self) -> bool {
        self.state == VantageState::Error
    }

    async fn shutdown(&mut self) {
        self.timer.stop();
        self.link.close().await;
        info!("Vantage driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_boundary_wait() {
        assert_eq!(minute_boundary_wait(55), Some(Duration::from_secs(10)));
        assert_eq!(minute_boundary_wait(59), Some(Duration::from_secs(6)));
        assert_eq!(minute_boundary_wait(0), Some(Duration::from_secs(5)));
        assert_eq!(minute_boundary_wait(2), Some(Duration::from_secs(3)));
        assert_eq!(minute_boundary_wait(5), None);
        assert_eq!(minute_boundary_wait(30), None);
        assert_eq!(minute_boundary_wait(50), None);
    }
}
