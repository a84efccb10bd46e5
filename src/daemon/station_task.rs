// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Station event loop
//!
//! A single task owns the station driver and wakes it up on transport
//! input, interface timer expiry, the polling interval, the archive
//! interval boundary and the clock synchronisation interval. Driver events
//! are turned into persisted archive records and datafeed publications.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, sleep_until, Instant};

use super::archive_builder::ArchiveBuilder;
use super::computed::ComputedData;
use crate::config::DaemonConfig;
use crate::datafeed::FeedItem;
use crate::records::{ArchiveRecord, Reading};
use crate::station::{StationDriver, StationError, StationEvent};
use crate::storage::ArchiveStore;
use crate::transport::TransportError;

/// How often the loop checks the shutdown flag when nothing else happens.
const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

/// Pause after the transport reported an error while waiting for input.
const READABLE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Delay after the interval boundary before asking for the archive record,
/// leaving the console time to write it.
const ARCHIVE_SETTLE: Duration = Duration::from_secs(5);

/// Counters shared with the heartbeat task
#[derive(Debug, Default)]
pub struct StationStats {
    pub readings: AtomicU64,
    pub archives: AtomicU64,
}

enum Wake {
    Readable(Result<(), StationError>),
    Timer,
    Poll,
    Archive,
    TimeSync,
    Event(StationEvent),
    Idle,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Next archive boundary strictly after `now` (Unix seconds).
pub fn next_archive_boundary(now: i64, interval_minutes: u32) -> i64 {
    let period = interval_minutes.max(1) as i64 * 60;
    (now / period + 1) * period
}

pub struct StationTask {
    driver: Box<dyn StationDriver>,
    events: mpsc::UnboundedReceiver<StationEvent>,
    store: Arc<dyn ArchiveStore>,
    feed: broadcast::Sender<FeedItem>,
    running: Arc<AtomicBool>,
    stats: Arc<StationStats>,
    computed: ComputedData,
    builder: Option<ArchiveBuilder>,
    interval_minutes: u32,
    poll_interval: Duration,
    poll_deadline: Instant,
    archive_due: i64,
    archive_deadline: Instant,
    time_sync_interval: Option<Duration>,
    time_sync_deadline: Option<Instant>,
    station_up: bool,
    last_reading: Option<Reading>,
}

impl StationTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: Box<dyn StationDriver>,
        events: mpsc::UnboundedReceiver<StationEvent>,
        store: Arc<dyn ArchiveStore>,
        feed: broadcast::Sender<FeedItem>,
        running: Arc<AtomicBool>,
        stats: Arc<StationStats>,
        interval_minutes: u32,
        daemon: &DaemonConfig,
    ) -> Self {
        let builder = (!driver.generates_archives())
            .then(|| ArchiveBuilder::new(interval_minutes as i32));
        let poll_interval = Duration::from_secs(daemon.poll_interval_secs.max(1));
        let time_sync_interval = (daemon.time_sync_interval_hours > 0)
            .then(|| Duration::from_secs(daemon.time_sync_interval_hours * 3600));
        let now = Instant::now();

        let mut task = Self {
            driver,
            events,
            store,
            feed,
            running,
            stats,
            computed: ComputedData::new(interval_minutes),
            builder,
            interval_minutes,
            poll_interval,
            poll_deadline: now + poll_interval,
            archive_due: 0,
            archive_deadline: now,
            time_sync_interval,
            time_sync_deadline: time_sync_interval.map(|i| now + i),
            station_up: false,
            last_reading: None,
        };
        task.schedule_archive();
        task
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn schedule_archive(&mut self) {
        let now = Local::now().timestamp();
        let due = next_archive_boundary(now, self.interval_minutes);
        let mut wait = Duration::from_secs((due - now).max(0) as u64);
        if self.builder.is_none() {
            wait += ARCHIVE_SETTLE;
        }
        self.archive_due = due;
        self.archive_deadline = Instant::now() + wait;
    }

    /// Start the station, then serve it until shutdown or a fatal error.
    pub async fn run(mut self) -> Result<()> {
        let name = self.driver.name();
        info!("Starting {} station", name);
        if let Err(e) = self.driver.init().await {
            let _ = self.drain_events();
            self.driver.shutdown().await;
            return Err(e).with_context(|| format!("{} station failed to start", name));
        }

        let result = self.event_loop().await;
        self.driver.shutdown().await;
        result
    }

    /// Start the station and return its first reading.
    pub async fn first_reading(mut self) -> Result<Reading> {
        let name = self.driver.name();
        if let Err(e) = self.driver.init().await {
            self.driver.shutdown().await;
            return Err(e).with_context(|| format!("{} station failed to start", name));
        }

        let result: Result<Reading> = async {
            loop {
                if let Some(reading) = self.last_reading.take() {
                    return Ok(reading);
                }
                if !self.is_running() {
                    return Err(anyhow!("shutdown before the first reading"));
                }
                if self.driver.is_failed() {
                    return Err(anyhow!("{} station failed", name));
                }
                self.step().await?;
            }
        }
        .await;
        self.driver.shutdown().await;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        while self.is_running() {
            self.step().await?;
            if self.driver.is_failed() {
                error!("{} station failed, stopping acquisition", self.driver.name());
                return Err(anyhow!("{} station failed", self.driver.name()));
            }
        }
        info!("{} station task stopped", self.driver.name());
        Ok(())
    }

    /// Wait for the next stimulus, act on it, then handle the events the
    /// driver raised meanwhile.
    async fn step(&mut self) -> Result<()> {
        let timer = self.driver.timer_deadline();
        let poll = self.poll_deadline;
        let archive = self.archive_deadline;
        let time_sync = self.time_sync_deadline;

        let wake = tokio::select! {
            result = self.driver.wait_readable() => Wake::Readable(result),
            Some(event) = self.events.recv() => Wake::Event(event),
            _ = sleep_until_opt(timer) => Wake::Timer,
            _ = sleep_until(poll) => Wake::Poll,
            _ = sleep_until(archive) => Wake::Archive,
            _ = sleep_until_opt(time_sync) => Wake::TimeSync,
            _ = sleep(SHUTDOWN_POLL) => Wake::Idle,
        };

        match wake {
            Wake::Readable(Ok(())) => {
                let result = self.driver.data_indicate().await;
                self.report("data_indicate", result);
            }
            Wake::Readable(Err(e)) => {
                warn!("{} transport error: {}", self.driver.name(), e);
                sleep(READABLE_ERROR_BACKOFF).await;
            }
            Wake::Timer => {
                let result = self.driver.if_timer_expiry().await;
                self.report("if_timer_expiry", result);
            }
            Wake::Poll => {
                self.poll_deadline = Instant::now() + self.poll_interval;
                if self.station_up {
                    let result = self.driver.get_readings().await;
                    self.report("get_readings", result);
                }
            }
            Wake::Archive => {
                let due = self.archive_due;
                self.schedule_archive();
                self.archive_boundary(due).await;
            }
            Wake::TimeSync => {
                self.time_sync_deadline = self.time_sync_interval.map(|i| Instant::now() + i);
                let result = self.driver.sync_time().await;
                self.report("sync_time", result);
            }
            Wake::Event(event) => self.handle_event(event)?,
            Wake::Idle => {}
        }

        self.drain_events()
    }

    async fn archive_boundary(&mut self, due: i64) {
        if let Some(builder) = self.builder.as_mut() {
            match builder.finish(due as i32) {
                Some(record) => self.handle_archive(record),
                None => debug!("No reading during the archive interval ending at {}", due),
            }
        } else if self.station_up {
            let result = self.driver.get_archive().await;
            self.report("get_archive", result);
        }
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: StationEvent) -> Result<()> {
        match event {
            StationEvent::InitComplete { success: false, .. } => {
                Err(anyhow!("{} station initialization failed", self.driver.name()))
            }
            StationEvent::InitComplete {
                success: true,
                reading,
            } => {
                self.station_up = true;
                info!("{} station is up", self.driver.name());
                if let Some(reading) = reading {
                    self.handle_reading(*reading);
                }
                Ok(())
            }
            StationEvent::LoopComplete(reading) => {
                self.handle_reading(*reading);
                Ok(())
            }
            StationEvent::Archive(Some(record)) => {
                self.handle_archive(*record);
                Ok(())
            }
            StationEvent::Archive(None) => {
                debug!("No new archive record");
                Ok(())
            }
        }
    }

    fn handle_reading(&mut self, mut reading: Reading) {
        self.computed.apply(&mut reading, &Local::now());
        if let Some(builder) = self.builder.as_mut() {
            builder.add(&reading);
        }
        self.stats.readings.fetch_add(1, Ordering::Relaxed);
        // No subscriber is fine
        let _ = self.feed.send(FeedItem::Reading(Box::new(reading.clone())));
        self.last_reading = Some(reading);
    }

    fn handle_archive(&mut self, record: ArchiveRecord) {
        if let Err(e) = self.store.append(&record) {
            warn!("Archive record {} not stored: {}", record.date_time, e);
            return;
        }
        debug!("Stored archive record {}", record.date_time);
        self.stats.archives.fetch_add(1, Ordering::Relaxed);
        let _ = self.feed.send(FeedItem::Archive(Box::new(record)));
    }

    /// Driver errors are logged; the driver recovers on its own.
    fn report(&self, operation: &str, result: Result<(), StationError>) {
        match result {
            Ok(()) => {}
            Err(StationError::Transport(TransportError::ShuttingDown)) => {
                debug!("{} interrupted by shutdown", operation);
            }
            Err(e) => warn!("{} {} failed: {}", self.driver.name(), operation, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::station::{create_station_driver, StationContext};
    use crate::storage::MemoryArchiveStore;

    #[test]
    fn test_next_archive_boundary() {
        assert_eq!(next_archive_boundary(0, 5), 300);
        assert_eq!(next_archive_boundary(299, 5), 300);
        assert_eq!(next_archive_boundary(300, 5), 600);
        assert_eq!(next_archive_boundary(3_599, 60), 3_600);
    }

    #[tokio::test]
    async fn test_events_are_persisted_and_published() {
        let config = Config::default();
        let store = Arc::new(MemoryArchiveStore::new());
        let running = Arc::new(AtomicBool::new(true));
        let (context, events) = StationContext::channel(store.clone(), running.clone());
        let driver = create_station_driver(&config.station, &config.calibration, context).unwrap();
        let (feed, mut subscriber) = broadcast::channel(8);
        let stats = Arc::new(StationStats::default());
        let mut task = StationTask::new(
            driver,
            events,
            store.clone(),
            feed,
            running,
            stats.clone(),
            5,
            &config.daemon,
        );

        task.handle_event(StationEvent::Archive(Some(Box::new(ArchiveRecord::new(600, 5)))))
            .unwrap();
        // Older than the newest stored record: rejected by the store
        task.handle_event(StationEvent::Archive(Some(Box::new(ArchiveRecord::new(300, 5)))))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(stats.archives.load(Ordering::Relaxed), 1);
        assert!(matches!(subscriber.try_recv(), Ok(FeedItem::Archive(_))));
        assert!(subscriber.try_recv().is_err());

        task.handle_event(StationEvent::LoopComplete(Box::new(Reading::cleared())))
            .unwrap();
        assert!(matches!(subscriber.try_recv(), Ok(FeedItem::Reading(_))));
        assert_eq!(task.builder.as_ref().map(|b| b.samples()), Some(1));

        let failed = task.handle_event(StationEvent::InitComplete {
            success: false,
            reading: None,
        });
        assert!(failed.is_err());
    }
}
