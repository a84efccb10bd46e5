// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use super::station_task::{StationStats, StationTask};
use crate::config::Config;
use crate::datafeed::{DatafeedServer, FeedItem, FEED_CAPACITY};
use crate::station::{create_station_driver, StationContext};
use crate::storage::{ArchiveStore, FileArchiveStore};

/// Represents a daemon task that can be started and managed
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    stats: Arc<StationStats>,
    datafeed_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(StationStats::default()),
            datafeed_addr: None,
        }
    }

    /// Shared shutdown flag
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stats(&self) -> Arc<StationStats> {
        self.stats.clone()
    }

    /// Address the datafeed server is bound to, once launched.
    pub fn datafeed_addr(&self) -> Option<SocketAddr> {
        self.datafeed_addr
    }

    /// Launch all configured tasks based on configuration
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let store: Arc<dyn ArchiveStore> = Arc::new(
            FileArchiveStore::open(&config.storage.archive_path).with_context(|| {
                format!("Failed to open archive {}", config.storage.archive_path)
            })?,
        );
        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        // Clients may connect before the station is up
        if config.datafeed.enabled {
            self.start_datafeed(config, store.clone(), feed.clone())
                .await?;
        }

        self.start_station(config, store, feed)?;

        self.start_heartbeat(Duration::from_secs(
            config.daemon.heartbeat_interval_secs.max(1),
        ))?;

        Ok(())
    }

    /// Start the datafeed TCP server
    async fn start_datafeed(
        &mut self,
        config: &Config,
        store: Arc<dyn ArchiveStore>,
        feed: broadcast::Sender<FeedItem>,
    ) -> Result<()> {
        info!(
            "Starting datafeed server on {}:{}",
            config.datafeed.address, config.datafeed.port
        );

        let server = DatafeedServer::bind(
            &config.datafeed.address,
            config.datafeed.port,
            store,
            feed,
            self.running.clone(),
        )
        .await?;
        self.datafeed_addr = Some(server.local_addr()?);

        let task = tokio::spawn(server.run());
        self.tasks.push(task);
        Ok(())
    }

    /// Start the station event loop
    fn start_station(
        &mut self,
        config: &Config,
        store: Arc<dyn ArchiveStore>,
        feed: broadcast::Sender<FeedItem>,
    ) -> Result<()> {
        info!("Starting {:?} station task", config.station.station_type);

        let (context, events) = StationContext::channel(store.clone(), self.running.clone());
        let driver = create_station_driver(&config.station, &config.calibration, context)?;
        let station = StationTask::new(
            driver,
            events,
            store,
            feed,
            self.running.clone(),
            self.stats.clone(),
            config.station.archive_interval,
            &config.daemon,
        );

        let task = tokio::spawn(async move {
            let result = station.run().await;
            if let Err(e) = &result {
                error!("Station task ended: {:#}", e);
            }
            result
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self, period: Duration) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let stats = self.stats.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!(
                    "Daemon heartbeat: running, {} readings, {} archive records",
                    stats.readings.load(Ordering::Relaxed),
                    stats.archives.load(Ordering::Relaxed)
                );
                // Short sleeps keep shutdown responsive
                let mut waited = Duration::ZERO;
                while waited < period && running.load(Ordering::SeqCst) {
                    let step = Duration::from_millis(500).min(period - waited);
                    time::sleep(step).await;
                    waited += step;
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        // Tasks should check the running flag and terminate gracefully
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task failed: {:#}", e),
                Err(e) => error!("Task panicked: {}", e),
            }
        }
        Ok(())
    }
}
