// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Virtual station
//!
//! Consumes another daemon's datafeed as if it were a station. At start-up
//! the driver asks for every archive record newer than its own newest one,
//! one request per record, until the server answers with a zeroed record.
//! Afterwards it relays the readings and archive records the server pushes.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::codec::{
    decode_archive, decode_reading, ByteWriter, FrameType, StartFrameMatcher, ARCHIVE_WIRE_SIZE,
    READING_WIRE_SIZE,
};
use crate::config::StationConfig;
use crate::records::Reading;
use crate::transport::{Medium, QueueDirection, TransportError};

use super::{
    verify_archive_interval, InterfaceTimer, StationContext, StationDriver, StationError,
    StationEvent, StationPosition,
};

/// Time allowed for the server to answer an archive request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Time allowed for a frame body once its marker arrived.
const BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// Unanswered requests before start-up is abandoned.
const MAX_REQUEST_TIMEOUTS: u32 = 5;

pub struct VirtualStation {
    medium: Box<dyn Medium>,
    context: StationContext,
    timer: InterfaceTimer,
    position: StationPosition,
    interval: i32,
    last_archive_time: i32,
    syncing: bool,
    archive_requested: bool,
    records_delivered: usize,
    latest: Option<Reading>,
    readings_pending: bool,
    station_up: bool,
    failed: bool,
    timeouts: u32,
}

impl VirtualStation {
    pub fn new(config: &StationConfig, medium: Box<dyn Medium>, context: StationContext) -> Self {
        Self {
            medium,
            context,
            timer: InterfaceTimer::new(),
            position: StationPosition::from_config(config),
            interval: config.archive_interval as i32,
            last_archive_time: 0,
            syncing: false,
            archive_requested: false,
            records_delivered: 0,
            latest: None,
            readings_pending: false,
            station_up: false,
            failed: false,
            timeouts: 0,
        }
    }

    async fn send_request(&mut self) -> Result<(), StationError> {
        let mut w = ByteWriter::with_capacity(12);
        w.put_bytes(&FrameType::ArchiveRequest.marker())
            .put_u32_be(self.last_archive_time.max(0) as u32);
        self.medium.write_all(w.as_slice()).await?;
        self.timer.start(REQUEST_TIMEOUT);
        self.syncing = true;
        debug!("Requested archive records after {}", self.last_archive_time);
        Ok(())
    }

    /// Read a start-of-frame marker; `None` after a sync mismatch.
    async fn read_frame_type(&mut self) -> Result<Option<FrameType>, StationError> {
        let mut matcher = StartFrameMatcher::new();
        let mut word = [0u8; 2];
        loop {
            self.medium.read_exact(&mut word, matcher.next_wait()).await?;
            match matcher.push_word(u16::from_be_bytes(word)) {
                Ok(Some(frame_type)) => return Ok(Some(frame_type)),
                Ok(None) => {}
                Err(e) => {
                    debug!("Datafeed out of sync ({}), discarding input", e);
                    self.medium.flush(QueueDirection::Input).await?;
                    return Ok(None);
                }
            }
        }
    }

    async fn read_body(&mut self, len: usize) -> Result<Vec<u8>, StationError> {
        let mut body = vec![0u8; len];
        self.medium.read_exact(&mut body, BODY_TIMEOUT).await?;
        Ok(body)
    }

    async fn on_archive_frame(&mut self) -> Result<(), StationError> {
        let body = self.read_body(ARCHIVE_WIRE_SIZE).await?;
        let record = decode_archive(&body)?;

        if record.date_time == 0 {
            self.sync_complete();
            return Ok(());
        }

        if record.date_time > self.last_archive_time {
            self.last_archive_time = record.date_time;
            self.records_delivered += 1;
            self.context
                .emit(StationEvent::Archive(Some(Box::new(record))));
        }

        if self.syncing {
            self.send_request().await?;
        }
        Ok(())
    }

    fn sync_complete(&mut self) {
        self.timer.stop();
        self.syncing = false;
        self.timeouts = 0;

        if self.archive_requested && self.records_delivered == 0 {
            self.context.emit(StationEvent::Archive(None));
        }
        self.archive_requested = false;

        if !self.station_up {
            self.station_up = true;
            info!(
                "Virtual station on {} is up, {} records retrieved",
                self.medium.describe(),
                self.records_delivered
            );
            self.context.emit(StationEvent::InitComplete {
                success: true,
                reading: self.latest.clone().map(Box::new),
            });
        }
        self.records_delivered = 0;
    }

    async fn on_reading_frame(&mut self) -> Result<(), StationError> {
        let body = self.read_body(READING_WIRE_SIZE).await?;
        let reading = decode_reading(&body)?;
        if self.readings_pending && self.station_up {
            self.readings_pending = false;
            self.context
                .emit(StationEvent::LoopComplete(Box::new(reading.clone())));
        }
        self.latest = Some(reading);
        Ok(())
    }
}

#[async_trait]
impl StationDriver for VirtualStation {
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn init(&mut self) -> Result<(), StationError> {
        let store = self.context.archive().clone();
        verify_archive_interval(store.as_ref(), self.interval)?;
        self.last_archive_time = store.newest()?.map_or(0, |r| r.date_time);

        self.medium.open().await?;
        self.send_request().await
    }

    async fn get_readings(&mut self) -> Result<(), StationError> {
        match &self.latest {
            Some(reading) if self.station_up => {
                self.context
                    .emit(StationEvent::LoopComplete(Box::new(reading.clone())));
            }
            _ => self.readings_pending = true,
        }
        Ok(())
    }

    async fn get_archive(&mut self) -> Result<(), StationError> {
        self.archive_requested = true;
        if !self.syncing {
            self.send_request().await?;
        }
        Ok(())
    }

    async fn data_indicate(&mut self) -> Result<(), StationError> {
        let frame_type = match self.read_frame_type().await {
            Ok(Some(frame_type)) => frame_type,
            Ok(None) => return Ok(()),
            Err(StationError::Transport(TransportError::Closed)) => {
                warn!("Datafeed server closed the connection, reconnecting");
                self.medium.restart().await?;
                return self.send_request().await;
            }
            Err(e) => return Err(e),
        };

        match frame_type {
            FrameType::Archive => self.on_archive_frame().await,
            FrameType::Reading => self.on_reading_frame().await,
            FrameType::ArchiveRequest => {
                // Only servers answer requests
                self.read_body(4).await?;
                Ok(())
            }
        }
    }

    async fn if_timer_expiry(&mut self) -> Result<(), StationError> {
        self.timer.stop();
        if !self.syncing {
            return Ok(());
        }

        self.timeouts += 1;
        if !self.station_up && self.timeouts >= MAX_REQUEST_TIMEOUTS {
            warn!(
                "Datafeed on {} did not answer {} requests, giving up",
                self.medium.describe(),
                self.timeouts
            );
            self.failed = true;
            self.syncing = false;
            self.context.emit(StationEvent::InitComplete {
                success: false,
                reading: None,
            });
            return Ok(());
        }

        warn!("Archive request unanswered, reconnecting to {}", self.medium.describe());
        self.medium.restart().await?;
        self.send_request().await
    }

    fn generates_archives(&self) -> bool {
        true
    }

    async fn wait_readable(&mut self) -> Result<(), StationError> {
        self.medium.readable().await?;
        Ok(())
    }

    fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    fn position(&self) -> StationPosition {
        self.position
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    async fn shutdown(&mut self) {
        self.timer.stop();
        self.medium.close().await;
        info!("Virtual station stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_archive, encode_reading};
    use crate::records::ArchiveRecord;
    use crate::storage::MemoryArchiveStore;
    use crate::transport::MockMedium;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    /// A datafeed server holding `records`, answering requests one at a time.
    fn server(records: Vec<ArchiveRecord>) -> MockMedium {
        let records = Arc::new(Mutex::new(records));
        MockMedium::with_responder(move |written| {
            if written.len() != 12 || written[..8] != FrameType::ArchiveRequest.marker() {
                return Vec::new();
            }
            let after = u32::from_be_bytes([written[8], written[9], written[10], written[11]]) as i32;
            let next = records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.date_time > after)
                .cloned()
                .unwrap_or_else(ArchiveRecord::zeroed);
            let mut reply = FrameType::Archive.marker().to_vec();
            reply.extend(encode_archive(&next));
            reply
        })
    }

    fn station(medium: MockMedium) -> (VirtualStation, tokio::sync::mpsc::UnboundedReceiver<StationEvent>) {
        let (context, events) = StationContext::channel(
            Arc::new(MemoryArchiveStore::new()),
            Arc::new(AtomicBool::new(true)),
        );
        let config = StationConfig {
            archive_interval: 5,
            ..StationConfig::default()
        };
        (VirtualStation::new(&config, Box::new(medium), context), events)
    }

    #[tokio::test]
    async fn test_archive_catch_up() {
        let records = vec![
            ArchiveRecord::new(1_700_000_100, 5),
            ArchiveRecord::new(1_700_000_400, 5),
        ];
        let (mut station, mut events) = station(server(records));
        station.init().await.unwrap();

        for _ in 0..3 {
            station.data_indicate().await.unwrap();
        }

        let mut times = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                StationEvent::Archive(Some(record)) => times.push(record.date_time),
                StationEvent::InitComplete { success, .. } => assert!(success),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(times, vec![1_700_000_100, 1_700_000_400]);
        assert!(station.timer_deadline().is_none());
    }

    #[tokio::test]
    async fn test_pushed_reading_answers_pending_request() {
        let (mut station, mut events) = station(server(Vec::new()));
        station.init().await.unwrap();
        station.data_indicate().await.unwrap();
        assert!(matches!(
            events.try_recv(),
            Ok(StationEvent::InitComplete { success: true, reading: None })
        ));

        station.get_readings().await.unwrap();
        assert!(events.try_recv().is_err());

        let mut reading = Reading::cleared();
        reading.out_temp = 55.5;
        let mut medium = MockMedium::new();
        medium.push_input(&FrameType::Reading.marker());
        medium.push_input(&encode_reading(&reading));
        medium.open().await.unwrap();
        station.medium = Box::new(medium);

        station.data_indicate().await.unwrap();
        match events.try_recv() {
            Ok(StationEvent::LoopComplete(received)) => assert_eq!(received.out_temp, 55.5),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
