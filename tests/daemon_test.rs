// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_weather_station::codec::{
    decode_archive, decode_reading, FrameType, ARCHIVE_WIRE_SIZE, READING_WIRE_SIZE,
    START_FRAME_LENGTH,
};
use rust_weather_station::codec::frame::classify_start_frame;
use rust_weather_station::config::{Config, MediumKind, StationType};
use rust_weather_station::daemon::{Daemon, StationStats, StationTask};
use rust_weather_station::records::{is_null, ArchiveRecord, Reading};
use rust_weather_station::station::{create_station_driver, StationContext};
use rust_weather_station::storage::{ArchiveStore, MemoryArchiveStore};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

enum Frame {
    Reading(Reading),
    Archive(ArchiveRecord),
}

async fn read_frame(stream: &mut TcpStream) -> Result<Frame> {
    let mut marker = [0u8; START_FRAME_LENGTH];
    stream.read_exact(&mut marker).await?;
    match classify_start_frame(&marker)? {
        FrameType::Reading => {
            let mut body = vec![0u8; READING_WIRE_SIZE];
            stream.read_exact(&mut body).await?;
            Ok(Frame::Reading(decode_reading(&body)?))
        }
        FrameType::Archive => {
            let mut body = vec![0u8; ARCHIVE_WIRE_SIZE];
            stream.read_exact(&mut body).await?;
            Ok(Frame::Archive(decode_archive(&body)?))
        }
        other => anyhow::bail!("unexpected {:?} frame", other),
    }
}

fn simulator_config(archive_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.archive_path = archive_path.to_string_lossy().into_owned();
    config.datafeed.enabled = true;
    config.datafeed.port = 0;
    config.daemon.poll_interval_secs = 1;
    config.daemon.heartbeat_interval_secs = 1;
    config
}

#[tokio::test]
async fn test_simulator_first_reading() -> Result<()> {
    let config = Config::default();
    let store: Arc<dyn ArchiveStore> = Arc::new(MemoryArchiveStore::new());
    let running = Arc::new(AtomicBool::new(true));
    let (context, events) = StationContext::channel(store.clone(), running.clone());
    let driver = create_station_driver(&config.station, &config.calibration, context)?;
    let (feed, mut subscriber) = broadcast::channel(4);

    let task = StationTask::new(
        driver,
        events,
        store,
        feed,
        running,
        Arc::new(StationStats::default()),
        config.station.archive_interval,
        &config.daemon,
    );
    let reading = timeout(Duration::from_secs(10), task.first_reading()).await??;

    assert!(!is_null(reading.out_temp));
    assert!(reading.out_humidity <= 100);
    assert!(reading.wind_dir < 360);
    // Published as well
    assert!(subscriber.try_recv().is_ok());
    Ok(())
}

#[tokio::test]
async fn test_daemon_serves_datafeed() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = simulator_config(&temp_dir.path().join("archive.wxa"));

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let addr = daemon.datafeed_addr().expect("datafeed enabled");
    let stats = daemon.stats();

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(&FrameType::ArchiveRequest.marker()).await?;
    client.write_u32(0).await?;

    let mut saw_reading = false;
    let mut saw_answer = false;
    timeout(Duration::from_secs(10), async {
        while !(saw_reading && saw_answer) {
            match read_frame(&mut client).await? {
                Frame::Reading(reading) => {
                    assert!(!is_null(reading.out_temp));
                    saw_reading = true;
                }
                Frame::Archive(record) => {
                    // Empty archive answers with a zeroed record
                    assert_eq!(record.date_time, 0);
                    saw_answer = true;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .await??;

    assert!(stats.readings.load(Ordering::Relaxed) >= 1);
    daemon.shutdown();
    timeout(Duration::from_secs(10), daemon.join()).await??;
    Ok(())
}

#[tokio::test]
async fn test_virtual_station_follows_datafeed() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = simulator_config(&temp_dir.path().join("upstream.wxa"));
    let mut upstream = Daemon::new();
    upstream.launch(&config).await?;
    let addr: SocketAddr = upstream.datafeed_addr().expect("datafeed enabled");

    let mut follower = Config::default();
    follower.station.station_type = StationType::Virtual;
    follower.station.medium.kind = MediumKind::Tcp;
    follower.station.medium.host = addr.ip().to_string();
    follower.station.medium.port = addr.port();
    follower.daemon.poll_interval_secs = 1;

    let store: Arc<dyn ArchiveStore> = Arc::new(MemoryArchiveStore::new());
    let running = Arc::new(AtomicBool::new(true));
    let (context, events) = StationContext::channel(store.clone(), running.clone());
    let driver = create_station_driver(&follower.station, &follower.calibration, context)?;
    let (feed, _) = broadcast::channel(4);
    let task = StationTask::new(
        driver,
        events,
        store,
        feed,
        running,
        Arc::new(StationStats::default()),
        follower.station.archive_interval,
        &follower.daemon,
    );

    let reading = timeout(Duration::from_secs(15), task.first_reading()).await??;
    assert!(!is_null(reading.out_temp));

    upstream.shutdown();
    timeout(Duration::from_secs(10), upstream.join()).await??;
    Ok(())
}
