// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Datafeed TCP server
//!
//! One task accepts connections; each client gets a reader task that
//! parses archive requests and a writer loop that interleaves the answers
//! with the broadcast feed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use crate::codec::frame::classify_start_frame;
use crate::codec::{FrameType, START_FRAME_LENGTH};
use crate::records::ArchiveRecord;
use crate::storage::ArchiveStore;

use super::{archive_frame, FeedItem};

/// How often the accept loop checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

pub struct DatafeedServer {
    listener: TcpListener,
    store: Arc<dyn ArchiveStore>,
    feed: broadcast::Sender<FeedItem>,
    running: Arc<AtomicBool>,
}

impl DatafeedServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(
        address: &str,
        port: u16,
        store: Arc<dyn ArchiveStore>,
        feed: broadcast::Sender<FeedItem>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .with_context(|| format!("Failed to bind datafeed server to {}:{}", address, port))?;
        Ok(Self {
            listener,
            store,
            feed,
            running,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until shutdown.
    pub async fn run(self) -> Result<()> {
        info!("Datafeed server listening on {}", self.local_addr()?);

        while self.running.load(Ordering::SeqCst) {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = tokio::time::sleep(SHUTDOWN_POLL) => continue,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!("Datafeed client connected from {}", peer);
                    let store = self.store.clone();
                    let feed = self.feed.subscribe();
                    let running = self.running.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, store, feed, running).await {
                            debug!("Datafeed client {}: {:#}", peer, e);
                        }
                        info!("Datafeed client {} disconnected", peer);
                    });
                }
                Err(e) => {
                    error!("Datafeed accept failed: {}", e);
                    tokio::time::sleep(SHUTDOWN_POLL).await;
                }
            }
        }

        info!("Datafeed server stopped");
        Ok(())
    }
}

/// Read archive requests until the client disconnects or sends garbage.
async fn read_requests(mut reader: OwnedReadHalf, requests: mpsc::Sender<i32>) -> Result<()> {
    let mut marker = [0u8; START_FRAME_LENGTH];
    loop {
        reader.read_exact(&mut marker).await?;
        match classify_start_frame(&marker)? {
            FrameType::ArchiveRequest => {
                let after = reader.read_u32().await? as i32;
                if requests.send(after).await.is_err() {
                    return Ok(());
                }
            }
            other => warn!("Ignoring {:?} frame sent by a datafeed client", other),
        }
    }
}

/// The first stored record newer than `after`, zeroed when there is none.
fn answer_request(store: &dyn ArchiveStore, after: i32) -> ArchiveRecord {
    match store.next_after(after) {
        Ok(Some(record)) => record,
        Ok(None) => ArchiveRecord::zeroed(),
        Err(e) => {
            warn!("Archive lookup after {} failed: {}", after, e);
            ArchiveRecord::zeroed()
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    store: Arc<dyn ArchiveStore>,
    mut feed: broadcast::Receiver<FeedItem>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let (request_tx, mut requests) = mpsc::channel(16);
    let reader_task = tokio::spawn(read_requests(reader, request_tx));

    let result = async {
        while running.load(Ordering::SeqCst) {
            let frame = tokio::select! {
                request = requests.recv() => match request {
                    Some(after) => archive_frame(&answer_request(store.as_ref(), after)),
                    None => break,
                },
                item = feed.recv() => match item {
                    Ok(item) => item.to_frame(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Datafeed client too slow, {} items skipped", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(SHUTDOWN_POLL) => continue,
            };
            writer.write_all(&frame).await?;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    reader_task.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_archive, ARCHIVE_WIRE_SIZE};
    use crate::storage::MemoryArchiveStore;

    #[tokio::test]
    async fn test_archive_request_over_loopback() {
        let store = Arc::new(MemoryArchiveStore::with_records(vec![
            ArchiveRecord::new(1_000, 5),
            ArchiveRecord::new(1_300, 5),
        ])
        .unwrap());
        let (feed, _) = broadcast::channel(8);
        let running = Arc::new(AtomicBool::new(true));
        let server = DatafeedServer::bind("127.0.0.1", 0, store, feed, running.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut reply = vec![0u8; START_FRAME_LENGTH + ARCHIVE_WIRE_SIZE];
        for (after, expected) in [(1_000, 1_300), (1_300, 0)] {
            client.write_all(&FrameType::ArchiveRequest.marker()).await.unwrap();
            client.write_u32(after as u32).await.unwrap();
            client.read_exact(&mut reply).await.unwrap();
            assert_eq!(&reply[..8], &FrameType::Archive.marker());
            assert_eq!(decode_archive(&reply[8..]).unwrap().date_time, expected);
        }

        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();
    }
}
