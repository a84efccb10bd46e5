// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TCP medium for serial-over-IP bridges
//!
//! A lost connection is repaired in place: any read or write failure
//! reconnects (blocking the caller until the peer is back or shutdown is
//! requested) and then reports the failure, so the protocol layer restarts
//! its exchange on a fresh stream.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

use super::{Medium, MediumKind, QueueDirection, RestartPolicy, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Quiet time that ends an input flush.
const FLUSH_QUIET: Duration = Duration::from_millis(20);
const FLUSH_LIMIT: Duration = Duration::from_secs(1);

pub struct TcpMedium {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    policy: RestartPolicy,
}

impl TcpMedium {
    pub fn new(host: &str, port: u16, policy: RestartPolicy) -> Self {
        Self {
            host: host.to_string(),
            port,
            stream: None,
            policy,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }

    /// Reconnect after a failure, then hand the failure back.
    async fn fail_and_restart(&mut self, error: TransportError) -> TransportError {
        warn!("{}: {}", self.describe(), error);
        match self.restart().await {
            Ok(()) => error,
            Err(restart_error) => restart_error,
        }
    }
}

#[async_trait]
impl Medium for TcpMedium {
    async fn open(&mut self) -> Result<(), TransportError> {
        let address = (self.host.as_str(), self.port);
        let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(address)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out", self.host, self.port),
                )))
            }
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        info!("Connected to {}:{}", self.host, self.port);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8], wait: Duration) -> Result<(), TransportError> {
        let expected = buf.len();
        let deadline = Instant::now() + wait;
        let mut received = 0;

        while received < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout { expected, received });
            }

            let outcome = {
                let stream = self.stream()?;
                timeout(remaining, stream.read(&mut buf[received..])).await
            };

            match outcome {
                Err(_) => return Err(TransportError::Timeout { expected, received }),
                Ok(Ok(0)) => return Err(self.fail_and_restart(TransportError::Closed).await),
                Ok(Ok(n)) => received += n,
                Ok(Err(e)) => return Err(self.fail_and_restart(e.into()).await),
            }
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let outcome = {
            let stream = self.stream()?;
            stream.write_all(data).await
        };
        match outcome {
            Ok(()) => Ok(data.len()),
            Err(e) => Err(self.fail_and_restart(e.into()).await),
        }
    }

    async fn flush(&mut self, direction: QueueDirection) -> Result<(), TransportError> {
        if matches!(direction, QueueDirection::Output | QueueDirection::Both) {
            self.stream()?.flush().await?;
        }
        if matches!(direction, QueueDirection::Input | QueueDirection::Both) {
            let started = Instant::now();
            let mut scratch = [0u8; 256];
            let mut discarded = 0usize;
            while started.elapsed() < FLUSH_LIMIT {
                let outcome = {
                    let stream = self.stream()?;
                    timeout(FLUSH_QUIET, stream.read(&mut scratch)).await
                };
                match outcome {
                    Err(_) => break,
                    // A readable socket yielding nothing is a closed peer
                    Ok(Ok(0)) => return Err(self.fail_and_restart(TransportError::Closed).await),
                    Ok(Ok(n)) => discarded += n,
                    Ok(Err(e)) => return Err(self.fail_and_restart(e.into()).await),
                }
            }
            if discarded > 0 {
                debug!("Flushed {} stale bytes from {}", discarded, self.describe());
            }
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        // The kernel owns the socket send queue
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        self.close().await;

        while self.policy.keep_trying() {
            match self.open().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Reconnect to {}:{} failed ({}), retrying in {:?}",
                        self.host,
                        self.port,
                        e,
                        self.policy.delay()
                    );
                    self.policy.pause().await;
                }
            }
        }
        Err(TransportError::ShuttingDown)
    }

    async fn readable(&mut self) -> Result<(), TransportError> {
        self.stream()?.readable().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Closed connection to {}:{}", self.host, self.port);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn kind(&self) -> MediumKind {
        MediumKind::Tcp
    }

    fn describe(&self) -> String {
        format!("tcp {}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn policy() -> RestartPolicy {
        RestartPolicy::new(Arc::new(AtomicBool::new(true)), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_read_exact_assembles_segments() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"\n\r").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(b"OK").await.unwrap();
            let mut request = [0u8; 1];
            socket.read_exact(&mut request).await.unwrap();
            request[0]
        });

        let mut medium = TcpMedium::new("127.0.0.1", port, policy());
        medium.open().await.unwrap();
        let mut buf = [0u8; 4];
        medium.read_exact(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf, b"\n\rOK");

        medium.write_all(b"\r").await.unwrap();
        assert_eq!(server.await.unwrap(), b'\r');
    }

    #[tokio::test]
    async fn test_read_timeout_reports_partial_count() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0x06]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut medium = TcpMedium::new("127.0.0.1", port, policy());
        medium.open().await.unwrap();
        let mut buf = [0u8; 3];
        let err = medium
            .read_exact(&mut buf, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Timeout {
                expected: 3,
                received: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_flush_after_peer_close_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            let (mut second, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1];
            second.read_exact(&mut request).await.unwrap();
            request[0]
        });

        let mut medium = TcpMedium::new("127.0.0.1", port, policy());
        medium.open().await.unwrap();

        timeout(Duration::from_secs(2), medium.readable())
            .await
            .unwrap()
            .unwrap();
        let err = medium.flush(QueueDirection::Input).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(medium.is_open());

        medium.write_all(b"\r").await.unwrap();
        assert_eq!(server.await.unwrap(), b'\r');
    }

    #[tokio::test]
    async fn test_restart_stops_on_shutdown() {
        let running = Arc::new(AtomicBool::new(false));
        let mut medium = TcpMedium::new(
            "127.0.0.1",
            9,
            RestartPolicy::new(running, Duration::from_millis(10)),
        );
        assert!(matches!(
            medium.restart().await,
            Err(TransportError::ShuttingDown)
        ));
    }
}
