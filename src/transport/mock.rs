// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory scripted medium
//!
//! The "device" is a responder closure: every chunk written to the medium
//! is handed to it and whatever it returns becomes readable input. With no
//! responder the device is silent, which is how tests model a station that
//! stopped answering.
//!
//! Reads never wait: a read that cannot be satisfied consumes what is
//! queued and fails with [`TransportError::Timeout`] immediately, so state
//! machine tests run without wall-clock delays.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Medium, MediumKind, QueueDirection, TransportError};

/// Device side of the mock: maps written bytes to the reply.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Debug, Default)]
struct MockLogInner {
    writes: Vec<Vec<u8>>,
    opens: usize,
    restarts: usize,
    input_flushes: usize,
}

/// Shared record of what a [`MockMedium`] was asked to do
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    inner: Arc<Mutex<MockLogInner>>,
}

impl MockLog {
    fn lock(&self) -> MutexGuard<'_, MockLogInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every chunk written, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn bytes_written(&self) -> usize {
        self.lock().writes.iter().map(Vec::len).sum()
    }

    /// `true` if some written chunk starts with `prefix`.
    pub fn wrote(&self, prefix: &[u8]) -> bool {
        self.lock().writes.iter().any(|w| w.starts_with(prefix))
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn restarts(&self) -> usize {
        self.lock().restarts
    }

    pub fn input_flushes(&self) -> usize {
        self.lock().input_flushes
    }
}

pub struct MockMedium {
    input: VecDeque<u8>,
    responder: Option<Responder>,
    log: MockLog,
    open: bool,
}

impl Default for MockMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMedium {
    /// A medium whose device never answers.
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            responder: None,
            log: MockLog::default(),
            open: false,
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Handle for inspecting the traffic after the medium moved into a driver.
    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    /// Queue unsolicited input.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }
}

#[async_trait]
impl Medium for MockMedium {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        self.log.lock().opens += 1;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let expected = buf.len();
        if self.input.len() < expected {
            let received = self.input.len();
            self.input.clear();
            return Err(TransportError::Timeout { expected, received });
        }
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..expected)) {
            *slot = byte;
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.log.lock().writes.push(data.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(data);
            self.input.extend(reply);
        }
        Ok(data.len())
    }

    async fn flush(&mut self, direction: QueueDirection) -> Result<(), TransportError> {
        if matches!(direction, QueueDirection::Input | QueueDirection::Both) {
            self.input.clear();
            self.log.lock().input_flushes += 1;
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        self.input.clear();
        self.open = true;
        self.log.lock().restarts += 1;
        Ok(())
    }

    async fn readable(&mut self) -> Result<(), TransportError> {
        if self.input.is_empty() {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
        self.input.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn kind(&self) -> MediumKind {
        MediumKind::Mock
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responder_feeds_input() {
        let mut medium = MockMedium::with_responder(|written| {
            if written == b"\r" {
                b"\n\r".to_vec()
            } else {
                Vec::new()
            }
        });
        let log = medium.log();
        medium.open().await.unwrap();
        medium.write_all(b"\r").await.unwrap();

        let mut buf = [0u8; 2];
        medium.read_exact(&mut buf, Duration::from_millis(1)).await.unwrap();
        assert_eq!(&buf, b"\n\r");
        assert!(log.wrote(b"\r"));
        assert_eq!(log.opens(), 1);
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let mut medium = MockMedium::new();
        medium.open().await.unwrap();
        medium.push_input(&[0x06]);
        let mut buf = [0u8; 2];
        let err = medium
            .read_exact(&mut buf, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { expected: 2, received: 1 }));
    }
}
