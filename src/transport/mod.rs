// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport media for station hardware
//!
//! A [`Medium`] hides how bytes reach the station console:
//! - [`serial::SerialMedium`]: RS-232/USB serial adapters
//! - [`tcp::TcpMedium`]: serial-over-IP bridges and WeatherLink IP
//! - [`usbhid::UsbHidMedium`]: HID class consoles through Linux hidraw
//! - [`mock::MockMedium`]: scripted in-memory device for tests and emulation
//!
//! Every read is bounded by a timeout and returns exactly the requested
//! number of bytes or an error. A driver owns its medium exclusively.

pub mod mock;
pub mod serial;
pub mod tcp;
pub mod usbhid;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use crate::config::MediumKind;
use crate::config::MediumConfig;

pub use mock::{MockLog, MockMedium};
pub use serial::SerialMedium;
pub use tcp::TcpMedium;
pub use usbhid::UsbHidMedium;

/// Errors reported by a transport medium
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("read timed out after {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error("connection closed by peer")]
    Closed,

    #[error("medium is not open")]
    NotOpen,

    #[error("shutdown requested")]
    ShuttingDown,

    #[error("malformed HID report: {0}")]
    BadReport(String),

    #[error("background I/O task failed: {0}")]
    Task(String),

    #[error("medium lock poisoned")]
    Poisoned,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Which queue a flush discards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDirection {
    Input,
    Output,
    Both,
}

/// Byte transport between a driver and its station
#[async_trait]
pub trait Medium: Send {
    /// Open the underlying device or connection.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Fill `buf` completely or fail once `timeout` has elapsed.
    async fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError>;

    /// Write all of `data`, returning the number of bytes written.
    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Discard queued bytes.
    async fn flush(&mut self, direction: QueueDirection) -> Result<(), TransportError>;

    /// Wait until queued output has been transmitted.
    async fn drain(&mut self) -> Result<(), TransportError>;

    /// Close and reopen, retrying until it succeeds or shutdown is requested.
    async fn restart(&mut self) -> Result<(), TransportError>;

    /// Resolve once input is available.
    async fn readable(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self);

    fn is_open(&self) -> bool;

    fn kind(&self) -> MediumKind;

    /// Human readable description for logs.
    fn describe(&self) -> String;
}

/// Fixed-delay, unbounded reopen policy shared by the real media
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    running: Arc<AtomicBool>,
    delay: Duration,
}

impl RestartPolicy {
    pub fn new(running: Arc<AtomicBool>, delay: Duration) -> Self {
        Self { running, delay }
    }

    /// `false` once the daemon is shutting down.
    pub fn keep_trying(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Create the medium described by the configuration.
///
/// `running` is the daemon-wide flag checked by restart loops.
pub fn create_medium(config: &MediumConfig, running: Arc<AtomicBool>) -> Result<Box<dyn Medium>> {
    let policy = RestartPolicy::new(running, Duration::from_millis(config.restart_delay_ms));

    match config.kind {
        MediumKind::Serial => Ok(Box::new(SerialMedium::new(
            &config.device,
            config.baud_rate,
            policy,
        ))),
        MediumKind::Tcp => Ok(Box::new(TcpMedium::new(&config.host, config.port, policy))),
        MediumKind::UsbHid => Ok(Box::new(UsbHidMedium::new(
            &config.device,
            config.hid_framing,
            policy,
        ))),
        MediumKind::Mock => Ok(Box::new(MockMedium::new())),
        MediumKind::None => anyhow::bail!("medium kind 'none' does not provide a transport"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_none_medium() {
        let config = MediumConfig {
            kind: MediumKind::None,
            ..MediumConfig::default()
        };
        let running = Arc::new(AtomicBool::new(true));
        assert!(create_medium(&config, running).is_err());
    }

    #[test]
    fn test_factory_builds_serial_without_opening() {
        let config = MediumConfig {
            kind: MediumKind::Serial,
            device: "/dev/does-not-exist".to_string(),
            ..MediumConfig::default()
        };
        let running = Arc::new(AtomicBool::new(true));
        let medium = create_medium(&config, running).unwrap();
        assert!(!medium.is_open());
        assert!(medium.describe().contains("/dev/does-not-exist"));
    }
}
