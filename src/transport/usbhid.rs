// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! USB-HID medium over a Linux hidraw node
//!
//! HID consoles exchange fixed 8-byte reports. Output is split into 8-byte
//! reports, the last one zero padded. Input reports are either raw payload
//! or length prefixed (first byte = number of valid payload bytes, at most
//! seven), depending on the station.
//!
//! A report consumed by [`Medium::readable`] is kept in the pending buffer
//! and served by the next read.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};

use super::{Medium, MediumKind, QueueDirection, RestartPolicy, TransportError};

pub const HID_REPORT_SIZE: usize = 8;

const FLUSH_QUIET: Duration = Duration::from_millis(20);

/// Layout of the input reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HidFraming {
    /// Every byte of the report is payload
    #[default]
    Raw,
    /// First byte holds the payload length
    LengthPrefixed,
}

/// Extract the payload of one input report.
pub fn report_payload(report: &[u8], framing: HidFraming) -> Result<&[u8], TransportError> {
    match framing {
        HidFraming::Raw => Ok(report),
        HidFraming::LengthPrefixed => {
            let Some((&len, payload)) = report.split_first() else {
                return Ok(&[]);
            };
            let len = len as usize;
            if len > HID_REPORT_SIZE - 1 || len > payload.len() {
                return Err(TransportError::BadReport(format!(
                    "length byte {} in a {}-byte report",
                    len,
                    report.len()
                )));
            }
            Ok(&payload[..len])
        }
    }
}

/// Split outgoing bytes into zero-padded reports.
pub fn to_reports(data: &[u8]) -> Vec<[u8; HID_REPORT_SIZE]> {
    data.chunks(HID_REPORT_SIZE)
        .map(|chunk| {
            let mut report = [0u8; HID_REPORT_SIZE];
            report[..chunk.len()].copy_from_slice(chunk);
            report
        })
        .collect()
}

pub struct UsbHidMedium {
    path: PathBuf,
    framing: HidFraming,
    file: Option<File>,
    pending: VecDeque<u8>,
    policy: RestartPolicy,
}

impl UsbHidMedium {
    pub fn new(path: &str, framing: HidFraming, policy: RestartPolicy) -> Self {
        Self {
            path: PathBuf::from(path),
            framing,
            file: None,
            pending: VecDeque::new(),
            policy,
        }
    }

    /// Read one report and queue its payload.
    async fn read_report(&mut self) -> Result<(), TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        let mut report = [0u8; HID_REPORT_SIZE];
        let n = file.read(&mut report).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        let payload = report_payload(&report[..n], self.framing)?;
        self.pending.extend(payload.iter().copied());
        Ok(())
    }
}

#[async_trait]
impl Medium for UsbHidMedium {
    async fn open(&mut self) -> Result<(), TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await?;
        self.file = Some(file);
        self.pending.clear();
        info!("Opened HID device {}", self.path.display());
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8], wait: Duration) -> Result<(), TransportError> {
        let expected = buf.len();
        let deadline = Instant::now() + wait;

        while self.pending.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = self.pending.len();
            if remaining.is_zero() {
                return Err(TransportError::Timeout { expected, received });
            }
            match timeout(remaining, self.read_report()).await {
                Err(_) => return Err(TransportError::Timeout { expected, received }),
                Ok(result) => result?,
            }
        }

        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..expected)) {
            *slot = byte;
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        for report in to_reports(data) {
            file.write_all(&report).await?;
        }
        file.flush().await?;
        Ok(data.len())
    }

    async fn flush(&mut self, direction: QueueDirection) -> Result<(), TransportError> {
        if matches!(direction, QueueDirection::Input | QueueDirection::Both) {
            self.pending.clear();
            while let Ok(result) = timeout(FLUSH_QUIET, self.read_report()).await {
                result?;
                self.pending.clear();
            }
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        self.close().await;
        while self.policy.keep_trying() {
            match self.open().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Reopening {} failed ({}), retrying in {:?}",
                        self.path.display(),
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
        while self.pending.is_empty() {
            self.read_report().await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed HID device {}", self.path.display());
        }
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn kind(&self) -> MediumKind {
        MediumKind::UsbHid
    }

    fn describe(&self) -> String {
        format!("usb-hid {}", self.path.display())
    }
}
