// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Vantage Pro serial protocol primitives
//!
//! [`ConsoleLink`] owns the transport and implements the console exchanges
//! (wake-up, acknowledged commands, CRC framed reads and writes). The
//! state machine in the parent module sequences them.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, warn};

use crate::station::StationError;
use crate::transport::{Medium, QueueDirection, TransportError};

pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x21;
pub const CANCEL: u8 = 0x1B;
pub const CR: u8 = 0x0D;
pub const LF: u8 = 0x0A;

/// Response timeout for serial and USB consoles.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(5000);
/// Response timeout for WeatherLink IP.
pub const RESPONSE_TIMEOUT_IP: Duration = Duration::from_millis(10000);

const WAKEUP_ATTEMPTS: u32 = 4;
const WAKEUP_FIRST_WAIT: Duration = Duration::from_millis(500);
const WAKEUP_NEXT_WAIT: Duration = Duration::from_millis(1200);
const WAKEUP_WAIT_IP: Duration = Duration::from_millis(2000);

const ACK_TIMEOUT: Duration = Duration::from_millis(2000);
const EEPROM_TIMEOUT: Duration = Duration::from_millis(3000);
const RXCHECK_TIMEOUT: Duration = Duration::from_millis(2000);

/// CRC-CCITT (polynomial 0x1021, initial value 0) as used by the console.
pub fn crc_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let mut crc = crc ^ ((byte as u16) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// A frame that ends with its big-endian CRC checks to zero.
pub fn crc_valid(frame: &[u8]) -> bool {
    crc_ccitt(frame) == 0
}

/// Append the big-endian CRC of `data`.
pub fn with_crc(data: &[u8]) -> Vec<u8> {
    let crc = crc_ccitt(data);
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// Console packed date: day + month * 32 + (year - 2000) * 512.
pub fn pack_date(date: NaiveDate) -> u16 {
    let year = (date.year() - 2000).clamp(0, 127) as u16;
    date.day() as u16 + (date.month() as u16) * 32 + year * 512
}

/// Console packed time: hour * 100 + minute.
pub fn pack_time(hour: u32, minute: u32) -> u16 {
    (hour * 100 + minute) as u16
}

/// Inverse of [`pack_date`] / [`pack_time`]; `None` for blank or invalid values.
pub fn unpack_date_time(date: u16, time: u16) -> Option<NaiveDateTime> {
    if date == 0xFFFF || time == 0xFFFF {
        return None;
    }
    let day = (date & 0x1F) as u32;
    let month = ((date >> 5) & 0x0F) as u32;
    let year = 2000 + (date >> 9) as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt((time / 100) as u32, (time % 100) as u32, 0)
}

/// Packed date and time of a local timestamp.
pub fn pack_date_time(local: &NaiveDateTime) -> (u16, u16) {
    (pack_date(local.date()), pack_time(local.hour(), local.minute()))
}

/// Rain collector resolution from the setup byte at EEPROM 0x2B.
pub fn rain_ticks_per_inch(setup: u8) -> f32 {
    match setup & 0x30 {
        0x10 => 127.0,
        0x20 => 254.0,
        _ => 100.0,
    }
}

/// Reception counters reported by `RXCHECK`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxCounters {
    pub good: i64,
    pub missed: i64,
    pub crc_errors: i64,
}

/// Parse the `RXCHECK` payload: good, missed, resyncs, longest run, CRC errors.
pub fn parse_rx_check(line: &str) -> Option<RxCounters> {
    let fields: Vec<i64> = line
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 5 {
        return None;
    }
    let mut crc_errors = fields[4];
    if crc_errors < 0 {
        crc_errors += 65536;
    }
    Some(RxCounters {
        good: fields[0],
        missed: fields[1],
        crc_errors,
    })
}

/// Reception percentage since the previous counters, or `None` when the
/// console counters were reset.
pub fn rx_check_percent(previous: &RxCounters, current: &RxCounters) -> Option<u16> {
    let good = current.good - previous.good;
    let missed = current.missed - previous.missed;
    let crc = current.crc_errors - previous.crc_errors;
    if good < 0 || missed < 0 || crc < 0 {
        return None;
    }
    let total = good + missed + crc;
    if total > 0 {
        Some((100 * good / total) as u16)
    } else {
        Some(100)
    }
}

/// Transport plus the console conversation rules
pub struct ConsoleLink {
    medium: Box<dyn Medium>,
    is_weatherlink_ip: bool,
}

impl ConsoleLink {
    pub fn new(medium: Box<dyn Medium>, is_weatherlink_ip: bool) -> Self {
        Self {
            medium,
            is_weatherlink_ip,
        }
    }

    pub fn describe(&self) -> String {
        self.medium.describe()
    }

    pub fn response_timeout(&self) -> Duration {
        if self.is_weatherlink_ip {
            RESPONSE_TIMEOUT_IP
        } else {
            RESPONSE_TIMEOUT
        }
    }

    pub async fn open(&mut self) -> Result<(), StationError> {
        self.medium.open().await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.medium.close().await;
    }

    pub async fn readable(&mut self) -> Result<(), StationError> {
        self.medium.readable().await?;
        Ok(())
    }

    /// Discard pending input.
    pub async fn flush(&mut self) {
        if let Err(e) = self.medium.flush(QueueDirection::Input).await {
            debug!("Input flush failed on {}: {}", self.medium.describe(), e);
        }
    }

    /// Wake the console: CR answered by LF CR. After the last failed
    /// attempt the transport is restarted.
    pub async fn wakeup(&mut self) -> Result<(), StationError> {
        for attempt in 0..WAKEUP_ATTEMPTS {
            self.flush().await;
            self.medium.write_all(&[CR]).await?;

            let wait = if self.is_weatherlink_ip {
                WAKEUP_WAIT_IP
            } else if attempt == 0 {
                WAKEUP_FIRST_WAIT
            } else {
                WAKEUP_NEXT_WAIT
            };

            let mut reply = [0u8; 2];
            match self.medium.read_exact(&mut reply, wait).await {
                Ok(()) if reply == [LF, CR] => return Ok(()),
                Ok(()) => debug!("Wake-up attempt {}: unexpected reply {:02x?}", attempt + 1, reply),
                Err(e) if e.is_timeout() => {}
                Err(TransportError::ShuttingDown) => return Err(TransportError::ShuttingDown.into()),
                Err(e) => debug!("Wake-up attempt {}: {}", attempt + 1, e),
            }
        }

        warn!("Console on {} did not wake up, restarting transport", self.describe());
        self.medium.restart().await?;
        Err(StationError::WakeupFailed {
            attempts: WAKEUP_ATTEMPTS,
        })
    }

    /// Write a text command terminated by LF.
    pub async fn send_command(&mut self, command: &str) -> Result<(), StationError> {
        self.send_command_with(command, LF).await
    }

    async fn send_command_with(&mut self, command: &str, terminator: u8) -> Result<(), StationError> {
        let mut bytes = Vec::with_capacity(command.len() + 1);
        bytes.extend_from_slice(command.as_bytes());
        bytes.push(terminator);
        self.medium.write_all(&bytes).await?;
        debug!("Sent {}", command);
        Ok(())
    }

    pub async fn send_byte(&mut self, byte: u8) -> Result<(), StationError> {
        self.medium.write_all(&[byte]).await?;
        Ok(())
    }

    /// Write `data` followed by its CRC and wait for the transmit queue.
    pub async fn write_with_crc(&mut self, data: &[u8]) -> Result<(), StationError> {
        self.medium.write_all(&with_crc(data)).await?;
        self.medium.drain().await?;
        Ok(())
    }

    /// Read one byte and require an ACK. Stray CR and LF bytes echoed by
    /// terminal servers are skipped.
    pub async fn expect_ack(&mut self, command: &str, timeout: Duration) -> Result<(), StationError> {
        let mut byte = [0u8; 1];
        loop {
            if let Err(e) = self.medium.read_exact(&mut byte, timeout).await {
                self.flush().await;
                return Err(e.into());
            }
            if byte[0] != LF && byte[0] != CR {
                break;
            }
        }

        if byte[0] != ACK {
            self.flush().await;
            return Err(StationError::unexpected(
                command,
                format!("expected ACK, got {:#04x}", byte[0]),
            ));
        }
        Ok(())
    }

    /// Read `len` bytes (payload plus CRC) and verify the CRC.
    pub async fn read_with_crc(
        &mut self,
        len: usize,
        timeout: Duration,
        what: &'static str,
    ) -> Result<Vec<u8>, StationError> {
        let mut frame = vec![0u8; len];
        if let Err(e) = self.medium.read_exact(&mut frame, timeout).await {
            self.flush().await;
            return Err(e.into());
        }
        if !crc_valid(&frame) {
            self.flush().await;
            return Err(StationError::Checksum(what));
        }
        Ok(frame)
    }

    /// `EEBRD addr len`: returns the `len` EEPROM bytes.
    pub async fn read_eeprom(&mut self, address: u8, len: usize) -> Result<Vec<u8>, StationError> {
        let command = format!("EEBRD {:02X} {}", address, len);
        self.send_command(&command).await?;
        self.expect_ack(&command, EEPROM_TIMEOUT).await?;
        let mut frame = self.read_with_crc(len + 2, EEPROM_TIMEOUT, "EEPROM read").await?;
        frame.truncate(len);
        Ok(frame)
    }

    /// `EEBWR addr len` followed by the CRC framed data.
    pub async fn write_eeprom(&mut self, address: u8, data: &[u8]) -> Result<(), StationError> {
        let command = format!("EEBWR {:02X} {}", address, data.len());
        self.send_command(&command).await?;
        self.expect_ack(&command, ACK_TIMEOUT).await?;
        self.write_with_crc(data).await?;
        self.expect_ack(&command, ACK_TIMEOUT).await
    }

    /// `RXCHECK`: reception counters of the console.
    pub async fn rx_check(&mut self) -> Result<RxCounters, StationError> {
        self.send_command_with("RXCHECK", CR).await?;

        // LF CR "OK" LF CR
        let mut banner = [0u8; 6];
        if let Err(e) = self.medium.read_exact(&mut banner, RXCHECK_TIMEOUT).await {
            self.flush().await;
            return Err(e.into());
        }

        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        while line.len() < 63 {
            self.medium.read_exact(&mut byte, RXCHECK_TIMEOUT).await?;
            if byte[0] == CR {
                break;
            }
            if byte[0] != LF {
                line.push(byte[0]);
            }
        }

        let text = String::from_utf8_lossy(&line);
        parse_rx_check(&text)
            .ok_or_else(|| StationError::unexpected("RXCHECK", format!("malformed reply {:?}", text)))
    }

    /// `SETTIME` with a local date and time.
    pub async fn set_time(&mut self, local: &NaiveDateTime) -> Result<(), StationError> {
        self.send_command("SETTIME").await?;
        self.expect_ack("SETTIME", ACK_TIMEOUT).await?;
        let payload = [
            local.second() as u8,
            local.minute() as u8,
            local.hour() as u8,
            local.day() as u8,
            local.month() as u8,
            (local.year() - 1900).clamp(0, 255) as u8,
        ];
        self.medium.write_all(&with_crc(&payload)).await?;
        self.expect_ack("SETTIME", ACK_TIMEOUT).await
    }

    /// Program a fixed GMT offset with DST handling disabled.
    pub async fn set_gmt_offset(&mut self, minutes_east: i32) -> Result<(), StationError> {
        let hhmm = ((minutes_east / 60) * 100 + minutes_east % 60) as i16;
        let offset = hhmm.to_le_bytes();
        // manual DST, DST off, offset, use GMT offset
        let payload = [1, 0, offset[0], offset[1], 1];
        self.write_eeprom(0x12, &payload).await
    }
}
