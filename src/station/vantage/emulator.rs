// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Vantage Pro console emulator
//!
//! Answers the console protocol on the device side of a
//! [`MockMedium`](crate::transport::MockMedium): wake-up, EEPROM reads,
//! LOOP, DMPAFT downloads, RXCHECK and SETTIME. Faults (a silent console,
//! a corrupted archive page or dump header) are injected through [`EmulatorControl`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use log::debug;

use crate::transport::MockMedium;

use super::archive_page::{ArchivePage, ConsoleRecord, DumpHeader, RECORDS_PER_PAGE};
use super::loop_packet::LoopPacket;
use super::protocol::{crc_valid, pack_date_time, unpack_date_time, with_crc, ACK, CANCEL, CR, LF, NAK};

/// Records kept by a real console data logger.
const LOGGER_CAPACITY: usize = 2560;

#[derive(Debug, Default)]
struct ControlInner {
    silent: AtomicBool,
    corrupt: Mutex<Option<(usize, usize)>>,
    header: Mutex<Option<DumpHeader>>,
    clock_sets: AtomicUsize,
    dump_requests: AtomicUsize,
    loop_requests: AtomicUsize,
}

/// Handle for steering an emulator after it moved into a medium
#[derive(Debug, Clone, Default)]
pub struct EmulatorControl {
    inner: Arc<ControlInner>,
}

impl EmulatorControl {
    /// Stop (or resume) answering anything.
    pub fn set_silent(&self, silent: bool) {
        self.inner.silent.store(silent, Ordering::SeqCst);
    }

    fn is_silent(&self) -> bool {
        self.inner.silent.load(Ordering::SeqCst)
    }

    /// Flip one byte of the given page of the next download.
    pub fn corrupt_page(&self, page: usize, offset: usize) {
        if let Ok(mut corrupt) = self.inner.corrupt.lock() {
            *corrupt = Some((page, offset));
        }
    }

    fn take_corruption(&self, page: usize) -> Option<usize> {
        let mut corrupt = self.inner.corrupt.lock().ok()?;
        match *corrupt {
            Some((target, offset)) if target == page => {
                *corrupt = None;
                Some(offset)
            }
            _ => None,
        }
    }

    /// Announce these values in the next dump header instead of the real ones.
    pub fn override_dump_header(&self, pages: u16, first_record_index: u16) {
        if let Ok(mut header) = self.inner.header.lock() {
            *header = Some(DumpHeader {
                pages,
                first_record_index,
            });
        }
    }

    fn take_header_override(&self) -> Option<DumpHeader> {
        self.inner.header.lock().ok()?.take()
    }

    pub fn clock_sets(&self) -> usize {
        self.inner.clock_sets.load(Ordering::SeqCst)
    }

    pub fn dump_requests(&self) -> usize {
        self.inner.dump_requests.load(Ordering::SeqCst)
    }

    pub fn loop_requests(&self) -> usize {
        self.inner.loop_requests.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum Mode {
    Idle,
    AwaitDumpTime,
    Dumping { pages: Vec<Vec<u8>>, next: usize },
    AwaitSetTime,
    AwaitEepromData(usize),
}

/// A console record for `at` with plausible fair-weather values.
pub fn sample_record(at: NaiveDateTime, out_temp_tenths: i16) -> ConsoleRecord {
    let (date, time) = pack_date_time(&at);
    ConsoleRecord {
        date,
        time,
        out_temp: out_temp_tenths,
        high_out_temp: out_temp_tenths + 4,
        low_out_temp: out_temp_tenths - 4,
        rain: 0x1000,
        high_rain_rate: 0,
        barometer: 29_921,
        radiation: 0x7FFF,
        wind_samples: 110,
        in_temp: 702,
        in_humidity: 41,
        out_humidity: 63,
        avg_wind_speed: 4,
        high_wind_speed: 9,
        high_wind_dir: 5,
        prev_wind_dir: 4,
        uv: 0xFF,
        et: 0,
        high_radiation: 0x7FFF,
        high_uv: 0xFF,
        forecast_rule: 45,
        record_type: 0,
        ..ConsoleRecord::blank()
    }
}

/// A LOOP packet from a console with the integrated sensor suite only.
pub fn sample_loop() -> LoopPacket {
    LoopPacket {
        barometer: 29_921,
        in_temp: 702,
        in_humidity: 41,
        out_temp: 655,
        wind_speed: 4,
        ten_minute_avg_wind_speed: 3,
        wind_dir: 95,
        out_humidity: 63,
        rain_rate: 0,
        day_rain: 0,
        tx_battery_status: 0,
        cons_battery_voltage: 765,
        forecast_icon: 8,
        forecast_rule: 45,
        ..LoopPacket::default()
    }
}

pub struct VantageEmulator {
    interval: u8,
    rain_setup: u8,
    latitude: i16,
    longitude: i16,
    elevation: i16,
    records: Vec<ConsoleRecord>,
    live_history: bool,
    first_record_offset: usize,
    loop_packet: LoopPacket,
    mode: Mode,
    control: EmulatorControl,
}

impl VantageEmulator {
    pub fn new(interval: u8) -> Self {
        Self {
            interval: interval.max(1),
            rain_setup: 0x00,
            latitude: 0,
            longitude: 0,
            elevation: 0,
            records: Vec::new(),
            live_history: false,
            first_record_offset: 0,
            loop_packet: sample_loop(),
            mode: Mode::Idle,
            control: EmulatorControl::default(),
        }
    }

    /// Log the given records, oldest first.
    pub fn with_records(mut self, records: Vec<ConsoleRecord>) -> Self {
        self.records = records;
        self
    }

    /// Synthesize a record for every interval boundary up to now.
    pub fn with_live_history(mut self) -> Self {
        self.live_history = true;
        self
    }

    /// Place the first new record at this index of the first page.
    pub fn with_first_record_offset(mut self, offset: usize) -> Self {
        self.first_record_offset = offset.min(RECORDS_PER_PAGE - 1);
        self
    }

    pub fn with_rain_collector(mut self, setup: u8) -> Self {
        self.rain_setup = setup;
        self
    }

    /// Latitude and longitude in tenths of a degree, elevation in feet.
    pub fn with_position(mut self, latitude: i16, longitude: i16, elevation: i16) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self.elevation = elevation;
        self
    }

    pub fn with_loop(mut self, packet: LoopPacket) -> Self {
        self.loop_packet = packet;
        self
    }

    pub fn control(&self) -> EmulatorControl {
        self.control.clone()
    }

    pub fn into_medium(mut self) -> MockMedium {
        MockMedium::with_responder(move |written| self.respond(written))
    }

    /// Device reply to one written chunk.
    pub fn respond(&mut self, written: &[u8]) -> Vec<u8> {
        if self.control.is_silent() {
            return Vec::new();
        }

        match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::AwaitDumpTime => return self.dump_header(written),
            Mode::AwaitSetTime => {
                if written.len() == 8 && crc_valid(written) {
                    self.control.inner.clock_sets.fetch_add(1, Ordering::SeqCst);
                    return vec![ACK];
                }
                return vec![NAK];
            }
            Mode::AwaitEepromData(len) => {
                if written.len() == len + 2 && crc_valid(written) {
                    return vec![ACK];
                }
                return vec![NAK];
            }
            Mode::Dumping { pages, next } => match written {
                [ACK] => return self.next_page(pages, next),
                [CANCEL] => return Vec::new(),
                _ => {}
            },
            Mode::Idle => {}
        }

        self.command(written)
    }

    fn command(&mut self, written: &[u8]) -> Vec<u8> {
        if written == [CR] {
            return vec![LF, CR];
        }
        if written == [CANCEL] || written == [ACK] {
            return Vec::new();
        }

        let text = String::from_utf8_lossy(written);
        let command = text.trim_end_matches(['\n', '\r']);
        debug!("Emulated console received {:?}", command);

        match command {
            "LOOP 1" => {
                self.control.inner.loop_requests.fetch_add(1, Ordering::SeqCst);
                let mut reply = vec![ACK];
                reply.extend(self.loop_packet.to_bytes());
                reply
            }
            "EEBRD 2D 1" => Self::ack_with(&with_crc(&[self.interval])),
            "EEBRD 2B 1" => Self::ack_with(&with_crc(&[self.rain_setup])),
            "EEBRD 0B 2" => Self::ack_with(&with_crc(&self.latitude.to_le_bytes())),
            "EEBRD 0D 2" => Self::ack_with(&with_crc(&self.longitude.to_le_bytes())),
            "EEBRD 0F 2" => Self::ack_with(&with_crc(&self.elevation.to_le_bytes())),
            "DMPAFT" => {
                self.control.inner.dump_requests.fetch_add(1, Ordering::SeqCst);
                self.mode = Mode::AwaitDumpTime;
                vec![ACK]
            }
            "SETTIME" => {
                self.mode = Mode::AwaitSetTime;
                vec![ACK]
            }
            "EEBWR 12 5" => {
                self.mode = Mode::AwaitEepromData(5);
                vec![ACK]
            }
            "RXCHECK" => {
                let mut reply = vec![LF, CR, b'O', b'K', LF, CR];
                reply.extend_from_slice(b" 21629 15 0 3204 128");
                reply.extend_from_slice(&[LF, CR]);
                reply
            }
            _ => Vec::new(),
        }
    }

    fn ack_with(payload: &[u8]) -> Vec<u8> {
        let mut reply = Vec::with_capacity(payload.len() + 1);
        reply.push(ACK);
        reply.extend_from_slice(payload);
        reply
    }

    fn dump_header(&mut self, written: &[u8]) -> Vec<u8> {
        if written.len() != 6 || !crc_valid(written) {
            return vec![NAK];
        }
        let date = u16::from_le_bytes([written[0], written[1]]);
        let time = u16::from_le_bytes([written[2], written[3]]);
        let after = unpack_date_time(date, time);

        let mut records = self.records_after(date, time, after);
        if let Some(first) = records.first().cloned() {
            // Older slots sharing the first page with the new records
            for _ in 0..self.first_record_offset {
                records.insert(0, first.clone());
            }
        }

        let pages: Vec<Vec<u8>> = records
            .chunks(RECORDS_PER_PAGE)
            .enumerate()
            .map(|(sequence, chunk)| {
                ArchivePage {
                    sequence: sequence as u8,
                    records: chunk.to_vec(),
                }
                .to_bytes()
            })
            .collect();

        let header = self.control.take_header_override().unwrap_or(DumpHeader {
            pages: pages.len() as u16,
            first_record_index: if pages.is_empty() {
                0
            } else {
                self.first_record_offset as u16
            },
        });
        self.mode = Mode::Dumping { pages, next: 0 };
        Self::ack_with(&header.to_bytes())
    }

    fn next_page(&mut self, pages: Vec<Vec<u8>>, next: usize) -> Vec<u8> {
        let Some(page) = pages.get(next) else {
            return Vec::new();
        };
        let mut page = page.clone();
        if let Some(offset) = self.control.take_corruption(next) {
            if let Some(byte) = page.get_mut(offset) {
                *byte ^= 0x5A;
            }
        }
        self.mode = Mode::Dumping {
            pages,
            next: next + 1,
        };
        page
    }

    fn records_after(&self, date: u16, time: u16, after: Option<NaiveDateTime>) -> Vec<ConsoleRecord> {
        if self.live_history {
            return self.synthesize_after(after);
        }
        self.records
            .iter()
            .filter(|r| !r.is_blank() && (r.date, r.time) > (date, time))
            .cloned()
            .collect()
    }

    fn synthesize_after(&self, after: Option<NaiveDateTime>) -> Vec<ConsoleRecord> {
        let interval = ChronoDuration::minutes(self.interval as i64);
        let now = Local::now().naive_local();
        let Some(mut boundary) = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .and_then(|t| t.with_minute(t.minute() - t.minute() % self.interval as u32))
        else {
            return Vec::new();
        };

        let mut records = Vec::new();
        while records.len() < LOGGER_CAPACITY && after.map_or(true, |after| boundary > after) {
            let tenths = 600 + (boundary.hour() as i16 - 12).abs() * -8;
            records.push(sample_record(boundary, tenths));
            boundary -= interval;
        }
        records.reverse();
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::vantage::archive_page::{ArchivePage, ARCHIVE_PAGE_SIZE, DUMP_HEADER_SIZE};
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_wakeup_and_eeprom() {
        let mut console = VantageEmulator::new(5).with_rain_collector(0x10);
        assert_eq!(console.respond(&[CR]), vec![LF, CR]);
        let reply = console.respond(b"EEBRD 2D 1\n");
        assert_eq!(reply[0], ACK);
        assert_eq!(reply[1], 5);
        assert!(crc_valid(&reply[1..]));
        assert_eq!(console.respond(b"EEBRD 2B 1\n")[1], 0x10);
    }

    #[test]
    fn test_dump_after_sequence() {
        let records = (0..7).map(|i| sample_record(at(10, 5 * i), 600)).collect();
        let mut console = VantageEmulator::new(5).with_records(records);

        assert_eq!(console.respond(b"DMPAFT\n"), vec![ACK]);
        let (date, time) = pack_date_time(&at(10, 0));
        let mut request = date.to_le_bytes().to_vec();
        request.extend_from_slice(&time.to_le_bytes());
        let reply = console.respond(&with_crc(&request));
        assert_eq!(reply.len(), 1 + DUMP_HEADER_SIZE);
        let header = DumpHeader::parse(&reply[1..]).unwrap();
        assert_eq!(header.pages, 2);

        let first = console.respond(&[ACK]);
        assert_eq!(first.len(), ARCHIVE_PAGE_SIZE);
        let page = ArchivePage::parse(&first).unwrap();
        assert_eq!(page.records[0].time, 1005);

        let second = ArchivePage::parse(&console.respond(&[ACK])).unwrap();
        assert_eq!(second.sequence, 1);
        assert!(second.records[1].is_blank());
        assert!(console.respond(&[CANCEL]).is_empty());
    }

    #[test]
    fn test_silent_console() {
        let mut console = VantageEmulator::new(5);
        console.control().set_silent(true);
        assert!(console.respond(&[CR]).is_empty());
    }

    #[test]
    fn test_live_history_is_bounded_by_request() {
        let console = VantageEmulator::new(5).with_live_history();
        let after = Local::now().naive_local() - ChronoDuration::minutes(30);
        let records = console.synthesize_after(Some(after));
        assert!((5..=6).contains(&records.len()));
    }
}
