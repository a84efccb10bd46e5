// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! DMPAFT download layouts: the dump header and the 267-byte archive page
//! holding five 52-byte "rev B" records.

use crate::codec::{ByteReader, ByteWriter, CodecError};

use super::protocol::with_crc;

pub const ARCHIVE_PAGE_SIZE: usize = 267;
pub const RECORDS_PER_PAGE: usize = 5;
pub const CONSOLE_RECORD_SIZE: usize = 52;
/// Page count and first record index plus CRC.
pub const DUMP_HEADER_SIZE: usize = 6;
/// Pages in the console data logger.
pub const MAX_ARCHIVE_PAGES: u16 = 512;

/// Reply to the DMPAFT date/time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpHeader {
    pub pages: u16,
    pub first_record_index: u16,
}

impl DumpHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);
        let pages = r.u16_le()?;
        let first_record_index = r.u16_le()?;
        if pages > MAX_ARCHIVE_PAGES {
            return Err(CodecError::OutOfRange {
                field: "page count",
                value: pages as u32,
            });
        }
        if first_record_index as usize >= RECORDS_PER_PAGE {
            return Err(CodecError::OutOfRange {
                field: "first record index",
                value: first_record_index as u32,
            });
        }
        Ok(Self {
            pages,
            first_record_index,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(DUMP_HEADER_SIZE);
        w.put_u16_le(self.pages).put_u16_le(self.first_record_index);
        with_crc(w.as_slice())
    }
}

/// One archive record as stored by the console data logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRecord {
    pub date: u16,
    pub time: u16,
    pub out_temp: i16,
    pub high_out_temp: i16,
    pub low_out_temp: i16,
    /// Ticks in the low 12 bits, collector type in the high nibble
    pub rain: u16,
    pub high_rain_rate: u16,
    pub barometer: u16,
    pub radiation: u16,
    pub wind_samples: u16,
    pub in_temp: i16,
    pub in_humidity: u8,
    pub out_humidity: u8,
    pub avg_wind_speed: u8,
    pub high_wind_speed: u8,
    pub high_wind_dir: u8,
    pub prev_wind_dir: u8,
    pub uv: u8,
    pub et: u8,
    pub high_radiation: u16,
    pub high_uv: u8,
    pub forecast_rule: u8,
    pub leaf_temps: [u8; 2],
    pub leaf_wetnesses: [u8; 2],
    pub soil_temps: [u8; 4],
    pub record_type: u8,
    pub extra_humidities: [u8; 2],
    pub extra_temps: [u8; 3],
    pub soil_moistures: [u8; 4],
}

fn take_array<const N: usize>(reader: &mut ByteReader<'_>) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(reader.take(N)?);
    Ok(out)
}

impl ConsoleRecord {
    /// An erased logger slot.
    pub fn blank() -> Self {
        Self {
            date: 0xFFFF,
            time: 0xFFFF,
            out_temp: -1,
            high_out_temp: -1,
            low_out_temp: -1,
            rain: 0xFFFF,
            high_rain_rate: 0xFFFF,
            barometer: 0xFFFF,
            radiation: 0xFFFF,
            wind_samples: 0xFFFF,
            in_temp: -1,
            in_humidity: 0xFF,
            out_humidity: 0xFF,
            avg_wind_speed: 0xFF,
            high_wind_speed: 0xFF,
            high_wind_dir: 0xFF,
            prev_wind_dir: 0xFF,
            uv: 0xFF,
            et: 0xFF,
            high_radiation: 0xFFFF,
            high_uv: 0xFF,
            forecast_rule: 0xFF,
            leaf_temps: [0xFF; 2],
            leaf_wetnesses: [0xFF; 2],
            soil_temps: [0xFF; 4],
            record_type: 0xFF,
            extra_humidities: [0xFF; 2],
            extra_temps: [0xFF; 3],
            soil_moistures: [0xFF; 4],
        }
    }

    pub fn is_blank(&self) -> bool {
        self.date == 0xFFFF || self.time == 0xFFFF
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            date: r.u16_le()?,
            time: r.u16_le()?,
            out_temp: r.i16_le()?,
            high_out_temp: r.i16_le()?,
            low_out_temp: r.i16_le()?,
            rain: r.u16_le()?,
            high_rain_rate: r.u16_le()?,
            barometer: r.u16_le()?,
            radiation: r.u16_le()?,
            wind_samples: r.u16_le()?,
            in_temp: r.i16_le()?,
            in_humidity: r.u8()?,
            out_humidity: r.u8()?,
            avg_wind_speed: r.u8()?,
            high_wind_speed: r.u8()?,
            high_wind_dir: r.u8()?,
            prev_wind_dir: r.u8()?,
            uv: r.u8()?,
            et: r.u8()?,
            high_radiation: r.u16_le()?,
            high_uv: r.u8()?,
            forecast_rule: r.u8()?,
            leaf_temps: take_array(r)?,
            leaf_wetnesses: take_array(r)?,
            soil_temps: take_array(r)?,
            record_type: r.u8()?,
            extra_humidities: take_array(r)?,
            extra_temps: take_array(r)?,
            soil_moistures: take_array(r)?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_u16_le(self.date)
            .put_u16_le(self.time)
            .put_i16_le(self.out_temp)
            .put_i16_le(self.high_out_temp)
            .put_i16_le(self.low_out_temp)
            .put_u16_le(self.rain)
            .put_u16_le(self.high_rain_rate)
            .put_u16_le(self.barometer)
            .put_u16_le(self.radiation)
            .put_u16_le(self.wind_samples)
            .put_i16_le(self.in_temp)
            .put_u8(self.in_humidity)
            .put_u8(self.out_humidity)
            .put_u8(self.avg_wind_speed)
            .put_u8(self.high_wind_speed)
            .put_u8(self.high_wind_dir)
            .put_u8(self.prev_wind_dir)
            .put_u8(self.uv)
            .put_u8(self.et)
            .put_u16_le(self.high_radiation)
            .put_u8(self.high_uv)
            .put_u8(self.forecast_rule)
            .put_bytes(&self.leaf_temps)
            .put_bytes(&self.leaf_wetnesses)
            .put_bytes(&self.soil_temps)
            .put_u8(self.record_type)
            .put_bytes(&self.extra_humidities)
            .put_bytes(&self.extra_temps)
            .put_bytes(&self.soil_moistures);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePage {
    pub sequence: u8,
    pub records: Vec<ConsoleRecord>,
}

impl ArchivePage {
    /// Decode a page whose CRC has already been verified.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != ARCHIVE_PAGE_SIZE {
            return Err(CodecError::BadLength {
                expected: ARCHIVE_PAGE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut r = ByteReader::new(bytes);
        let sequence = r.u8()?;
        let records = (0..RECORDS_PER_PAGE)
            .map(|_| ConsoleRecord::read(&mut r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sequence, records })
    }

    /// Encode with unused bytes and CRC; missing slots are blank.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(ARCHIVE_PAGE_SIZE);
        w.put_u8(self.sequence);
        let blank = ConsoleRecord::blank();
        for slot in 0..RECORDS_PER_PAGE {
            self.records.get(slot).unwrap_or(&blank).write(&mut w);
        }
        w.put_zeros(4);
        with_crc(w.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::vantage::protocol::crc_valid;

    #[test]
    fn test_page_layout() {
        let mut record = ConsoleRecord::blank();
        record.date = 0x1234;
        record.time = 1330;
        record.out_temp = -15;
        record.soil_moistures = [1, 2, 3, 4];

        let page = ArchivePage {
            sequence: 7,
            records: vec![record.clone()],
        };
        let bytes = page.to_bytes();
        assert_eq!(bytes.len(), ARCHIVE_PAGE_SIZE);
        assert!(crc_valid(&bytes));
        assert_eq!(bytes[0], 7);
        assert_eq!(&bytes[1..3], &[0x34, 0x12]);
        assert_eq!(&bytes[49..53], &[1, 2, 3, 4]);

        let parsed = ArchivePage::parse(&bytes).unwrap();
        assert_eq!(parsed.records.len(), RECORDS_PER_PAGE);
        assert_eq!(parsed.records[0], record);
        assert!(parsed.records[1].is_blank());
    }

    #[test]
    fn test_dump_header() {
        let header = DumpHeader {
            pages: 3,
            first_record_index: 2,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), DUMP_HEADER_SIZE);
        assert!(crc_valid(&bytes));
        assert_eq!(DumpHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_dump_header_bounds() {
        let full = DumpHeader {
            pages: MAX_ARCHIVE_PAGES,
            first_record_index: 4,
        };
        assert_eq!(DumpHeader::parse(&full.to_bytes()).unwrap(), full);

        let too_many = DumpHeader {
            pages: MAX_ARCHIVE_PAGES + 1,
            first_record_index: 0,
        };
        assert!(matches!(
            DumpHeader::parse(&too_many.to_bytes()),
            Err(CodecError::OutOfRange { value: 513, .. })
        ));

        let bad_index = DumpHeader {
            pages: 1,
            first_record_index: RECORDS_PER_PAGE as u16,
        };
        assert!(matches!(
            DumpHeader::parse(&bad_index.to_bytes()),
            Err(CodecError::OutOfRange { value: 5, .. })
        ));
    }
}
