// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Archive record wire layout
//!
//! `date_time`, `us_units` and `interval` as big-endian `i32`, followed by
//! every channel as a packed float in [`Channel`](crate::records::Channel)
//! order.
//!
//! The in-memory null sentinel (-100000) is outside the packed float range,
//! so it travels as -32767.0 and is mapped back on decode.

use super::cursor::{ByteReader, ByteWriter};
use super::CodecError;
use crate::records::{ArchiveRecord, ARCHIVE_VALUE_NULL, CHANNEL_COUNT};

pub use super::cursor::WIRE_VALUE_NULL;

/// Encoded size of one archive record.
pub const ARCHIVE_WIRE_SIZE: usize = 3 * 4 + CHANNEL_COUNT * 4;

pub fn encode_archive(record: &ArchiveRecord) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(ARCHIVE_WIRE_SIZE);
    writer
        .put_i32_be(record.date_time)
        .put_i32_be(record.us_units)
        .put_i32_be(record.interval);

    for value in record.values.iter() {
        writer.put_nullable_f32(*value);
    }
    writer.into_inner()
}

pub fn decode_archive(bytes: &[u8]) -> Result<ArchiveRecord, CodecError> {
    if bytes.len() != ARCHIVE_WIRE_SIZE {
        return Err(CodecError::BadLength {
            expected: ARCHIVE_WIRE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut reader = ByteReader::new(bytes);
    let date_time = reader.i32_be()?;
    let us_units = reader.i32_be()?;
    let interval = reader.i32_be()?;

    let mut values = [ARCHIVE_VALUE_NULL; CHANNEL_COUNT];
    for slot in values.iter_mut() {
        *slot = reader.nullable_f32()?;
    }

    Ok(ArchiveRecord {
        date_time,
        us_units,
        interval,
        values,
    })
}
