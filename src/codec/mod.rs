// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Canonical binary wire format
//!
//! The same byte layouts are used for the archive file store and for the
//! datafeed stream between daemons, so both ends agree on the encoding
//! regardless of host endianness:
//!
//! - [`packed`]: the fixed-point 32-bit float encoding
//! - [`archive`]: archive record layout, including the null sentinel mapping
//! - [`reading`]: current-conditions layout
//! - [`frame`]: 8-byte start-of-frame markers
//! - [`cursor`]: bounds-checked readers and writers used by all of the above

pub mod archive;
pub mod cursor;
pub mod frame;
pub mod packed;
pub mod reading;

use thiserror::Error;

pub use archive::{decode_archive, encode_archive, ARCHIVE_WIRE_SIZE};
pub use cursor::{ByteReader, ByteWriter};
pub use frame::{FrameType, StartFrameMatcher, START_FRAME_LENGTH};
pub use packed::{decode_packed, encode_packed};
pub use reading::{decode_reading, encode_reading, READING_WIRE_SIZE};

/// Errors raised while encoding or decoding wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("start-of-frame marker mismatch at word {index}: got {word:#06x}")]
    BadMarker { index: usize, word: u16 },

    #[error("unknown frame type {0:#06x}")]
    UnknownFrameType(u16),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },
}
