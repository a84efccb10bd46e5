// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Datafeed server
//!
//! Publishes the station data to TCP clients using the canonical wire
//! format. Every frame starts with an 8-byte start-of-frame marker (see
//! [`crate::codec::frame`]):
//!
//! - reading frame: marker `0001` + 340-byte reading, pushed for every
//!   completed reading
//! - archive frame: marker `0002` + 208-byte archive record, pushed for
//!   every stored record and sent in answer to requests
//! - archive request (client to server): marker `0003` + big-endian u32
//!   Unix time; answered with the first stored record newer than that
//!   time, or an all-zero record when there is none
//!
//! Another daemon running the virtual station driver is the typical client.

pub mod server;

use crate::codec::{encode_archive, encode_reading, FrameType};
use crate::records::{ArchiveRecord, Reading};

pub use server::DatafeedServer;

/// Capacity of the broadcast channel feeding the client connections.
pub const FEED_CAPACITY: usize = 64;

/// Data published to every connected client
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Reading(Box<Reading>),
    Archive(Box<ArchiveRecord>),
}

impl FeedItem {
    /// The complete frame, marker included.
    pub fn to_frame(&self) -> Vec<u8> {
        match self {
            FeedItem::Reading(reading) => reading_frame(reading),
            FeedItem::Archive(record) => archive_frame(record),
        }
    }
}

pub fn reading_frame(reading: &Reading) -> Vec<u8> {
    let mut frame = FrameType::Reading.marker().to_vec();
    frame.extend(encode_reading(reading));
    frame
}

pub fn archive_frame(record: &ArchiveRecord) -> Vec<u8> {
    let mut frame = FrameType::Archive.marker().to_vec();
    frame.extend(encode_archive(record));
    frame
}
