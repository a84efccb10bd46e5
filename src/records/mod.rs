// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Canonical in-memory records
//!
//! Every station driver normalizes its vendor format into one of these two
//! shapes:
//!
//! - [`Reading`]: the current-conditions snapshot produced by each poll
//! - [`ArchiveRecord`]: a fixed-interval summary persisted and forwarded
//!   downstream

pub mod archive;
pub mod reading;

pub use archive::{is_null, ArchiveRecord, Channel, ARCHIVE_VALUE_NULL, CHANNEL_COUNT};
pub use reading::Reading;
