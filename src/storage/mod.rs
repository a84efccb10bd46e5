// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persisted archive
//!
//! Archive records are append-only and strictly ordered by `date_time`,
//! with one archive interval per dataset. [`ArchiveStore`] is the seam
//! drivers and the datafeed read through; [`FileArchiveStore`] persists the
//! records with the canonical wire layout and [`MemoryArchiveStore`] keeps
//! them in memory.

pub mod file;
pub mod memory;

use thiserror::Error;

use crate::codec::CodecError;
use crate::records::ArchiveRecord;

pub use file::FileArchiveStore;
pub use memory::MemoryArchiveStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt archive record: {0}")]
    Codec(#[from] CodecError),

    #[error("record at {got} is not newer than the last stored record at {newest}")]
    OutOfOrder { newest: i32, got: i32 },

    #[error("record interval {got} min differs from the dataset interval {expected} min")]
    IntervalChanged { expected: i32, got: i32 },

    #[error("archive store lock poisoned")]
    Poisoned,
}

/// Ordered, append-only archive record store
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveStore: Send + Sync {
    /// The most recent record.
    fn newest(&self) -> Result<Option<ArchiveRecord>, StorageError>;

    /// The first record strictly newer than `date_time`.
    fn next_after(&self, date_time: i32) -> Result<Option<ArchiveRecord>, StorageError>;

    /// Every record strictly newer than `date_time`, oldest first.
    fn records_since(&self, date_time: i32) -> Result<Vec<ArchiveRecord>, StorageError>;

    /// Append a record newer than every stored one.
    fn append(&self, record: &ArchiveRecord) -> Result<(), StorageError>;
}

/// Check the append-only invariants of `record` against the newest record.
pub(crate) fn check_append(
    newest: Option<&ArchiveRecord>,
    record: &ArchiveRecord,
) -> Result<(), StorageError> {
    if let Some(newest) = newest {
        if record.date_time <= newest.date_time {
            return Err(StorageError::OutOfOrder {
                newest: newest.date_time,
                got: record.date_time,
            });
        }
        if record.interval != newest.interval {
            return Err(StorageError::IntervalChanged {
                expected: newest.interval,
                got: record.interval,
            });
        }
    }
    Ok(())
}

/// Index of the first record newer than `date_time` in an ordered slice.
pub(crate) fn first_after(records: &[ArchiveRecord], date_time: i32) -> usize {
    records.partition_point(|r| r.date_time <= date_time)
}
