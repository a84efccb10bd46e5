// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Archive file
//!
//! A flat file of fixed-size records in the canonical archive layout. The
//! whole file is indexed in memory when opened; appends go to the end of
//! the file and to the index. A partial record at the end of the file (a
//! write interrupted by a crash) is dropped when the file is opened.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{debug, info, warn};

use super::{check_append, first_after, ArchiveStore, StorageError};
use crate::codec::{decode_archive, encode_archive, ARCHIVE_WIRE_SIZE};
use crate::records::ArchiveRecord;

#[derive(Debug)]
pub struct FileArchiveStore {
    path: PathBuf,
    records: RwLock<Vec<ArchiveRecord>>,
}

impl FileArchiveStore {
    /// Open (or create) the archive file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let complete = bytes.len() - bytes.len() % ARCHIVE_WIRE_SIZE;
        if complete != bytes.len() {
            warn!(
                "Dropping {} trailing bytes of a partial record in {:?}",
                bytes.len() - complete,
                path
            );
            file.set_len(complete as u64)?;
        }

        let mut records: Vec<ArchiveRecord> = Vec::with_capacity(complete / ARCHIVE_WIRE_SIZE);
        for chunk in bytes[..complete].chunks_exact(ARCHIVE_WIRE_SIZE) {
            let record = decode_archive(chunk)?;
            check_append(records.last(), &record)?;
            records.push(record);
        }

        info!("Opened archive {:?} with {} records", path, records.len());
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append_to_file(&self, record: &ArchiveRecord) -> Result<(), StorageError> {
        let mut file: File = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&encode_archive(record))?;
        file.sync_data()?;
        Ok(())
    }
}

impl ArchiveStore for FileArchiveStore {
    fn newest(&self) -> Result<Option<ArchiveRecord>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records.last().cloned())
    }

    fn next_after(&self, date_time: i32) -> Result<Option<ArchiveRecord>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records.get(first_after(&records, date_time)).cloned())
    }

    fn records_since(&self, date_time: i32) -> Result<Vec<ArchiveRecord>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::Poisoned)?;
        Ok(records[first_after(&records, date_time)..].to_vec())
    }

    fn append(&self, record: &ArchiveRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::Poisoned)?;
        check_append(records.last(), record)?;
        self.append_to_file(record)?;
        records.push(record.clone());
        debug!("Stored archive record {} in {:?}", record.date_time, self.path);
        Ok(())
    }
}
