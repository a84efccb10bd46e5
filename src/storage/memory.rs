// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::RwLock;

use super::{check_append, first_after, ArchiveStore, StorageError};
use crate::records::ArchiveRecord;

/// Volatile archive store
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    records: RwLock<Vec<ArchiveRecord>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already ordered records.
    pub fn with_records(records: Vec<ArchiveRecord>) -> Result<Self, StorageError> {
        let store = Self::new();
        for record in &records {
            store.append(record)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArchiveStore for MemoryArchiveStore {
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
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_and_lookup() {
        let store = MemoryArchiveStore::new();
        store.append(&ArchiveRecord::new(300, 5)).unwrap();
        store.append(&ArchiveRecord::new(600, 5)).unwrap();

        assert!(matches!(
            store.append(&ArchiveRecord::new(600, 5)),
            Err(StorageError::OutOfOrder { .. })
        ));
        assert!(matches!(
            store.append(&ArchiveRecord::new(1200, 10)),
            Err(StorageError::IntervalChanged { .. })
        ));

        assert_eq!(store.next_after(0).unwrap().unwrap().date_time, 300);
        assert_eq!(store.next_after(300).unwrap().unwrap().date_time, 600);
        assert!(store.next_after(600).unwrap().is_none());
        assert_eq!(store.records_since(100).unwrap().len(), 2);
        assert_eq!(store.newest().unwrap().unwrap().date_time, 600);
    }
}
