use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::database::RecordStore;
use crate::types::{CoreError, Record, Result};

/// In-process durable tier. Each key's shard lock gives the same per-key
/// serialization a row lock does.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn write(&self, key: &str, value: Bytes) -> Result<u64> {
        let version = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.version += 1;
                record.value = value;
                record.updated_at = Utc::now();
                record.version
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Record::new(key, value, 1));
                1
            }
        };
        Ok(version)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("Record {} not found", key)))
    }

    async fn count_by_value(&self, value: &[u8]) -> Result<u64> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.value().value.as_ref() == value)
            .count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
