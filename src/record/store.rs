//! Persistence boundary for run records

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use super::run_record::{RecordKey, RunRecord, RunStatus};

/// Failure reported by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {key} changed concurrently: expected {expected:?}, found {actual:?}")]
    Conflict {
        key: RecordKey,
        expected: Option<RunStatus>,
        actual: Option<RunStatus>,
    },
    #[error("record {key} is corrupt: {message}")]
    Corrupt { key: RecordKey, message: String },
    #[error("record store backend error: {0}")]
    Backend(String),
}

/// Key-value store of run-record snapshots
pub trait RecordStore: Send + Sync {
    fn load(&self, key: &RecordKey) -> Result<Option<RunRecord>, StoreError>;

    /// Write `record` only if the stored status still equals `expected`
    ///
    /// `expected == None` means the key must not exist yet.
    fn compare_and_set(
        &self,
        key: &RecordKey,
        expected: Option<RunStatus>,
        record: &RunRecord,
    ) -> Result<(), StoreError>;
}

/// In-memory store holding JSON snapshots
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<RecordKey, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Raw JSON snapshot of a record
    pub fn snapshot(&self, key: &RecordKey) -> Option<String> {
        self.records.lock().get(key).cloned()
    }

    /// Seed a snapshot directly, bypassing compare-and-set
    pub fn insert_snapshot(&self, key: RecordKey, json: impl Into<String>) {
        self.records.lock().insert(key, json.into());
    }
}

fn decode(key: &RecordKey, json: &str) -> Result<RunRecord, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        key: key.clone(),
        message: e.to_string(),
    })
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, key: &RecordKey) -> Result<Option<RunRecord>, StoreError> {
        let records = self.records.lock();
        records.get(key).map(|json| decode(key, json)).transpose()
    }

    fn compare_and_set(
        &self,
        key: &RecordKey,
        expected: Option<RunStatus>,
        record: &RunRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let actual = match records.get(key) {
            Some(json) => Some(decode(key, json)?.status),
            None => None,
        };
        if actual != expected {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected,
                actual,
            });
        }
        let json = serde_json::to_string(record).map_err(|e| StoreError::Backend(e.to_string()))?;
        records.insert(key.clone(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResetPolicy;
    use chrono::NaiveDate;

    #[test]
    fn test_compare_and_set() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::new("mail", 0);
        let mut record = RunRecord::new(key.clone(), ResetPolicy::default());
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        record.mark(RunStatus::InProgress, now);
        store.compare_and_set(&key, None, &record).unwrap();
        assert!(matches!(
            store.compare_and_set(&key, None, &record),
            Err(StoreError::Conflict { actual: Some(RunStatus::InProgress), .. })
        ));

        record.mark(RunStatus::Success, now);
        store
            .compare_and_set(&key, Some(RunStatus::InProgress), &record)
            .unwrap();
        assert_eq!(store.load(&key).unwrap().unwrap().status, RunStatus::Success);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_corrupt_snapshot() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::new("mail", 2);
        store.insert_snapshot(key.clone(), "{not json");
        assert!(matches!(store.load(&key), Err(StoreError::Corrupt { .. })));
    }
}
