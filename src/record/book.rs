//! Run-record book: atomic check-and-mark over a record store
//!
//! Every read-modify-write for one (task, account) key happens under that
//! key's lock, so two invocations can never both observe not-started and both
//! run. Different keys never contend.

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::period::ResetPolicy;
use super::run_record::{RecordKey, RunRecord, RunStatus};
use super::store::RecordStore;
use crate::Result;

/// Proof that a run was claimed; hand it back to `finish` or `restore`
#[derive(Debug)]
#[must_use = "a claimed record stays in progress until finished or restored"]
pub struct Claim {
    key: RecordKey,
    /// Record as it was before the claim
    previous: RunRecord,
    /// Whether the store held the key before the claim
    existed: bool,
}

impl Claim {
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Stored status before the claim
    pub fn previous_status(&self) -> RunStatus {
        self.previous.status
    }
}

/// Run records for every application and account
pub struct RecordBook {
    store: Arc<dyn RecordStore>,
    locks: Mutex<HashMap<RecordKey, Arc<Mutex<()>>>>,
}

impl RecordBook {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Stored record under the current policy, or a fresh one
    fn load(&self, key: &RecordKey, policy: &ResetPolicy) -> Result<(RunRecord, bool)> {
        Ok(match self.store.load(key)? {
            Some(mut record) => {
                record.policy = policy.clone();
                (record, true)
            }
            None => (RunRecord::new(key.clone(), policy.clone()), false),
        })
    }

    /// Current record for a key
    pub fn record(&self, key: &RecordKey, policy: &ResetPolicy) -> Result<RunRecord> {
        let lock = self.key_lock(key);
        let _guard = lock.lock();
        Ok(self.load(key, policy)?.0)
    }

    pub fn status(
        &self,
        key: &RecordKey,
        policy: &ResetPolicy,
        now: NaiveDateTime,
    ) -> Result<RunStatus> {
        Ok(self.record(key, policy)?.get_status(now))
    }

    pub fn should_run(
        &self,
        key: &RecordKey,
        policy: &ResetPolicy,
        now: NaiveDateTime,
    ) -> Result<bool> {
        Ok(self.record(key, policy)?.should_run(now))
    }

    /// Check `should_run` and mark in-progress as one atomic step
    ///
    /// Returns `None` when the task is not due.
    pub fn claim(
        &self,
        key: &RecordKey,
        policy: &ResetPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<Claim>> {
        let lock = self.key_lock(key);
        let _guard = lock.lock();

        let (mut record, existed) = self.load(key, policy)?;
        if !record.should_run(now) {
            log::debug!("Record {} not due ({})", key, record.get_status(now));
            return Ok(None);
        }
        if record.is_stale(now) {
            log::warn!("Record {} was left in progress; reclaiming", key);
        }

        let previous = record.clone();
        let expected = existed.then_some(record.status);
        record.mark(RunStatus::InProgress, now);
        self.store.compare_and_set(key, expected, &record)?;

        Ok(Some(Claim {
            key: key.clone(),
            previous,
            existed,
        }))
    }

    /// Record the terminal status of a claimed run
    pub fn finish(
        &self,
        claim: Claim,
        status: RunStatus,
        now: NaiveDateTime,
    ) -> Result<RunRecord> {
        let lock = self.key_lock(&claim.key);
        let _guard = lock.lock();

        let (mut record, _) = self.load(&claim.key, &claim.previous.policy)?;
        record.mark(status, now);
        self.store
            .compare_and_set(&claim.key, Some(RunStatus::InProgress), &record)?;
        log::info!("Record {} -> {}", claim.key, status);
        Ok(record)
    }

    /// Put a claimed record back the way it was, e.g. after cancellation
    pub fn restore(&self, claim: Claim) -> Result<RunRecord> {
        let lock = self.key_lock(&claim.key);
        let _guard = lock.lock();

        let mut record = claim.previous;
        if !claim.existed {
            record = RunRecord::new(claim.key.clone(), record.policy);
        }
        self.store
            .compare_and_set(&claim.key, Some(RunStatus::InProgress), &record)?;
        log::info!("Record {} restored to {}", claim.key, record.status);
        Ok(record)
    }
}
