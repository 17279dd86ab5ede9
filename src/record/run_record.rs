//! Per-(task, account) run records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::period::ResetPolicy;
use crate::Result;

/// Completion status of a run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    InProgress,
    Success,
    Skipped,
    Failed,
}

impl RunStatus {
    /// Success and skipped hold until the next reset boundary
    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a run record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub task_id: String,
    pub account: u32,
}

impl RecordKey {
    pub fn new(task_id: impl Into<String>, account: u32) -> Self {
        Self {
            task_id: task_id.into(),
            account,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.task_id, self.account)
    }
}

/// Stored completion state plus the policy that ages it
///
/// All reads are pure functions of the stored fields and `now`, so repeated
/// reads without an intervening [`RunRecord::mark`] agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub key: RecordKey,
    pub status: RunStatus,
    pub updated_at: Option<NaiveDateTime>,
    /// Failed runs inside the current reset window
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub policy: ResetPolicy,
}

impl RunRecord {
    pub fn new(key: RecordKey, policy: ResetPolicy) -> Self {
        Self {
            key,
            status: RunStatus::NotStarted,
            updated_at: None,
            attempts: 0,
            policy,
        }
    }

    /// Whether `now` lies past the reset boundary of the last update
    pub fn is_reset_due(&self, now: NaiveDateTime) -> bool {
        self.updated_at
            .is_some_and(|last| self.policy.has_reset(last, now))
    }

    /// Next instant this record reverts to not-started
    pub fn next_reset(&self) -> Option<NaiveDateTime> {
        self.updated_at
            .and_then(|last| self.policy.next_boundary(last))
    }

    /// Effective status at `now`
    pub fn get_status(&self, now: NaiveDateTime) -> RunStatus {
        if self.is_reset_due(now) {
            RunStatus::NotStarted
        } else {
            self.status
        }
    }

    /// Failed attempts counted against the window containing `now`
    pub fn attempts_at(&self, now: NaiveDateTime) -> u32 {
        if self.is_reset_due(now) {
            0
        } else {
            self.attempts
        }
    }

    /// An in-progress record that outlived its TTL was left by a crash
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        self.status == RunStatus::InProgress
            && self
                .updated_at
                .is_some_and(|last| now - last >= self.policy.in_progress_ttl())
    }

    /// Whether the task is due: not started, failed and retryable, or abandoned
    pub fn should_run(&self, now: NaiveDateTime) -> bool {
        match self.get_status(now) {
            RunStatus::NotStarted => true,
            RunStatus::Failed => self.attempts_at(now) < self.policy.max_attempts,
            RunStatus::InProgress => self.is_stale(now),
            RunStatus::Success | RunStatus::Skipped => false,
        }
    }

    /// Record a new status at `now`
    pub fn mark(&mut self, status: RunStatus, now: NaiveDateTime) {
        if self.is_reset_due(now) {
            self.attempts = 0;
        }
        if status == RunStatus::Failed {
            self.attempts += 1;
        }
        self.status = status;
        self.updated_at = Some(now);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
