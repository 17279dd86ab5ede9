//! Run records
//!
//! Idempotent, time-windowed completion tracking per (task, account). A
//! record reverts to not-started once "now" crosses the next reset boundary
//! computed from its last update, its period and the day-boundary hour offset.

mod book;
mod period;
mod run_record;
mod store;

pub use book::{Claim, RecordBook};
pub use period::{ResetPeriod, ResetPolicy};
pub use run_record::{RecordKey, RunRecord, RunStatus};
pub use store::{MemoryRecordStore, RecordStore, StoreError};
