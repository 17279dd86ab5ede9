//! Applications: one top-level operation bound to a run record

use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;
use std::time::Instant;

use super::ApplicationFactory;
use crate::config::OperationConfig;
use crate::engine::EngineContext;
use crate::error::ErrorKind;
use crate::operation::{FailureReason, Operation, OperationReport, OperationState};
use crate::record::{RecordBook, RecordKey, ResetPolicy, RunRecord, RunStatus};
use crate::vision::FrameSummary;
use crate::{AutomationError, Result};

/// Result of one scheduler invocation
#[derive(Debug, Clone, PartialEq)]
pub enum AppOutcome {
    /// The operation succeeded (or timed out under a tolerant policy)
    Completed(OperationReport),
    /// Nothing to do; carries the effective record status
    NotDue(RunStatus),
    /// Disabled; recorded as skipped
    Skipped,
    /// Recorded as failed
    Failed {
        reason: FailureReason,
        /// Last frame captured before the failure, for diagnosis
        last_frame: Option<FrameSummary>,
        report: Option<OperationReport>,
    },
    /// Cancelled; the record was restored to its pre-run status
    Cancelled(OperationReport),
}

impl AppOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, AppOutcome::Failed { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            AppOutcome::Failed { reason, .. } => Some(reason.kind()),
            AppOutcome::Cancelled(_) => Some(ErrorKind::Cancelled),
            _ => None,
        }
    }
}

/// A registered task bound to one account
pub struct Application {
    factory: Arc<dyn ApplicationFactory>,
    key: RecordKey,
    enabled: bool,
    policy: ResetPolicy,
    operation: OperationConfig,
    engine: Arc<EngineContext>,
    book: Arc<RecordBook>,
}

impl Application {
    pub fn new(
        factory: Arc<dyn ApplicationFactory>,
        account: u32,
        engine: Arc<EngineContext>,
        book: Arc<RecordBook>,
    ) -> Self {
        let key = RecordKey::new(factory.app_id(), account);
        let policy = factory.reset_policy();
        let operation = factory.operation_config(&engine.config().operation);
        Self {
            factory,
            key,
            enabled: true,
            policy,
            operation,
            engine,
            book,
        }
    }

    pub fn with_policy(mut self, policy: ResetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_operation_config(mut self, config: OperationConfig) -> Self {
        self.operation = config;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn app_id(&self) -> &str {
        self.factory.app_id()
    }

    pub fn display_name(&self) -> &str {
        self.factory.display_name()
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn should_run(&self, now: NaiveDateTime) -> Result<bool> {
        self.book.should_run(&self.key, &self.policy, now)
    }

    pub fn record(&self) -> Result<RunRecord> {
        self.book.record(&self.key, &self.policy)
    }

    /// Run the application if its record says it is due
    ///
    /// The only entry point the scheduler calls. Failures inside the
    /// operation are recorded and returned as [`AppOutcome::Failed`]; an
    /// `Err` means the record itself could not be read or written, or the
    /// target was already busy.
    pub fn invoke(&self, now: NaiveDateTime) -> Result<AppOutcome> {
        let Some(claim) = self.book.claim(&self.key, &self.policy, now)? else {
            let status = self.book.status(&self.key, &self.policy, now)?;
            log::debug!("{}: not due ({})", self.key, status);
            return Ok(AppOutcome::NotDue(status));
        };

        if !self.enabled {
            log::info!("{}: disabled, marking skipped", self.key);
            self.book.finish(claim, RunStatus::Skipped, now)?;
            return Ok(AppOutcome::Skipped);
        }

        log::info!("Invoking '{}' for {}", self.display_name(), self.key);
        let started = Instant::now();

        let logic = match self.factory.build_operation() {
            Ok(logic) => logic,
            Err(e) => {
                log::warn!("{}: cannot build operation: {}", self.key, e);
                self.book.finish(claim, RunStatus::Failed, now)?;
                return Ok(AppOutcome::Failed {
                    reason: FailureReason::Configuration {
                        message: e.to_string(),
                    },
                    last_frame: None,
                    report: None,
                });
            }
        };

        let mut operation = Operation::new(logic, self.operation.clone());
        let report = match self.engine.run(&mut operation) {
            Ok(report) => report,
            Err(e) => {
                self.book.restore(claim)?;
                return Err(e);
            }
        };

        let elapsed = Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());
        let finished_at = now + elapsed;

        match report.state {
            OperationState::Success | OperationState::Timeout => {
                self.book.finish(claim, RunStatus::Success, finished_at)?;
                Ok(AppOutcome::Completed(report))
            }
            OperationState::Fail => {
                self.book.finish(claim, RunStatus::Failed, finished_at)?;
                let reason = report.reason.clone().unwrap_or(FailureReason::Logic {
                    message: "operation failed".to_string(),
                });
                log::warn!("{}: failed ({}): {}", self.key, reason.kind(), reason);
                Ok(AppOutcome::Failed {
                    reason,
                    last_frame: report.diagnostic_frame(),
                    report: Some(report),
                })
            }
            OperationState::Cancelled => {
                self.book.restore(claim)?;
                log::info!("{}: cancelled", self.key);
                Ok(AppOutcome::Cancelled(report))
            }
            OperationState::Pending | OperationState::Running => {
                self.book.restore(claim)?;
                Err(AutomationError::configuration(format!(
                    "operation '{}' returned in non-terminal state {}",
                    report.id, report.state
                )))
            }
        }
    }
}
