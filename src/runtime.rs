//! Runtime context
//!
//! Owns the engine, the application registry, the run-record book and the
//! scheduler. Constructed explicitly at startup and shut down explicitly;
//! nothing in the crate lives in a global.

use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

use crate::app::{AppOutcome, AppRegistry, Application};
use crate::engine::EngineContext;
use crate::record::{RecordBook, RecordKey, RecordStore};
use crate::scheduler::{JobStats, Scheduler};
use crate::Result;

/// Source of game-local "now"
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn local_clock() -> Clock {
    Arc::new(|| chrono::Local::now().naive_local())
}

pub struct Runtime {
    engine: Arc<EngineContext>,
    registry: AppRegistry,
    book: Arc<RecordBook>,
    scheduler: Scheduler,
    clock: Clock,
}

impl Runtime {
    pub fn new(engine: EngineContext, registry: AppRegistry, store: Arc<dyn RecordStore>) -> Self {
        Self {
            engine: Arc::new(engine),
            registry,
            book: Arc::new(RecordBook::new(store)),
            scheduler: Scheduler::new(),
            clock: local_clock(),
        }
    }

    /// Replace the wall clock, e.g. with a fixed time for replays
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn book(&self) -> &Arc<RecordBook> {
        &self.book
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Bind a registered application to an account
    pub fn application(&self, app_id: &str, account: u32) -> Result<Application> {
        self.registry
            .application(app_id, account, self.engine.clone(), self.book.clone())
    }

    /// Invoke an application once, now
    pub fn invoke(&self, app_id: &str, account: u32) -> Result<AppOutcome> {
        self.invoke_at(app_id, account, self.now())
    }

    pub fn invoke_at(&self, app_id: &str, account: u32, now: NaiveDateTime) -> Result<AppOutcome> {
        self.application(app_id, account)?.invoke(now)
    }

    /// Invoke an application every `interval`
    ///
    /// The job is tagged with the application's record key. An invocation
    /// that finds the engine busy logs and waits for the next tick.
    pub fn schedule_application(
        &self,
        app_id: &str,
        account: u32,
        interval: Duration,
    ) -> Result<String> {
        let app = Arc::new(self.application(app_id, account)?);
        let tag = app.key().to_string();
        let clock = self.clock.clone();

        let job_app = app.clone();
        self.scheduler.schedule(tag.clone(), interval, move || {
            match job_app.invoke(clock()) {
                Ok(AppOutcome::NotDue(_)) => {}
                Ok(outcome) => log::info!("{}: {}", job_app.key(), describe(&outcome)),
                Err(e) => log::warn!("{}: invocation failed: {}", job_app.key(), e),
            }
        })?;
        Ok(tag)
    }

    pub fn unschedule(&self, app_id: &str, account: u32) -> bool {
        self.scheduler
            .cancel(&RecordKey::new(app_id, account).to_string())
    }

    pub fn job_stats(&self, app_id: &str, account: u32) -> Option<Arc<JobStats>> {
        self.scheduler
            .stats(&RecordKey::new(app_id, account).to_string())
    }

    pub fn scheduled(&self) -> Vec<String> {
        self.scheduler.tags()
    }

    /// Stop all tickers and cancel the running operation
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.scheduler.shutdown();
        log::info!("Runtime shut down");
    }
}

fn describe(outcome: &AppOutcome) -> String {
    match outcome {
        AppOutcome::Completed(report) => format!("completed in {} rounds", report.rounds),
        AppOutcome::NotDue(status) => format!("not due ({})", status),
        AppOutcome::Skipped => "skipped".to_string(),
        AppOutcome::Failed { reason, .. } => format!("failed: {}", reason),
        AppOutcome::Cancelled(report) => format!("cancelled after {} rounds", report.rounds),
    }
}
