//! Periodic scheduler
//!
//! Each tag gets its own ticker thread that fires at a fixed interval. A tick
//! that arrives while the previous invocation of the same job is still
//! running is skipped, never queued.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{AutomationError, Result};

/// Counters for one scheduled job
#[derive(Debug, Default)]
pub struct JobStats {
    fired: AtomicU64,
    skipped: AtomicU64,
    busy: AtomicBool,
}

impl JobStats {
    /// Ticks that started an invocation
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    /// Ticks dropped because an invocation was still running
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

struct ScheduledJob {
    running: Arc<AtomicBool>,
    stats: Arc<JobStats>,
    ticker: Option<JoinHandle<()>>,
}

/// Tag-addressed periodic triggers
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `job` every `interval` under `tag`
    ///
    /// The first tick comes one interval after scheduling.
    pub fn schedule<F>(&self, tag: impl Into<String>, interval: Duration, job: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let tag = tag.into();
        if interval.is_zero() {
            return Err(AutomationError::configuration(format!(
                "job '{}' needs a non-zero interval",
                tag
            )));
        }

        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&tag) {
            return Err(AutomationError::configuration(format!(
                "job '{}' is already scheduled",
                tag
            )));
        }

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(JobStats::default());
        let job = Arc::new(job);

        let ticker = {
            let running = running.clone();
            let stats = stats.clone();
            let tag = tag.clone();
            thread::Builder::new()
                .name(format!("scheduler-{}", tag))
                .spawn(move || run_ticker(tag, interval, running, stats, job))?
        };

        log::info!("Scheduled '{}' every {:?}", tag, interval);
        jobs.insert(
            tag,
            ScheduledJob {
                running,
                stats,
                ticker: Some(ticker),
            },
        );
        Ok(())
    }

    /// Stop the ticker for `tag`; an invocation already running finishes on its own
    pub fn cancel(&self, tag: &str) -> bool {
        let job = self.jobs.lock().remove(tag);
        match job {
            Some(job) => {
                stop(job);
                log::info!("Cancelled '{}'", tag);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, tag: &str) -> bool {
        self.jobs.lock().contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.jobs.lock().keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn stats(&self, tag: &str) -> Option<Arc<JobStats>> {
        self.jobs.lock().get(tag).map(|job| job.stats.clone())
    }

    /// Stop every ticker
    pub fn shutdown(&self) {
        let jobs: Vec<ScheduledJob> = self.jobs.lock().drain().map(|(_, job)| job).collect();
        if jobs.is_empty() {
            return;
        }
        for job in jobs {
            stop(job);
        }
        log::info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop(mut job: ScheduledJob) {
    job.running.store(false, Ordering::SeqCst);
    if let Some(handle) = job.ticker.take() {
        let _ = handle.join();
    }
}

/// Ticker loop for one tag
fn run_ticker<F>(
    tag: String,
    interval: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<JobStats>,
    job: Arc<F>,
) where
    F: Fn() + Send + Sync + 'static,
{
    const SLICE: Duration = Duration::from_millis(10);
    let mut next_tick = Instant::now() + interval;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next_tick {
            thread::sleep(SLICE.min(next_tick - now));
            continue;
        }
        next_tick += interval;

        if stats
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            log::warn!("'{}' still running; skipping tick", tag);
            continue;
        }
        stats.fired.fetch_add(1, Ordering::SeqCst);

        let job = job.clone();
        let worker_stats = stats.clone();
        let spawned = thread::Builder::new()
            .name(format!("job-{}", tag))
            .spawn(move || {
                job();
                worker_stats.busy.store(false, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            log::warn!("'{}': cannot start worker: {}", tag, e);
            stats.busy.store(false, Ordering::SeqCst);
        }
    }
}
