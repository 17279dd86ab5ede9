//! Per-round view handed to operation logic

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::input::{InputAction, Point};
use crate::regions::Region;
use crate::vision::{Frame, MatchOutcome, Probe, ScreenMatcher};
use crate::Result;

use super::Decision;

/// Everything a round may look at: the frame it captured and the matcher
///
/// Logic reads no other external state mid-round, so the same frame and the
/// same internal state always produce the same decision.
pub struct RoundContext<'r> {
    frame: &'r Frame,
    matcher: &'r ScreenMatcher,
    locale: &'r str,
    round: u32,
}

impl<'r> RoundContext<'r> {
    pub fn new(frame: &'r Frame, matcher: &'r ScreenMatcher, locale: &'r str, round: u32) -> Self {
        Self {
            frame,
            matcher,
            locale,
            round,
        }
    }

    pub fn frame(&self) -> &Frame {
        self.frame
    }

    /// Zero-based index of this round within the node's budget
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn locale(&self) -> &str {
        self.locale
    }

    /// Catalog declaration of a region
    pub fn region(&self, name: &str) -> Result<&Region> {
        self.matcher.catalog().require(name)
    }

    pub fn probe(&self, region: &str) -> Result<Probe> {
        let probe = self.matcher.probe(self.frame, region, self.locale)?;
        log::debug!(
            "round {} probe '{}': {} ({:.3} / {:.3})",
            self.round,
            probe.region,
            probe.outcome,
            probe.score,
            probe.threshold
        );
        Ok(probe)
    }

    pub fn probe_many(&self, regions: &[&str]) -> Result<Vec<Probe>> {
        self.matcher.probe_many(self.frame, regions, self.locale)
    }

    pub fn outcome(&self, region: &str) -> Result<MatchOutcome> {
        Ok(self.probe(region)?.outcome)
    }

    pub fn is_present(&self, region: &str) -> Result<bool> {
        Ok(self.outcome(region)?.is_present())
    }

    /// Center of a region in live-frame pixels
    pub fn region_center(&self, region: &str) -> Result<Point> {
        let declared = self.matcher.catalog().require(region)?;
        let (x, y) = self.matcher.live_rect(self.frame, declared).center();
        Ok(Point::new(x, y))
    }

    /// Decision that clicks the center of a region
    pub fn click(&self, region: &str) -> Result<Decision> {
        Ok(Decision::Act(InputAction::Click(self.region_center(region)?)))
    }
}

/// Cooperative cancellation flag, checked at round boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next run
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Sleep up to `duration`, waking early on cancellation
    ///
    /// Returns `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(20);

        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }
}
