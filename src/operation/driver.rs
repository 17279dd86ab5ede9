//! The shared round loop
//!
//! One driver runs one operation tree end to end against one target. It is
//! the only place that touches the capture and input collaborators, which is
//! what guarantees at most one input action per round.

use std::time::Instant;

use super::context::{CancelToken, RoundContext};
use super::decision::{ChildOperation, Decision};
use super::state::{FailureReason, OperationReport, OperationState};
use super::Operation;
use crate::config::ExhaustionPolicy;
use crate::error::ErrorKind;
use crate::input::InputController;
use crate::vision::{CaptureError, CaptureSource, Frame, ScreenMatcher};

/// Drives operations through their rounds
pub struct OperationDriver<'a> {
    capture: &'a mut dyn CaptureSource,
    input: &'a mut dyn InputController,
    matcher: &'a ScreenMatcher,
    locale: String,
    cancel: CancelToken,
}

/// Result of acquiring one frame
enum Acquired {
    Frame(Frame),
    Hiccup(String),
}

impl<'a> OperationDriver<'a> {
    pub fn new(
        capture: &'a mut dyn CaptureSource,
        input: &'a mut dyn InputController,
        matcher: &'a ScreenMatcher,
    ) -> Self {
        let locale = matcher.default_locale().to_string();
        Self {
            capture,
            input,
            matcher,
            locale,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run an operation tree to a terminal state
    pub fn run(&mut self, operation: &mut Operation) -> OperationReport {
        let budget = operation.config.max_rounds;
        let report = self.run_node(operation, budget);
        log::info!(
            "Operation '{}' finished: {} after {} rounds",
            report.id,
            report.state,
            report.rounds
        );
        report
    }

    fn run_node(&mut self, op: &mut Operation, budget: u32) -> OperationReport {
        let mut report = OperationReport::new(op.id());

        if let Err(e) = op.config.validate() {
            return finish(op, report, OperationState::Fail, Some(configuration(e)));
        }
        for name in op.logic.regions() {
            if self.matcher.catalog().get(&name).is_none() {
                let reason = FailureReason::Configuration {
                    message: format!("unknown region '{}'", name),
                };
                return finish(op, report, OperationState::Fail, Some(reason));
            }
        }

        op.state = OperationState::Running;
        log::debug!("Operation '{}' running with budget {}", report.id, budget);

        let mut consecutive_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return finish(op, report, OperationState::Cancelled, None);
            }

            if report.rounds >= budget {
                return match op.config.on_exhausted {
                    ExhaustionPolicy::Fail => {
                        let reason = FailureReason::BudgetExceeded {
                            rounds: report.rounds,
                        };
                        finish(op, report, OperationState::Fail, Some(reason))
                    }
                    ExhaustionPolicy::Tolerate => {
                        finish(op, report, OperationState::Timeout, None)
                    }
                };
            }

            let frame = match self.acquire(op) {
                Acquired::Frame(frame) => frame,
                Acquired::Hiccup(error) => {
                    consecutive_failures += 1;
                    report.absorbed_failures += 1;
                    log::warn!(
                        "Operation '{}': capture failed ({}/{}): {}",
                        report.id,
                        consecutive_failures,
                        op.config.failure_ceiling,
                        error
                    );
                    if consecutive_failures >= op.config.failure_ceiling {
                        let reason = FailureReason::TargetUnavailable {
                            failures: consecutive_failures,
                            last_error: error,
                        };
                        return finish(op, report, OperationState::Fail, Some(reason));
                    }
                    self.cancel.sleep(op.config.backoff());
                    continue;
                }
            };

            let round = report.rounds;
            report.rounds += 1;
            report.last_frame = Some(frame.summary());

            let decision = {
                let ctx = RoundContext::new(&frame, self.matcher, &self.locale, round);
                op.logic.step(&ctx)
            };
            drop(frame);

            let decision = match decision {
                Ok(decision) => decision,
                Err(e) => match e.kind() {
                    ErrorKind::TargetUnavailable => {
                        consecutive_failures += 1;
                        report.absorbed_failures += 1;
                        log::warn!("Operation '{}': round {} failed: {}", report.id, round, e);
                        if consecutive_failures >= op.config.failure_ceiling {
                            let reason = FailureReason::TargetUnavailable {
                                failures: consecutive_failures,
                                last_error: e.to_string(),
                            };
                            return finish(op, report, OperationState::Fail, Some(reason));
                        }
                        self.cancel.sleep(op.config.backoff());
                        continue;
                    }
                    ErrorKind::OperationLogic => {
                        let reason = FailureReason::Logic {
                            message: e.to_string(),
                        };
                        return finish(op, report, OperationState::Fail, Some(reason));
                    }
                    _ => return finish(op, report, OperationState::Fail, Some(configuration(e))),
                },
            };

            match decision {
                Decision::Continue => {
                    consecutive_failures = 0;
                }
                Decision::Succeed => {
                    return finish(op, report, OperationState::Success, None);
                }
                Decision::Fail(message) => {
                    let reason = FailureReason::Logic { message };
                    return finish(op, report, OperationState::Fail, Some(reason));
                }
                Decision::Act(action) => {
                    log::debug!("Operation '{}' round {}: {}", report.id, round, action);
                    match self.input.perform(&action) {
                        Ok(()) => consecutive_failures = 0,
                        Err(e) => {
                            consecutive_failures += 1;
                            report.absorbed_failures += 1;
                            log::warn!(
                                "Operation '{}': {} rejected ({}/{}): {}",
                                report.id,
                                action,
                                consecutive_failures,
                                op.config.failure_ceiling,
                                e
                            );
                            op.logic.on_action_failed(&action, &e);
                            if consecutive_failures >= op.config.failure_ceiling {
                                let reason = FailureReason::TargetUnavailable {
                                    failures: consecutive_failures,
                                    last_error: e.to_string(),
                                };
                                return finish(op, report, OperationState::Fail, Some(reason));
                            }
                            self.cancel.sleep(op.config.backoff());
                            continue;
                        }
                    }
                }
                Decision::Delegate(child) => {
                    let remaining = budget.saturating_sub(report.rounds);
                    let ChildRun {
                        report: child_report,
                        optional,
                        shared,
                    } = self.run_child(child, remaining);

                    match child_report.state {
                        OperationState::Cancelled => {
                            report.children.push(child_report);
                            return finish(op, report, OperationState::Cancelled, None);
                        }
                        OperationState::Fail | OperationState::Timeout if !optional => {
                            let cause = match &child_report.reason {
                                Some(reason) => reason.clone(),
                                None => FailureReason::BudgetExceeded {
                                    rounds: child_report.rounds,
                                },
                            };
                            let reason = FailureReason::ChildFailed {
                                child: child_report.id.clone(),
                                cause: Box::new(cause),
                            };
                            report.children.push(child_report);
                            return finish(op, report, OperationState::Fail, Some(reason));
                        }
                        state => {
                            if state != OperationState::Success {
                                log::info!(
                                    "Operation '{}': optional step '{}' ended in {}, continuing",
                                    report.id,
                                    child_report.id,
                                    state
                                );
                            }
                            if shared {
                                report.rounds += child_report.rounds;
                            }
                            op.logic.on_child_finished(&child_report);
                            report.children.push(child_report);
                            consecutive_failures = 0;
                        }
                    }
                }
            }

            if !self.cancel.sleep(op.config.round_interval()) {
                return finish(op, report, OperationState::Cancelled, None);
            }
        }
    }

    fn run_child(&mut self, child: ChildOperation, parent_remaining: u32) -> ChildRun {
        let ChildOperation {
            mut operation,
            optional,
            share_budget,
        } = child;
        let budget = if share_budget {
            operation.config.max_rounds.min(parent_remaining)
        } else {
            operation.config.max_rounds
        };
        log::debug!(
            "Delegating to '{}' (budget {}, optional {}, shared {})",
            operation.id(),
            budget,
            optional,
            share_budget
        );
        let report = self.run_node(&mut operation, budget);
        ChildRun {
            report,
            optional,
            shared: share_budget,
        }
    }

    /// Capture one frame; failures and overruns are hiccups
    fn acquire(&mut self, op: &Operation) -> Acquired {
        if !self.capture.is_available() {
            return Acquired::Hiccup(CaptureError::NotVisible("target".to_string()).to_string());
        }
        let started = Instant::now();
        match self.capture.capture() {
            Ok(frame) => {
                let elapsed = started.elapsed();
                if elapsed > op.config.round_timeout() {
                    Acquired::Hiccup(CaptureError::Timeout(elapsed).to_string())
                } else {
                    Acquired::Frame(frame)
                }
            }
            Err(e) => Acquired::Hiccup(e.to_string()),
        }
    }
}

struct ChildRun {
    report: OperationReport,
    optional: bool,
    shared: bool,
}

fn configuration(error: crate::AutomationError) -> FailureReason {
    FailureReason::Configuration {
        message: error.to_string(),
    }
}

fn finish(
    op: &mut Operation,
    mut report: OperationReport,
    state: OperationState,
    reason: Option<FailureReason>,
) -> OperationReport {
    op.state = state;
    report.state = state;
    if let Some(reason) = &reason {
        log::warn!("Operation '{}' failed: {}", report.id, reason);
    }
    report.reason = reason;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, OperationConfig};
    use crate::input::{DryRunInput, InputAction, InputError, Point};
    use crate::operation::OperationLogic;
    use crate::regions::{Region, RegionCatalog};
    use crate::vision::FrameSequenceCapture;
    use crate::Result;
    use std::sync::Arc;

    fn matcher() -> ScreenMatcher {
        let catalog = RegionCatalog::new(
            (100, 100),
            vec![Region::new("button", [0, 0, 10, 10]).with_text("go")],
        )
        .unwrap();
        ScreenMatcher::new(Arc::new(catalog), &EngineConfig::default())
            .with_recognizer(Arc::new(|f: &Frame, _: &str| {
                if f.get_pixel(0, 0).map(|p| p[0]) == Some(255) {
                    "go".to_string()
                } else {
                    String::new()
                }
            }))
    }

    fn dark() -> Frame {
        Frame::solid(100, 100, [0, 0, 0, 255])
    }

    fn lit() -> Frame {
        Frame::solid(100, 100, [255, 255, 255, 255])
    }

    fn quick() -> OperationConfig {
        OperationConfig::default().without_pauses()
    }

    /// Clicks the button until it shows, then succeeds
    struct PressUntilLit;

    impl OperationLogic for PressUntilLit {
        fn id(&self) -> &str {
            "press"
        }

        fn regions(&self) -> Vec<String> {
            vec!["button".to_string()]
        }

        fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision> {
            if ctx.is_present("button")? {
                Ok(Decision::Succeed)
            } else {
                ctx.click("button")
            }
        }
    }

    struct Declines;

    impl OperationLogic for Declines {
        fn id(&self) -> &str {
            "declines"
        }

        fn step(&mut self, _ctx: &RoundContext<'_>) -> Result<Decision> {
            Ok(Decision::fail("nothing to do"))
        }
    }

    struct Rejecting;

    impl InputController for Rejecting {
        fn click(&mut self, _point: Point) -> std::result::Result<(), InputError> {
            Err(InputError::NotAccepting("game".into()))
        }

        fn key(&mut self, _code: &str, _hold_ms: u64) -> std::result::Result<(), InputError> {
            Err(InputError::NotAccepting("game".into()))
        }

        fn drag(&mut self, _from: Point, _to: Point) -> std::result::Result<(), InputError> {
            Err(InputError::NotAccepting("game".into()))
        }
    }

    #[test]
    fn test_success_after_clicks() {
        let m = matcher();
        let mut capture = FrameSequenceCapture::from_frames(vec![dark(), dark(), lit()], false);
        let input = DryRunInput::new();
        let mut sink = input.clone();

        let mut op = Operation::new(Box::new(PressUntilLit), quick());
        let report = OperationDriver::new(&mut capture, &mut sink, &m).run(&mut op);

        assert_eq!(report.state, OperationState::Success);
        assert_eq!(op.state(), OperationState::Success);
        assert_eq!(report.rounds, 3);
        assert_eq!(input.actions(), vec![InputAction::Click(Point::new(5, 5)); 2]);
        assert!(report.last_frame.is_some());
    }

    #[test]
    fn test_logic_failure_is_terminal() {
        let m = matcher();
        let mut capture = FrameSequenceCapture::from_frames(vec![dark()], true);
        let mut input = DryRunInput::new();

        let mut op = Operation::new(Box::new(Declines), quick());
        let report = OperationDriver::new(&mut capture, &mut input, &m).run(&mut op);

        assert_eq!(report.state, OperationState::Fail);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.reason.unwrap().kind(), ErrorKind::OperationLogic);
    }

    #[test]
    fn test_unknown_region_fails_before_first_round() {
        struct Lost;
        impl OperationLogic for Lost {
            fn id(&self) -> &str {
                "lost"
            }
            fn regions(&self) -> Vec<String> {
                vec!["nowhere".to_string()]
            }
            fn step(&mut self, _ctx: &RoundContext<'_>) -> Result<Decision> {
                Ok(Decision::Continue)
            }
        }

        let m = matcher();
        let mut capture = FrameSequenceCapture::from_frames(vec![dark()], true);
        let mut input = DryRunInput::new();

        let mut op = Operation::new(Box::new(Lost), quick());
        let report = OperationDriver::new(&mut capture, &mut input, &m).run(&mut op);

        assert_eq!(report.rounds, 0);
        assert_eq!(report.reason.unwrap().kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn test_rejected_input_reaches_ceiling() {
        let m = matcher();
        let mut capture = FrameSequenceCapture::from_frames(vec![dark()], true);
        let mut input = Rejecting;

        let mut op = Operation::new(Box::new(PressUntilLit), quick().with_failure_ceiling(2));
        let report = OperationDriver::new(&mut capture, &mut input, &m).run(&mut op);

        assert_eq!(report.state, OperationState::Fail);
        assert_eq!(report.rounds, 2);
        assert!(matches!(
            report.reason,
            Some(FailureReason::TargetUnavailable { failures: 2, .. })
        ));
    }

    #[test]
    fn test_cancelled_before_first_round() {
        let m = matcher();
        let mut capture = FrameSequenceCapture::from_frames(vec![dark()], true);
        let mut input = DryRunInput::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut op = Operation::new(Box::new(PressUntilLit), quick());
        let report = OperationDriver::new(&mut capture, &mut input, &m)
            .with_cancel(cancel)
            .run(&mut op);

        assert_eq!(report.state, OperationState::Cancelled);
        assert_eq!(report.rounds, 0);
        assert!(input.is_empty());
    }
}
