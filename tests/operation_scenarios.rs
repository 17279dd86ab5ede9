//! Round-loop scenarios: budgets, hiccups, actions per round, composition

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use nyacore_automation::config::{EngineConfig, ExhaustionPolicy, OperationConfig};
use nyacore_automation::error::ErrorKind;
use nyacore_automation::input::{InputAction, Point};
use nyacore_automation::operation::{
    CancelToken, ChildOperation, ClickRegion, DismissIfPresent, FailureReason, Operation,
    OperationDriver, OperationState, Sequence, WaitRegion,
};
use nyacore_automation::vision::ScreenMatcher;
use nyacore_automation::DryRunInput;

fn matcher() -> ScreenMatcher {
    ScreenMatcher::new(Arc::new(catalog()), &EngineConfig::default())
        .with_recognizer(Arc::new(palette_ocr))
}

fn quick() -> OperationConfig {
    OperationConfig::default().without_pauses()
}

#[test]
fn test_budget_exhaustion_captures_exactly_max_rounds() {
    init_logging();
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let captures = capture.counter();
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(WaitRegion::new("confirm")),
        quick().with_max_rounds(5),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    assert_eq!(report.reason, Some(FailureReason::BudgetExceeded { rounds: 5 }));
    assert_eq!(report.reason.as_ref().unwrap().to_string(), "exceeded max rounds (5)");
    assert_eq!(captures.load(Ordering::SeqCst), 5);
    assert_eq!(op.state(), OperationState::Fail);
}

#[test]
fn test_tolerated_exhaustion_is_timeout() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(WaitRegion::new("confirm")),
        quick()
            .with_max_rounds(3)
            .with_exhaustion(ExhaustionPolicy::Tolerate),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Timeout);
    assert!(report.state.is_completion());
    assert_eq!(report.rounds, 3);
}

#[test]
fn test_hiccups_below_ceiling_are_absorbed() {
    init_logging();
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![None, None, Some(OK_RED)]);
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(WaitRegion::new("confirm")),
        quick().with_failure_ceiling(3).with_max_rounds(5),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Success);
    assert_eq!(report.absorbed_failures, 2);
    // failed captures do not consume rounds
    assert_eq!(report.rounds, 1);
}

#[test]
fn test_hiccups_at_ceiling_fail() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![None, None, None, Some(OK_RED)]);
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(WaitRegion::new("confirm")),
        quick().with_failure_ceiling(3),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    let reason = report.reason.unwrap();
    assert_eq!(reason.kind(), ErrorKind::TargetUnavailable);
    assert!(matches!(
        reason,
        FailureReason::TargetUnavailable { failures: 3, .. }
    ));
}

#[test]
fn test_good_round_resets_consecutive_failures() {
    let matcher = matcher();
    // two failures, a frame without the button, two more failures, then the button
    let mut capture = ScriptedCapture::new(vec![None, None, Some(0), None, None, Some(OK_RED)]);
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(WaitRegion::new("confirm")),
        quick().with_failure_ceiling(3),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Success);
    assert_eq!(report.absorbed_failures, 4);
    assert_eq!(report.rounds, 2);
}

#[test]
fn test_at_most_one_action_per_round() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(OK_RED)]);
    let mut input = CountingInput::default();

    let mut op = Operation::new(
        Box::new(ClickRegion::new("confirm")),
        quick().with_max_rounds(4),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    assert_eq!(report.rounds, 4);
    assert_eq!(input.calls, 4);
}

#[test]
fn test_click_targets_live_coordinates() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(OK_RED), Some(0)]);
    let input = DryRunInput::new();
    let mut controller = input.clone();

    let mut op = Operation::new(Box::new(ClickRegion::new("confirm")), quick());
    let report = OperationDriver::new(&mut capture, &mut controller, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Success);
    // [0, 0, 100, 100] at 1920x1080 maps to [0, 0, 50, 50] at 960x540
    assert_eq!(input.actions(), vec![InputAction::Click(Point::new(25, 25))]);
}

#[test]
fn test_rejected_input_counts_toward_ceiling() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(OK_RED)]);
    let mut input = CountingInput {
        reject: true,
        ..CountingInput::default()
    };

    let mut op = Operation::new(
        Box::new(ClickRegion::new("confirm")),
        quick().with_failure_ceiling(2),
    );
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    assert_eq!(
        report.reason.map(|r| r.kind()),
        Some(ErrorKind::TargetUnavailable)
    );
    assert_eq!(input.calls, 2);
}

#[test]
fn test_optional_step_failure_continues() {
    init_logging();
    let matcher = matcher();
    // no popup ever shows; the button is there from the start
    let mut capture = ScriptedCapture::new(vec![Some(OK_RED)]);
    let mut input = CountingInput::default();

    let sequence = Sequence::new("login")
        .then(
            ChildOperation::new(
                Box::new(WaitRegion::new("popup")),
                quick().with_max_rounds(2),
            )
            .optional(),
        )
        .then(ChildOperation::new(Box::new(WaitRegion::new("confirm")), quick()));
    let mut op = Operation::new(Box::new(sequence), quick());
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Success);
    assert_eq!(report.children.len(), 2);
    assert_eq!(report.children[0].state, OperationState::Fail);
    assert_eq!(report.children[1].state, OperationState::Success);
}

#[test]
fn test_dismiss_if_present_as_optional_step() {
    let matcher = matcher();
    // the parent's delegating round sees the popup too
    let mut capture =
        ScriptedCapture::new(vec![Some(POPUP_RED), Some(POPUP_RED), Some(OK_RED)]);
    let input = DryRunInput::new();
    let mut controller = input.clone();

    let sequence = Sequence::new("claim")
        .then(DismissIfPresent::new("popup").into_child(quick()))
        .then(ChildOperation::new(Box::new(WaitRegion::new("confirm")), quick()));
    let mut op = Operation::new(Box::new(sequence), quick());
    let report = OperationDriver::new(&mut capture, &mut controller, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Success);
    assert_eq!(input.len(), 1);
}

#[test]
fn test_required_step_failure_fails_parent() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let mut input = CountingInput::default();

    let sequence = Sequence::new("shop").then(ChildOperation::new(
        Box::new(WaitRegion::new("confirm")),
        quick().with_max_rounds(3),
    ));
    let mut op = Operation::new(Box::new(sequence), quick());
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    let reason = report.reason.clone().unwrap();
    assert!(matches!(reason, FailureReason::ChildFailed { ref child, .. } if child == "wait:confirm"));
    assert_eq!(reason.root(), &FailureReason::BudgetExceeded { rounds: 3 });
    assert_eq!(reason.kind(), ErrorKind::BudgetExceeded);
    assert_eq!(report.diagnostic_frame().map(|f| f.width), Some(960));
}

#[test]
fn test_shared_budget_caps_child() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let captures = capture.counter();
    let mut input = CountingInput::default();

    let sequence = Sequence::new("outer").then(
        ChildOperation::new(
            Box::new(WaitRegion::new("confirm")),
            quick().with_max_rounds(100),
        )
        .sharing_budget(),
    );
    let mut op = Operation::new(Box::new(sequence), quick().with_max_rounds(6));
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    // one delegating round for the parent, the remaining five for the child
    assert_eq!(report.children[0].rounds, 5);
    assert_eq!(captures.load(Ordering::SeqCst), 6);
}

#[test]
fn test_cancellation_mid_run() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let mut input = CountingInput::default();
    let cancel = CancelToken::new();

    let config = OperationConfig {
        round_interval_ms: 10,
        ..OperationConfig::default()
    }
    .with_max_rounds(10_000);
    let mut op = Operation::new(Box::new(WaitRegion::new("confirm")), config);

    let remote = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(60));
        remote.cancel();
    });
    let report = OperationDriver::new(&mut capture, &mut input, &matcher)
        .with_cancel(cancel)
        .run(&mut op);
    canceller.join().unwrap();

    assert_eq!(report.state, OperationState::Cancelled);
    assert!(report.rounds > 0 && report.rounds < 10_000);
    assert!(report.reason.is_none());
}

#[test]
fn test_timed_out_required_step_fails_parent() {
    let matcher = matcher();
    let mut capture = ScriptedCapture::new(vec![Some(0)]);
    let mut input = CountingInput::default();

    let tolerant = quick()
        .with_max_rounds(2)
        .with_exhaustion(ExhaustionPolicy::Tolerate);
    let sequence = Sequence::new("patrol")
        .then(
            ChildOperation::new(Box::new(WaitRegion::new("popup")), tolerant.clone()).optional(),
        )
        .then(ChildOperation::new(Box::new(WaitRegion::new("confirm")), tolerant));
    let mut op = Operation::new(Box::new(sequence), quick());
    let report = OperationDriver::new(&mut capture, &mut input, &matcher).run(&mut op);

    assert_eq!(report.state, OperationState::Fail);
    assert_eq!(report.children[0].state, OperationState::Timeout);
    assert_eq!(report.children[1].state, OperationState::Timeout);
    assert_eq!(
        report.reason.unwrap().root(),
        &FailureReason::BudgetExceeded { rounds: 2 }
    );
}
