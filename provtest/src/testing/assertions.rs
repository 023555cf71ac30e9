//! Test assertions for lifecycle runs.

use super::session::CallLog;
use crate::core::{RunReport, Stage, StageStatus};
use crate::lifecycle::RunOutcome;

/// Asserts that the stages were invoked in exactly this order.
pub fn assert_stage_order(report: &RunReport, expected: &[Stage]) {
    assert_eq!(
        report.invoked(),
        expected,
        "Expected stages {:?}, got {:?}",
        expected,
        report.invoked()
    );
}

/// Asserts that a stage has the expected status.
pub fn assert_stage_status(report: &RunReport, stage: Stage, expected: StageStatus) {
    let actual = report.stage(stage).map(|r| r.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {} to be {:?}, got {:?}",
        stage,
        expected,
        actual
    );
}

/// Asserts that the session saw exactly one call to `stage`.
pub fn assert_invoked_once(log: &CallLog, stage: Stage) {
    assert_eq!(
        log.count(stage),
        1,
        "Expected {} to be invoked once, calls: {:?}",
        stage,
        log.calls()
    );
}

/// Asserts that the session never saw a call to `stage`.
pub fn assert_not_invoked(log: &CallLog, stage: Stage) {
    assert_eq!(
        log.count(stage),
        0,
        "Expected {} not to be invoked, calls: {:?}",
        stage,
        log.calls()
    );
}

/// Asserts that the run passed.
pub fn assert_run_passed(outcome: &RunOutcome) {
    assert!(
        outcome.is_success(),
        "Expected run to pass, got: {:?}",
        outcome.result
    );
}

/// Asserts that the run failed with an error from `stage`.
pub fn assert_run_failed_at(outcome: &RunOutcome, stage: Stage) {
    match &outcome.result {
        Ok(()) => panic!("Expected run to fail at {stage}, but it passed"),
        Err(e) => assert_eq!(
            e.stage(),
            Some(stage),
            "Expected failure at {}, got: {}",
            stage,
            e
        ),
    }
}
