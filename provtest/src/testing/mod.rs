//! Testing utilities for lifecycle runs.
//!
//! This module provides:
//! - A scripted session whose stages succeed, fail or panic on demand
//! - Assertions over run reports and call logs

mod assertions;
mod session;

pub use assertions::{
    assert_invoked_once, assert_not_invoked, assert_run_failed_at, assert_run_passed,
    assert_stage_order, assert_stage_status,
};
pub use session::{CallLog, ScriptedSession, StageScript};
