//! Staged test lifecycle with guaranteed teardown.
//!
//! This module provides:
//! - `TestRun` wrapping one session for the duration of a test
//! - `LifecycleController` sequencing the stages and classifying failures
//! - `DeferredStages`, the LIFO stack of teardown stages owed by a run

mod controller;
mod deferred;
mod run;

pub use controller::{LifecycleController, RunOutcome};
pub use deferred::DeferredStages;
pub use run::TestRun;
