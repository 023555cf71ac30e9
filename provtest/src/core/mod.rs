//! Core domain model types for provtest.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The lifecycle stage enum and its status/classification types
//! - Per-stage records and the run report

mod report;
mod stage;

pub use report::{RunReport, StageRecord};
pub use stage::{Classification, Stage, StageStatus};
