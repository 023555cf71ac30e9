//! Per-stage records and the run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{Classification, Stage, StageStatus};

/// Outcome of one lifecycle stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage.
    pub stage: Stage,
    /// Stage status.
    pub status: StageStatus,
    /// When the stage started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a record for a stage that just started.
    #[must_use]
    pub fn running(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            started_at: Some(Utc::now()),
            ended_at: None,
            error: None,
        }
    }

    /// Creates a record for a stage that was never reached.
    #[must_use]
    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Marks the stage as completed.
    pub fn complete(&mut self) {
        self.status = StageStatus::Ok;
        self.ended_at = Some(Utc::now());
    }

    /// Marks the stage as failed.
    pub fn fail(&mut self, classification: Classification, error: impl Into<String>) {
        self.status = StageStatus::Failed(classification);
        self.ended_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Returns the duration in milliseconds, if the stage ran to an end.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// Returns true if the stage was actually invoked.
    #[must_use]
    pub fn was_invoked(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Summary of a single lifecycle run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Human-readable test name.
    pub name: String,
    /// Records in the order stages were entered.
    pub stages: Vec<StageRecord>,
    /// Whether the productive stages completed.
    pub finished: bool,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(run_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            run_id,
            name: name.into(),
            stages: Vec::new(),
            finished: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Records that a stage was entered and returns its record.
    pub fn begin(&mut self, stage: Stage) -> &mut StageRecord {
        self.stages.push(StageRecord::running(stage));
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    /// Returns the record of a stage that is still running.
    pub fn running_mut(&mut self) -> Option<&mut StageRecord> {
        self.stages
            .iter_mut()
            .rev()
            .find(|r| r.status == StageStatus::Running)
    }

    /// Returns the latest record of the given stage.
    pub fn record_mut(&mut self, stage: Stage) -> Option<&mut StageRecord> {
        self.stages.iter_mut().rev().find(|r| r.stage == stage)
    }

    /// Returns the record of the given stage.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().rev().find(|r| r.stage == stage)
    }

    /// Adds skipped records for every stage without one.
    pub fn mark_unreached_skipped(&mut self) {
        for stage in Stage::ALL {
            if self.stage(stage).is_none() {
                self.stages.push(StageRecord::skipped(stage));
            }
        }
    }

    /// Closes the report.
    pub fn close(&mut self, finished: bool) {
        self.finished = finished;
        self.ended_at = Some(Utc::now());
    }

    /// Returns the stages that were invoked, in invocation order.
    #[must_use]
    pub fn invoked(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|r| r.was_invoked())
            .map(|r| r.stage)
            .collect()
    }

    /// Returns true if the stage was invoked.
    #[must_use]
    pub fn was_invoked(&self, stage: Stage) -> bool {
        self.stage(stage).is_some_and(StageRecord::was_invoked)
    }

    /// Returns the failures that were logged and swallowed.
    #[must_use]
    pub fn ignored_failures(&self) -> Vec<&StageRecord> {
        self.stages.iter().filter(|r| r.status.is_ignored()).collect()
    }

    /// Returns the failures that decide the run result.
    #[must_use]
    pub fn fatal_failures(&self) -> Vec<&StageRecord> {
        self.stages.iter().filter(|r| r.status.is_fatal()).collect()
    }

    /// Returns true if no stage failed fatally.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.fatal_failures().is_empty()
    }

    /// Returns the total run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
