//! Lifecycle stage, status and failure classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ordered step of a provisioning test's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Materialize the test's working copy.
    Prepare,
    /// Establish the named stack against the provisioning backend.
    Initialize,
    /// Preview, update, apply edits and run runtime validation.
    PreviewUpdateValidate,
    /// Tear down provisioned resources.
    Destroy,
    /// Release local resources.
    Cleanup,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Prepare,
        Self::Initialize,
        Self::PreviewUpdateValidate,
        Self::Destroy,
        Self::Cleanup,
    ];

    /// Returns true for the stages that run on every exit path once scheduled.
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Destroy | Self::Cleanup)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Initialize => write!(f, "initialize"),
            Self::PreviewUpdateValidate => write!(f, "preview_update_validate"),
            Self::Destroy => write!(f, "destroy"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// How a stage failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Ends the run with a failing result.
    Fatal,
    /// Logged and swallowed; the run continues.
    Ignorable,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Ignorable => write!(f, "ignorable"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not run.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Ok,
    /// Stage failed with the given classification.
    Failed(Classification),
    /// Stage was never reached.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Failed(classification) => write!(f, "failed ({classification})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Failed(_) | Self::Skipped)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status is a fatal failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed(Classification::Fatal))
    }

    /// Returns true if the status is an ignored failure.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Failed(Classification::Ignorable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Prepare.to_string(), "prepare");
        assert_eq!(Stage::PreviewUpdateValidate.to_string(), "preview_update_validate");
        assert_eq!(Stage::Destroy.to_string(), "destroy");
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::ALL.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_teardown_stages() {
        assert!(Stage::Destroy.is_teardown());
        assert!(Stage::Cleanup.is_teardown());
        assert!(!Stage::Initialize.is_teardown());
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Ok.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Failed(Classification::Fatal).is_fatal());
        assert!(StageStatus::Failed(Classification::Ignorable).is_ignored());
        assert!(!StageStatus::Failed(Classification::Ignorable).is_success());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Ok).unwrap();
        assert_eq!(json, r#""ok""#);

        let json = serde_json::to_string(&StageStatus::Failed(Classification::Ignorable)).unwrap();
        assert_eq!(json, r#"{"failed":"ignorable"}"#);

        let status: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, StageStatus::Failed(Classification::Ignorable));
    }
}
