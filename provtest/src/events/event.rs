//! The lifecycle event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::Stage;

/// One lifecycle transition, as delivered to an [`EventSink`](super::EventSink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Dotted event name, one of [`names`](super::names).
    pub event_type: String,
    /// The run the event belongs to.
    pub run_id: Uuid,
    /// The stage, for stage-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Event-specific payload.
    pub data: serde_json::Value,
}

impl LifecycleEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(event_type: &str, run_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            run_id,
            stage: None,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(event_type: &str, run_id: Uuid, stage: Stage, data: serde_json::Value) -> Self {
        Self {
            stage: Some(stage),
            ..Self::run(event_type, run_id, data)
        }
    }

    /// Returns true if the event type starts with `prefix`.
    #[must_use]
    pub fn is(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}
