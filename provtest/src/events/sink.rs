//! Event sinks for lifecycle events.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use super::event::LifecycleEvent;
use crate::core::Stage;

/// Receives lifecycle events from the controller.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: LifecycleEvent) {
        self.try_emit(event);
    }

    /// Emits an event without awaiting.
    ///
    /// Must never fail; sinks swallow and log their own errors.
    fn try_emit(&self, event: LifecycleEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event: LifecycleEvent) {}
}

/// Writes events to `tracing` at a fixed level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::info()
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`. Anything below INFO logs at DEBUG.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: LifecycleEvent) {
        let stage = event.stage.map(|s| s.to_string()).unwrap_or_default();
        if self.level > Level::INFO {
            debug!(
                run_id = %event.run_id,
                stage = %stage,
                data = %event.data,
                "{}",
                event.event_type
            );
        } else {
            info!(
                run_id = %event.run_id,
                stage = %stage,
                data = %event.data,
                "{}",
                event.event_type
            );
        }
    }
}

/// Keeps every event in memory for assertions.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<LifecycleEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.is(prefix))
            .cloned()
            .collect()
    }

    /// Returns the events emitted for one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage: Stage) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage == Some(stage))
            .cloned()
            .collect()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: LifecycleEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::names;
    use serde_json::json;
    use uuid::Uuid;

    fn stage_event(event_type: &str, stage: Stage) -> LifecycleEvent {
        LifecycleEvent::stage(event_type, Uuid::nil(), stage, json!({}))
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit(stage_event(names::STAGE_STARTED, Stage::Prepare)).await;
        sink.try_emit(stage_event(names::STAGE_COMPLETED, Stage::Prepare));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit(stage_event(names::STAGE_STARTED, Stage::Destroy)).await;
        LoggingEventSink::default()
            .try_emit(LifecycleEvent::run(names::RUN_COMPLETED, Uuid::nil(), json!({"passed": true})));
    }

    #[tokio::test]
    async fn test_collecting_sink_filters() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(LifecycleEvent::run(names::RUN_STARTED, Uuid::nil(), json!({}))).await;
        sink.try_emit(stage_event(names::STAGE_STARTED, Stage::Destroy));
        sink.try_emit(stage_event(names::STAGE_IGNORED, Stage::Destroy));
        sink.try_emit(stage_event(names::STAGE_STARTED, Stage::Cleanup));

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.events_of_type("lifecycle.stage.").len(), 3);
        assert_eq!(sink.events_for_stage(Stage::Destroy).len(), 2);
        assert_eq!(
            sink.event_types(),
            vec![
                names::RUN_STARTED,
                names::STAGE_STARTED,
                names::STAGE_IGNORED,
                names::STAGE_STARTED
            ]
        );

        sink.clear();
        assert!(sink.is_empty());
    }
}
