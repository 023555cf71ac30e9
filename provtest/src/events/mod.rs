//! Event sink system for lifecycle observability.
//!
//! The lifecycle controller emits one event per stage transition. Sinks
//! decide what to do with them: drop, log through `tracing`, or collect
//! for assertions.

mod event;
mod sink;

pub use event::LifecycleEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the lifecycle controller.
pub mod names {
    /// A run began.
    pub const RUN_STARTED: &str = "lifecycle.run.started";
    /// A run ended, successfully or not.
    pub const RUN_COMPLETED: &str = "lifecycle.run.completed";
    /// A stage was entered.
    pub const STAGE_STARTED: &str = "lifecycle.stage.started";
    /// A stage completed successfully.
    pub const STAGE_COMPLETED: &str = "lifecycle.stage.completed";
    /// A stage failed fatally.
    pub const STAGE_FAILED: &str = "lifecycle.stage.failed";
    /// A stage failed and the failure was ignored.
    pub const STAGE_IGNORED: &str = "lifecycle.stage.ignored";
}
