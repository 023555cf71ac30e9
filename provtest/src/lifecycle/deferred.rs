//! Teardown stages owed by a run, executed in LIFO order.

use crate::core::Stage;

/// Stack of teardown stages scheduled during a run.
///
/// A stage is pushed the moment the run becomes responsible for it, and the
/// stack is drained in reverse on every exit path. Each stage can be
/// scheduled at most once.
#[derive(Debug, Default)]
pub struct DeferredStages {
    stages: Vec<Stage>,
}

impl DeferredStages {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a teardown stage.
    ///
    /// Returns false if the stage was already scheduled.
    pub fn defer(&mut self, stage: Stage) -> bool {
        debug_assert!(stage.is_teardown(), "only teardown stages are deferred");
        if self.stages.contains(&stage) {
            return false;
        }
        self.stages.push(stage);
        true
    }

    /// Returns the number of pending stages.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.stages.len()
    }

    /// Takes all scheduled stages, most recently deferred first.
    pub fn drain(&mut self) -> impl Iterator<Item = Stage> {
        std::mem::take(&mut self.stages).into_iter().rev()
    }
}
