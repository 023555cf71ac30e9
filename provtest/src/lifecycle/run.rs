//! A single execution of a provisioning test.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::session::{OutputCapture, RuntimeValidation, TestSession};

/// One execution of a provisioning test.
///
/// Owns the session, its captured output and the runtime validation
/// callback for the length of one test; nothing here is shared across runs.
pub struct TestRun<S> {
    id: Uuid,
    name: String,
    session: S,
    work_dir: Option<PathBuf>,
    finished: bool,
    executed: bool,
    stdout: OutputCapture,
    stderr: OutputCapture,
    validation: Option<RuntimeValidation>,
}

impl<S: TestSession> TestRun<S> {
    /// Creates a run around `session` and attaches fresh output sinks to it.
    pub fn new(name: impl Into<String>, mut session: S) -> Self {
        let stdout = OutputCapture::new();
        let stderr = OutputCapture::new();
        session.attach_output(stdout.clone(), stderr.clone());
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            session,
            work_dir: None,
            finished: false,
            executed: false,
            stdout,
            stderr,
            validation: None,
        }
    }

    /// Sets the check run against stack outputs after a successful update.
    #[must_use]
    pub fn with_validation(mut self, validation: RuntimeValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wrapped session.
    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Returns the wrapped session mutably.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Consumes the run, returning the session.
    pub fn into_session(self) -> S {
        self.session
    }

    /// Returns the working directory, once prepared.
    #[must_use]
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Returns whether the productive stages completed.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Returns true once a controller has driven this run.
    #[must_use]
    pub fn was_executed(&self) -> bool {
        self.executed
    }

    /// Returns captured stdout.
    #[must_use]
    pub fn stdout(&self) -> &OutputCapture {
        &self.stdout
    }

    /// Returns captured stderr.
    #[must_use]
    pub fn stderr(&self) -> &OutputCapture {
        &self.stderr
    }

    /// Returns captured stderr followed by stdout.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.contents();
        }
        let mut out = self.stderr.contents();
        let stdout = self.stdout.contents();
        if !stdout.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&stdout);
        out
    }

    /// Marks the run as executed, returning false if it already was.
    pub(crate) fn mark_executed(&mut self) -> bool {
        !std::mem::replace(&mut self.executed, true)
    }

    pub(crate) fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
        self.session.set_finished(finished);
    }

    pub(crate) fn refresh_work_dir(&mut self) {
        self.work_dir = self.session.work_dir();
    }

    pub(crate) fn take_validation(&mut self) -> Option<RuntimeValidation> {
        self.validation.take()
    }
}

impl<S> std::fmt::Debug for TestRun<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRun")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("work_dir", &self.work_dir)
            .field("finished", &self.finished)
            .field("executed", &self.executed)
            .field("has_validation", &self.validation.is_some())
            .finish_non_exhaustive()
    }
}
