//! A scripted session for exercising the lifecycle controller.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::EditDir;
use crate::core::Stage;
use crate::errors::SessionError;
use crate::session::{OutputCapture, StackOutputs, TestSession};

/// What a scripted stage does when invoked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageScript {
    /// Return success.
    #[default]
    Succeed,
    /// Write the message to stderr and return a fatal error.
    Fail(String),
    /// Return an error the session has already reported.
    FailExpected(String),
    /// Panic with the message.
    Panic(String),
}

/// Shared record of the calls a [`ScriptedSession`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Stage>>>,
    finished: Arc<Mutex<Vec<bool>>>,
    edits: Arc<Mutex<Vec<PathBuf>>>,
}

impl CallLog {
    /// Returns every stage call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().clone()
    }

    /// Returns how many times `stage` was called.
    #[must_use]
    pub fn count(&self, stage: Stage) -> usize {
        self.calls.lock().iter().filter(|s| **s == stage).count()
    }

    /// Returns every value passed to `set_finished`, in order.
    #[must_use]
    pub fn finished_updates(&self) -> Vec<bool> {
        self.finished.lock().clone()
    }

    /// Returns the edit steps applied, in order.
    #[must_use]
    pub fn edits(&self) -> Vec<PathBuf> {
        self.edits.lock().clone()
    }

    pub(crate) fn record(&self, stage: Stage) {
        self.calls.lock().push(stage);
    }
}

/// A [`TestSession`] whose stages follow a script.
///
/// Stages without a script succeed.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    scripts: HashMap<Stage, StageScript>,
    log: CallLog,
    outputs: StackOutputs,
    edit_dirs: Vec<EditDir>,
    use_temp_dir: bool,
    temp_dir: Option<TempDir>,
    stdout: Option<OutputCapture>,
    stderr: Option<OutputCapture>,
}

impl ScriptedSession {
    /// Creates a session where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the script for one stage.
    #[must_use]
    pub fn script(mut self, stage: Stage, script: StageScript) -> Self {
        self.scripts.insert(stage, script);
        self
    }

    /// Makes `stage` fail with `message`.
    #[must_use]
    pub fn fail_on(self, stage: Stage, message: impl Into<String>) -> Self {
        self.script(stage, StageScript::Fail(message.into()))
    }

    /// Makes `stage` fail with an already-reported error.
    #[must_use]
    pub fn fail_expected_on(self, stage: Stage, message: impl Into<String>) -> Self {
        self.script(stage, StageScript::FailExpected(message.into()))
    }

    /// Makes `stage` panic with `message`.
    #[must_use]
    pub fn panic_on(self, stage: Stage, message: impl Into<String>) -> Self {
        self.script(stage, StageScript::Panic(message.into()))
    }

    /// Adds a stack output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Applies these edit steps after the update, running each one's check.
    #[must_use]
    pub fn with_edit_dirs(mut self, edits: Vec<EditDir>) -> Self {
        self.edit_dirs = edits;
        self
    }

    /// Materializes a real temporary working directory in `prepare`.
    #[must_use]
    pub fn with_temp_dir(mut self) -> Self {
        self.use_temp_dir = true;
        self
    }

    /// Returns a handle to the call log.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Returns the attached stdout sink.
    #[must_use]
    pub fn stdout(&self) -> Option<OutputCapture> {
        self.stdout.clone()
    }

    /// Returns the attached stderr sink.
    #[must_use]
    pub fn stderr(&self) -> Option<OutputCapture> {
        self.stderr.clone()
    }

    fn step(&mut self, stage: Stage) -> Result<(), SessionError> {
        self.log.record(stage);
        if let Some(stdout) = self.stdout.as_mut() {
            let _ = writeln!(stdout, "{stage}: running");
        }
        match self.scripts.get(&stage).cloned().unwrap_or_default() {
            StageScript::Succeed => Ok(()),
            StageScript::Fail(message) => {
                if let Some(stderr) = self.stderr.as_mut() {
                    let _ = writeln!(stderr, "error: {message}");
                }
                Err(SessionError::msg(message))
            }
            StageScript::FailExpected(message) => {
                Err(SessionError::expected_failure(anyhow::Error::msg(message)))
            }
            StageScript::Panic(message) => panic!("{message}"),
        }
    }
}

#[async_trait]
impl TestSession for ScriptedSession {
    async fn prepare(&mut self) -> Result<(), SessionError> {
        self.step(Stage::Prepare)?;
        if self.use_temp_dir {
            let dir = tempfile::Builder::new()
                .prefix("provtest-")
                .tempdir()
                .map_err(SessionError::fatal)?;
            self.temp_dir = Some(dir);
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        self.step(Stage::Initialize)
    }

    async fn preview_update_and_edits(&mut self) -> Result<(), SessionError> {
        self.step(Stage::PreviewUpdateValidate)?;
        for edit in self.edit_dirs.clone() {
            self.log.edits.lock().push(edit.dir.clone());
            if let Some(stdout) = self.stdout.as_mut() {
                let _ = writeln!(stdout, "applying edit {}", edit.dir.display());
            }
            if let Err(e) = edit.validate(self.outputs.clone()).await {
                return Err(SessionError::msg(format!(
                    "edit step {}: {e:#}",
                    edit.dir.display()
                )));
            }
        }
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), SessionError> {
        self.step(Stage::Destroy)
    }

    async fn cleanup(&mut self) -> Result<(), SessionError> {
        self.step(Stage::Cleanup)?;
        if let Some(dir) = self.temp_dir.take() {
            dir.close().map_err(SessionError::fatal)?;
        }
        Ok(())
    }

    fn set_finished(&mut self, finished: bool) {
        self.log.finished.lock().push(finished);
    }

    fn stack_outputs(&self) -> StackOutputs {
        self.outputs.clone()
    }

    fn work_dir(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    fn attach_output(&mut self, stdout: OutputCapture, stderr: OutputCapture) {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_script_succeeds() {
        let mut session = ScriptedSession::new();
        let log = session.call_log();

        session.prepare().await.unwrap();
        session.initialize().await.unwrap();

        assert_eq!(log.calls(), vec![Stage::Prepare, Stage::Initialize]);
        assert_eq!(log.count(Stage::Destroy), 0);
    }

    #[tokio::test]
    async fn test_fail_writes_stderr() {
        let stderr = OutputCapture::new();
        let mut session = ScriptedSession::new().fail_on(Stage::Destroy, "DependencyViolation");
        session.attach_output(OutputCapture::new(), stderr.clone());

        let err = session.destroy().await.unwrap_err();
        assert_eq!(err.to_string(), "DependencyViolation");
        assert_eq!(stderr.contents(), "error: DependencyViolation\n");
    }

    #[tokio::test]
    async fn test_fail_expected_kind() {
        let mut session =
            ScriptedSession::new().fail_expected_on(Stage::PreviewUpdateValidate, "update failed");
        let err = session.preview_update_and_edits().await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::ExpectedFailure);
    }

    #[tokio::test]
    async fn test_edit_steps_run_in_order() {
        let mut session = ScriptedSession::new()
            .with_output("stringValue", serde_json::json!("testvalue"))
            .with_edit_dirs(vec![
                EditDir::new("step2").additive(),
                EditDir::new("step3").with_validation(|_| async {
                    Err::<(), _>(anyhow::anyhow!("resource replaced"))
                }),
            ]);
        let log = session.call_log();

        let err = session.preview_update_and_edits().await.unwrap_err();

        assert_eq!(log.edits(), vec![PathBuf::from("step2"), PathBuf::from("step3")]);
        assert_eq!(err.to_string(), "edit step step3: resource replaced");
    }

    #[tokio::test]
    async fn test_temp_dir_lifecycle() {
        let mut session = ScriptedSession::new().with_temp_dir();
        assert!(session.work_dir().is_none());

        session.prepare().await.unwrap();
        let dir = session.work_dir().unwrap();
        assert!(dir.exists());

        session.cleanup().await.unwrap();
        assert!(!dir.exists());
        assert!(session.work_dir().is_none());
    }

    #[tokio::test]
    async fn test_outputs_and_finished() {
        let mut session =
            ScriptedSession::new().with_output("kinesisStreamName", serde_json::json!("mystream-1"));
        let log = session.call_log();

        session.set_finished(false);
        session.set_finished(true);

        assert_eq!(log.finished_updates(), vec![false, true]);
        assert_eq!(
            session.stack_outputs().get("kinesisStreamName"),
            Some(&serde_json::json!("mystream-1"))
        );
    }
}
