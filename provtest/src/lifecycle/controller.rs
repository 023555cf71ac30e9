//! Stage sequencing, failure classification and guaranteed teardown.

use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use super::deferred::DeferredStages;
use super::run::TestRun;
use crate::config::{RunOptions, TeardownPolicy};
use crate::core::{Classification, RunReport, Stage};
use crate::errors::{Diagnostics, LifecycleError, SessionError};
use crate::events::{names, EventSink, LifecycleEvent, NoOpEventSink};
use crate::observability::{run_span, stage_span};
use crate::session::TestSession;

const PREPARE_CONTEXT: &str = "copying test to temp dir";
const INITIALIZE_CONTEXT: &str = "initializing test project";

type PanicPayload = Box<dyn Any + Send>;

/// The report of a run together with its result.
#[derive(Debug)]
pub struct RunOutcome {
    /// Per-stage record of what happened.
    pub report: RunReport,
    /// The test result.
    pub result: Result<(), LifecycleError>,
}

impl RunOutcome {
    /// Returns true if the run passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Converts into the report on success, or the error on failure.
    pub fn into_result(self) -> Result<RunReport, LifecycleError> {
        let Self { report, result } = self;
        result.map(|()| report)
    }
}

/// Drives a [`TestRun`] through its stages.
///
/// Stages run strictly in order. Once Initialize is entered, Cleanup is owed;
/// once it succeeds, Destroy is owed too. Owed stages run on every exit path,
/// including a panic in the update or validation stage.
#[derive(Clone)]
pub struct LifecycleController {
    policy: TeardownPolicy,
    events: Arc<dyn EventSink>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new(TeardownPolicy::default())
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Creates a controller with the given teardown policy.
    #[must_use]
    pub fn new(policy: TeardownPolicy) -> Self {
        Self {
            policy,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a controller whose Destroy failures fail the test.
    #[must_use]
    pub fn strict() -> Self {
        Self::new(TeardownPolicy::Strict)
    }

    /// Creates a controller that logs and ignores Destroy failures.
    #[must_use]
    pub fn best_effort() -> Self {
        Self::new(TeardownPolicy::BestEffort)
    }

    /// Creates a controller for `options`, rejecting unsupported combinations.
    pub fn from_options(options: &RunOptions) -> Result<Self, LifecycleError> {
        let controller = Self::new(options.teardown);
        controller.check_options(options)?;
        Ok(controller)
    }

    /// Sets the sink lifecycle events are emitted to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the teardown policy.
    #[must_use]
    pub fn policy(&self) -> TeardownPolicy {
        self.policy
    }

    /// Checks that `options` can be honoured under this controller's policy.
    ///
    /// Best-effort teardown destroys the stack itself, so it cannot be
    /// combined with destroy-on-cleanup or the extra baseline update.
    pub fn check_options(&self, options: &RunOptions) -> Result<(), LifecycleError> {
        if self.policy != TeardownPolicy::BestEffort {
            return Ok(());
        }
        let unsupported = [
            ("destroy_on_cleanup", options.destroy_on_cleanup),
            ("run_update_test", options.run_update_test),
        ];
        match unsupported.into_iter().find(|(_, set)| *set) {
            Some((option, _)) => Err(LifecycleError::UnsupportedOption {
                option,
                policy: self.policy,
            }),
            None => Ok(()),
        }
    }

    /// Runs every stage and returns the report, or the error that failed the run.
    pub async fn run<S: TestSession>(&self, run: &mut TestRun<S>) -> Result<RunReport, LifecycleError> {
        self.execute(run).await.into_result()
    }

    /// Runs every stage and returns the report together with the result.
    ///
    /// # Panics
    ///
    /// Re-raises the first panic from any stage after Prepare, once every owed
    /// teardown stage has run.
    ///
    /// A run executes at most once; driving it again returns
    /// [`LifecycleError::AlreadyExecuted`] without touching the session.
    pub async fn execute<S: TestSession>(&self, run: &mut TestRun<S>) -> RunOutcome {
        let span = run_span(run.id(), run.name());
        self.execute_stages(run).instrument(span).await
    }

    async fn execute_stages<S: TestSession>(&self, run: &mut TestRun<S>) -> RunOutcome {
        let mut report = RunReport::new(run.id(), run.name());
        if !run.mark_executed() {
            warn!("Test run already executed, refusing to re-enter its stages");
            report.mark_unreached_skipped();
            report.close(run.finished());
            return RunOutcome {
                report,
                result: Err(LifecycleError::AlreadyExecuted { run_id: run.id() }),
            };
        }

        self.emit(LifecycleEvent::run(
            names::RUN_STARTED,
            run.id(),
            json!({ "test": run.name(), "policy": self.policy.to_string() }),
        ));

        if let Err(source) = self.run_stage(run, Stage::Prepare, &mut report).await {
            error!(error = %source, "Prepare failed, nothing to tear down");
            self.record_failure(&mut report, Stage::Prepare, Classification::Fatal, &source);
            let err = LifecycleError::SetupFailure {
                stage: Stage::Prepare,
                context: PREPARE_CONTEXT,
                source,
            };
            return self.finish(run, report, Err(err));
        }
        run.refresh_work_dir();

        run.set_finished(false);
        let mut deferred = DeferredStages::new();
        deferred.defer(Stage::Cleanup);

        let body = AssertUnwindSafe(self.run_body(run, &mut report, &mut deferred))
            .catch_unwind()
            .await;

        let (primary, body_panic) = match body {
            Ok(result) => (result, None),
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(panic = %message, "Test body panicked, tearing down before resuming");
                if let Some(record) = report.running_mut() {
                    record.fail(Classification::Fatal, format!("panicked: {message}"));
                }
                (Ok(()), Some(payload))
            }
        };

        let body_failed = primary.is_err() || body_panic.is_some();
        let (teardown, teardown_panic) =
            self.teardown(run, &mut report, &mut deferred, body_failed).await;

        if let Some(payload) = body_panic.or(teardown_panic) {
            report.mark_unreached_skipped();
            report.close(run.finished());
            self.emit(LifecycleEvent::run(
                names::RUN_COMPLETED,
                report.run_id,
                json!({ "passed": false, "finished": report.finished, "panicked": true }),
            ));
            std::panic::resume_unwind(payload);
        }

        // An update failure outranks a teardown failure; the latter is
        // already logged and recorded.
        self.finish(run, report, primary.and(teardown))
    }

    async fn run_body<S: TestSession>(
        &self,
        run: &mut TestRun<S>,
        report: &mut RunReport,
        deferred: &mut DeferredStages,
    ) -> Result<(), LifecycleError> {
        if let Err(source) = self.run_stage(run, Stage::Initialize, report).await {
            error!(error = %source, "Initialize failed");
            self.record_failure(report, Stage::Initialize, Classification::Fatal, &source);
            return Err(LifecycleError::SetupFailure {
                stage: Stage::Initialize,
                context: INITIALIZE_CONTEXT,
                source,
            });
        }
        deferred.defer(Stage::Destroy);

        if let Err(source) = self.run_stage(run, Stage::PreviewUpdateValidate, report).await {
            error!(error = %source, "Preview, update or validation failed");
            self.record_failure(
                report,
                Stage::PreviewUpdateValidate,
                Classification::Fatal,
                &source,
            );
            return Err(LifecycleError::ValidationFailure {
                source,
                diagnostics: Diagnostics(run.diagnostics()),
            });
        }

        run.set_finished(true);
        Ok(())
    }

    async fn teardown<S: TestSession>(
        &self,
        run: &mut TestRun<S>,
        report: &mut RunReport,
        deferred: &mut DeferredStages,
        body_failed: bool,
    ) -> (Result<(), LifecycleError>, Option<PanicPayload>) {
        debug!(pending = deferred.pending_count(), "Running owed teardown stages");
        let mut result = Ok(());
        let mut panic = None;
        for stage in deferred.drain() {
            let outcome = AssertUnwindSafe(self.run_stage(run, stage, report))
                .catch_unwind()
                .await;
            let source = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => source,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    error!(stage = %stage, panic = %message, "Teardown stage panicked, continuing teardown");
                    if panic.is_none() {
                        panic = Some(payload);
                    }
                    SessionError::msg(format!("panicked: {message}"))
                }
            };
            match (stage, self.policy) {
                (Stage::Destroy, TeardownPolicy::Strict) => {
                    if body_failed {
                        error!(error = %source, "Destroy also failed after an earlier failure");
                    } else {
                        error!(error = %source, "Destroy failed");
                    }
                    self.record_failure(report, stage, Classification::Fatal, &source);
                    result = Err(LifecycleError::TeardownFailure { source });
                }
                (Stage::Destroy, TeardownPolicy::BestEffort) => {
                    warn!(error = %source, "Ignoring destroy error");
                    self.record_failure(report, stage, Classification::Ignorable, &source);
                }
                _ => {
                    warn!(stage = %stage, error = %source, "Cleanup failed");
                    self.record_failure(report, stage, Classification::Ignorable, &source);
                }
            }
        }
        (result, panic)
    }

    async fn run_stage<S: TestSession>(
        &self,
        run: &mut TestRun<S>,
        stage: Stage,
        report: &mut RunReport,
    ) -> Result<(), SessionError> {
        report.begin(stage);
        self.emit(LifecycleEvent::stage(names::STAGE_STARTED, run.id(), stage, json!({})));

        let span = stage_span(run.id(), stage);
        let result = invoke(run, stage).instrument(span).await;

        if result.is_ok() {
            if let Some(record) = report.record_mut(stage) {
                record.complete();
            }
            debug!(stage = %stage, "Stage completed");
            self.emit(LifecycleEvent::stage(names::STAGE_COMPLETED, run.id(), stage, json!({})));
        }
        result
    }

    fn record_failure(
        &self,
        report: &mut RunReport,
        stage: Stage,
        classification: Classification,
        error: &SessionError,
    ) {
        if let Some(record) = report.record_mut(stage) {
            record.fail(classification, error.to_string());
        }
        let event = match classification {
            Classification::Fatal => names::STAGE_FAILED,
            Classification::Ignorable => names::STAGE_IGNORED,
        };
        self.emit(LifecycleEvent::stage(
            event,
            report.run_id,
            stage,
            json!({
                "classification": classification,
                "kind": error.kind().to_string(),
                "error": error.to_string(),
            }),
        ));
    }

    fn finish<S: TestSession>(
        &self,
        run: &TestRun<S>,
        mut report: RunReport,
        result: Result<(), LifecycleError>,
    ) -> RunOutcome {
        report.mark_unreached_skipped();
        report.close(run.finished());

        let ignored = report.ignored_failures().len();
        match &result {
            Ok(()) => info!(ignored_failures = ignored, "Test run passed"),
            Err(e) if e.is_expected_failure() => {
                info!(error = %e, "Test run failed, already reported by the session");
            }
            Err(e) => error!(error = %e, "Test run failed"),
        }
        self.emit(LifecycleEvent::run(
            names::RUN_COMPLETED,
            report.run_id,
            json!({
                "passed": result.is_ok(),
                "finished": report.finished,
                "ignored_failures": ignored,
            }),
        ));

        RunOutcome { report, result }
    }

    fn emit(&self, event: LifecycleEvent) {
        self.events.try_emit(event);
    }
}

async fn invoke<S: TestSession>(run: &mut TestRun<S>, stage: Stage) -> Result<(), SessionError> {
    match stage {
        Stage::Prepare => run.session_mut().prepare().await,
        Stage::Initialize => run.session_mut().initialize().await,
        Stage::PreviewUpdateValidate => {
            run.session_mut().preview_update_and_edits().await?;
            if let Some(validation) = run.take_validation() {
                let outputs = run.session().stack_outputs();
                debug!(outputs = outputs.len(), "Running runtime validation");
                validation(outputs).await.map_err(SessionError::fatal)?;
            }
            Ok(())
        }
        Stage::Destroy => run.session_mut().destroy().await,
        Stage::Cleanup => run.session_mut().cleanup().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockTestSession, StackOutputs};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::path::PathBuf;

    fn mock_session() -> MockTestSession {
        let mut mock = MockTestSession::new();
        mock.expect_attach_output().return_const(());
        mock.expect_work_dir().return_const(None::<PathBuf>);
        mock.expect_stack_outputs().returning(StackOutputs::new);
        mock
    }

    #[tokio::test]
    async fn test_stages_called_in_order() {
        let mut mock = mock_session();
        let mut seq = Sequence::new();
        mock.expect_prepare().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        mock.expect_set_finished()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mock.expect_initialize().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        mock.expect_preview_update_and_edits()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        mock.expect_set_finished()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mock.expect_destroy().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        mock.expect_cleanup().times(1).in_sequence(&mut seq).returning(|| Ok(()));

        let mut run = TestRun::new("ordered", mock);
        let report = LifecycleController::strict().run(&mut run).await.unwrap();

        assert!(report.finished);
        assert_eq!(report.invoked(), Stage::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_prepare_failure_skips_everything() {
        let mut mock = mock_session();
        mock.expect_prepare()
            .times(1)
            .returning(|| Err(SessionError::msg("cannot copy program")));
        mock.expect_initialize().never();
        mock.expect_destroy().never();
        mock.expect_cleanup().never();

        let mut run = TestRun::new("prepare-fails", mock);
        let err = LifecycleController::strict().run(&mut run).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Prepare));
        assert!(err.to_string().contains("copying test to temp dir"));
    }

    #[tokio::test]
    async fn test_initialize_failure_still_cleans_up() {
        let mut mock = mock_session();
        mock.expect_prepare().returning(|| Ok(()));
        mock.expect_set_finished().return_const(());
        mock.expect_initialize()
            .returning(|| Err(SessionError::msg("stack already exists")));
        mock.expect_preview_update_and_edits().never();
        mock.expect_destroy().never();
        mock.expect_cleanup().times(1).returning(|| Ok(()));

        let mut run = TestRun::new("init-fails", mock);
        let outcome = LifecycleController::strict().execute(&mut run).await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Initialize));
        assert!(err.to_string().contains("initializing test project"));
        assert!(!outcome.report.finished);
        assert!(outcome.report.was_invoked(Stage::Cleanup));
        assert!(!outcome.report.was_invoked(Stage::Destroy));
    }

    #[tokio::test]
    async fn test_strict_destroy_failure_fails_run() {
        let mut mock = mock_session();
        mock.expect_prepare().returning(|| Ok(()));
        mock.expect_set_finished().return_const(());
        mock.expect_initialize().returning(|| Ok(()));
        mock.expect_preview_update_and_edits().returning(|| Ok(()));
        mock.expect_destroy()
            .times(1)
            .returning(|| Err(SessionError::msg("DependencyViolation")));
        mock.expect_cleanup().times(1).returning(|| Ok(()));

        let mut run = TestRun::new("strict", mock);
        let err = LifecycleController::strict().run(&mut run).await.unwrap_err();

        assert!(matches!(err, LifecycleError::TeardownFailure { .. }));
        assert!(err.to_string().contains("destroy"));
        assert!(err.to_string().contains("DependencyViolation"));
    }

    #[tokio::test]
    async fn test_best_effort_destroy_failure_passes_run() {
        let mut mock = mock_session();
        mock.expect_prepare().returning(|| Ok(()));
        mock.expect_set_finished().return_const(());
        mock.expect_initialize().returning(|| Ok(()));
        mock.expect_preview_update_and_edits().returning(|| Ok(()));
        mock.expect_destroy()
            .times(1)
            .returning(|| Err(SessionError::msg("DependencyViolation")));
        mock.expect_cleanup().times(1).returning(|| Ok(()));

        let mut run = TestRun::new("best-effort", mock);
        let report = LifecycleController::best_effort().run(&mut run).await.unwrap();

        assert!(report.passed());
        let ignored = report.ignored_failures();
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].stage, Stage::Destroy);
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_ignorable() {
        let mut mock = mock_session();
        mock.expect_prepare().returning(|| Ok(()));
        mock.expect_set_finished().return_const(());
        mock.expect_initialize().returning(|| Ok(()));
        mock.expect_preview_update_and_edits().returning(|| Ok(()));
        mock.expect_destroy().returning(|| Ok(()));
        mock.expect_cleanup()
            .returning(|| Err(SessionError::msg("directory busy")));

        let mut run = TestRun::new("cleanup-fails", mock);
        let report = LifecycleController::strict().run(&mut run).await.unwrap();

        assert!(report.stage(Stage::Cleanup).unwrap().status.is_ignored());
    }

    #[test]
    fn test_best_effort_rejects_destroy_on_cleanup() {
        let options = RunOptions {
            destroy_on_cleanup: true,
            teardown: TeardownPolicy::BestEffort,
            ..RunOptions::default()
        };
        let err = LifecycleController::from_options(&options).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::UnsupportedOption { option: "destroy_on_cleanup", .. }
        ));
    }

    #[test]
    fn test_best_effort_rejects_run_update_test() {
        let options = RunOptions {
            run_update_test: true,
            teardown: TeardownPolicy::BestEffort,
            ..RunOptions::default()
        };
        let err = LifecycleController::from_options(&options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "option `run_update_test` is not supported with best-effort teardown"
        );
    }

    #[test]
    fn test_strict_accepts_all_options() {
        let options = RunOptions {
            destroy_on_cleanup: true,
            run_update_test: true,
            ..RunOptions::default()
        };
        let controller = LifecycleController::from_options(&options).unwrap();
        assert_eq!(controller.policy(), TeardownPolicy::Strict);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(&*payload), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
