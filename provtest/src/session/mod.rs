//! The external provisioning-test session and the values it exchanges.
//!
//! The controller treats a session as opaque: it only sequences the calls
//! below and forwards stack outputs to the runtime validation callback.

mod capture;

pub use capture::OutputCapture;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::SessionError;

/// Named outputs exported by a provisioned stack.
pub type StackOutputs = HashMap<String, serde_json::Value>;

/// Caller-supplied check run after a successful update.
pub type RuntimeValidation =
    Box<dyn FnOnce(StackOutputs) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Wraps an async closure as a [`RuntimeValidation`].
pub fn runtime_validation<F, Fut>(check: F) -> RuntimeValidation
where
    F: FnOnce(StackOutputs) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |outputs| -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(check(outputs))
    })
}

/// Check run against stack outputs after an edit step is applied.
///
/// Shared rather than boxed so the options carrying it stay cloneable.
pub type EditValidation =
    Arc<dyn Fn(StackOutputs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A provisioning-test session driven by the lifecycle controller.
///
/// Implementations wrap whatever actually provisions infrastructure. Each
/// method is called at most once per run, in declaration order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestSession: Send {
    /// Materializes the test's working copy.
    async fn prepare(&mut self) -> Result<(), SessionError>;

    /// Establishes the named stack against the provisioning backend.
    async fn initialize(&mut self) -> Result<(), SessionError>;

    /// Runs preview, update and any configured edit steps.
    async fn preview_update_and_edits(&mut self) -> Result<(), SessionError>;

    /// Tears down provisioned resources.
    async fn destroy(&mut self) -> Result<(), SessionError>;

    /// Releases local resources.
    async fn cleanup(&mut self) -> Result<(), SessionError>;

    /// Records whether the productive stages completed.
    fn set_finished(&mut self, finished: bool);

    /// Returns the outputs of the current stack.
    fn stack_outputs(&self) -> StackOutputs;

    /// Returns the working directory materialized by `prepare`.
    fn work_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Hands the session the sinks its tool output should be written to.
    fn attach_output(&mut self, _stdout: OutputCapture, _stderr: OutputCapture) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runtime_validation_receives_outputs() {
        let check = runtime_validation(|outputs: StackOutputs| async move {
            let url = outputs
                .get("websiteUrl")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("missing websiteUrl"))?;
            anyhow::ensure!(url.starts_with("http"), "bad url {url}");
            Ok(())
        });

        let mut outputs = StackOutputs::new();
        outputs.insert("websiteUrl".into(), serde_json::json!("http://example.test"));
        assert!(check(outputs).await.is_ok());
    }

    #[tokio::test]
    async fn test_runtime_validation_propagates_error() {
        let check = runtime_validation(|_outputs| async { anyhow::bail!("assertion failed") });
        let err = check(StackOutputs::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "assertion failed");
    }
}
