//! Per-test run options and the teardown policy.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use super::env::EnvConfig;
use crate::session::{EditValidation, StackOutputs};

/// How a Destroy failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    /// Destroy failures fail the test.
    #[default]
    Strict,
    /// Destroy failures are logged and ignored.
    BestEffort,
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::BestEffort => write!(f, "best-effort"),
        }
    }
}

/// A program step applied on top of the deployed stack after the main update.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EditDir {
    /// Directory holding the edited program.
    pub dir: PathBuf,
    /// Copy the step over the working copy instead of replacing it.
    #[serde(default)]
    pub additive: bool,
    /// Check run against stack outputs once the step is applied.
    #[serde(skip)]
    pub validation: Option<EditValidation>,
}

impl EditDir {
    /// Creates a replacing edit step.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Makes the step additive.
    #[must_use]
    pub fn additive(mut self) -> Self {
        self.additive = true;
        self
    }

    /// Sets the check run after the step.
    #[must_use]
    pub fn with_validation<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(StackOutputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.validation = Some(Arc::new(
            move |outputs| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(check(outputs)) },
        ));
        self
    }

    /// Runs the step's check, if any.
    pub async fn validate(&self, outputs: StackOutputs) -> anyhow::Result<()> {
        match &self.validation {
            Some(check) => check(outputs).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for EditDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditDir")
            .field("dir", &self.dir)
            .field("additive", &self.additive)
            .field("has_validation", &self.validation.is_some())
            .finish()
    }
}

impl PartialEq for EditDir {
    fn eq(&self, other: &Self) -> bool {
        let same_validation = match (&self.validation, &other.validation) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.dir == other.dir && self.additive == other.additive && same_validation
    }
}

impl Eq for EditDir {}

/// Options describing one provisioning test.
///
/// Most of these are consumed by the session implementation; the controller
/// only reads the teardown-related ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Program directory to test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Stack configuration values.
    pub config: BTreeMap<String, String>,
    /// Packages linked into the program before running.
    pub dependencies: Vec<String>,
    /// Program steps applied after the main update, in order.
    pub edit_dirs: Vec<EditDir>,
    /// Skip the refresh step.
    pub skip_refresh: bool,
    /// Skip the preview step.
    pub skip_preview: bool,
    /// Refresh is expected to report changes.
    pub expect_refresh_changes: bool,
    /// The update is expected to fail.
    pub expect_failure: bool,
    /// Do not run alongside other tests.
    pub no_parallel: bool,
    /// Destroy only when the session is cleaned up.
    pub destroy_on_cleanup: bool,
    /// Run an extra update from a baseline before the main one.
    pub run_update_test: bool,
    /// Retry a failed preview or update once before failing.
    pub retry_failed_steps: bool,
    /// Skip the empty-preview and no-changes checks after the update.
    pub quick: bool,
    /// Teardown policy for this test.
    pub teardown: TeardownPolicy,
}

impl RunOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the options every test starts from.
    #[must_use]
    pub fn base(env: &EnvConfig) -> Self {
        let mut config = BTreeMap::new();
        config.insert("aws:region".to_string(), env.region.clone());
        config.insert("aws-native:region".to_string(), env.region.clone());
        config.insert("prefix".to_string(), env.prefix.clone());
        Self {
            config,
            skip_refresh: true,
            expect_refresh_changes: true,
            retry_failed_steps: true,
            quick: true,
            ..Self::default()
        }
    }

    /// Overlays `other` onto these options.
    ///
    /// Set values in `other` win, config maps are merged with `other`'s keys
    /// taking precedence, and dependency and edit lists are appended as is.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if other.dir.is_some() {
            self.dir = other.dir;
        }
        self.config.extend(other.config);
        self.dependencies.extend(other.dependencies);
        self.edit_dirs.extend(other.edit_dirs);
        self.retry_failed_steps |= other.retry_failed_steps;
        self.quick |= other.quick;
        self.skip_refresh |= other.skip_refresh;
        self.skip_preview |= other.skip_preview;
        self.expect_refresh_changes |= other.expect_refresh_changes;
        self.expect_failure |= other.expect_failure;
        self.no_parallel |= other.no_parallel;
        self.destroy_on_cleanup |= other.destroy_on_cleanup;
        self.run_update_test |= other.run_update_test;
        if other.teardown != TeardownPolicy::default() {
            self.teardown = other.teardown;
        }
        self
    }

    /// Sets the program directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Adds a stack configuration value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Adds package dependencies.
    #[must_use]
    pub fn with_dependencies<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Appends an edit step.
    #[must_use]
    pub fn with_edit_dir(mut self, edit: EditDir) -> Self {
        self.edit_dirs.push(edit);
        self
    }

    /// Sets the teardown policy.
    #[must_use]
    pub fn with_teardown(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Marks the update as expected to fail.
    #[must_use]
    pub fn expecting_failure(mut self) -> Self {
        self.expect_failure = true;
        self
    }

    /// Returns the name prefix from the stack config, if set.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.config.get("prefix").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env() -> EnvConfig {
        EnvConfig::new("us-east-2", "a1b2c3").unwrap()
    }

    #[test]
    fn test_base_options() {
        let options = RunOptions::base(&env());
        assert_eq!(options.config.get("aws:region").map(String::as_str), Some("us-east-2"));
        assert_eq!(
            options.config.get("aws-native:region").map(String::as_str),
            Some("us-east-2")
        );
        assert_eq!(options.prefix(), Some("a1b2c3"));
        assert!(options.skip_refresh);
        assert!(options.expect_refresh_changes);
        assert!(options.retry_failed_steps);
        assert!(options.quick);
        assert!(options.edit_dirs.is_empty());
        assert_eq!(options.teardown, TeardownPolicy::Strict);
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = RunOptions::base(&env()).with_dependencies(["@pulumi/cdk"]);
        let overlay = RunOptions::new()
            .with_dir("integration/removal-policy")
            .with_config("prefix", "aoverride")
            .with_config("bucketName", "removal-test-42")
            .with_dependencies(["@pulumi/cdk", "@pulumi/aws"])
            .with_teardown(TeardownPolicy::BestEffort);

        let merged = base.merge(overlay);
        assert_eq!(merged.dir, Some(PathBuf::from("integration/removal-policy")));
        assert_eq!(merged.prefix(), Some("aoverride"));
        assert_eq!(
            merged.config.get("bucketName").map(String::as_str),
            Some("removal-test-42")
        );
        assert_eq!(
            merged.dependencies,
            vec!["@pulumi/cdk", "@pulumi/cdk", "@pulumi/aws"]
        );
        assert!(merged.skip_refresh);
        assert!(merged.quick);
        assert_eq!(merged.teardown, TeardownPolicy::BestEffort);
    }

    #[test]
    fn test_merge_keeps_base_when_overlay_unset() {
        let base = RunOptions::new()
            .with_dir("examples/cron-lambda")
            .with_teardown(TeardownPolicy::BestEffort);
        let merged = base.clone().merge(RunOptions::new());
        assert_eq!(merged, base);
    }

    #[test]
    fn test_merge_appends_edit_dirs() {
        let base = RunOptions::new().with_edit_dir(EditDir::new("replace-on-changes/step2"));
        let overlay = RunOptions::new().with_edit_dir(EditDir::new("ssm-dynamic/step2").additive());

        let merged = base.merge(overlay);
        let dirs: Vec<_> = merged.edit_dirs.iter().map(|e| e.dir.clone()).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("replace-on-changes/step2"),
                PathBuf::from("ssm-dynamic/step2")
            ]
        );
        assert!(!merged.edit_dirs[0].additive);
        assert!(merged.edit_dirs[1].additive);
    }

    #[tokio::test]
    async fn test_edit_dir_validation() {
        let edit = EditDir::new("ssm-dynamic/step2")
            .additive()
            .with_validation(|outputs| async move {
                let value = outputs.get("stringValue").and_then(serde_json::Value::as_str);
                anyhow::ensure!(value == Some("testvalue"), "unexpected stringValue {value:?}");
                Ok::<(), anyhow::Error>(())
            });

        let mut outputs = StackOutputs::new();
        outputs.insert("stringValue".to_string(), serde_json::json!("testvalue"));
        edit.validate(outputs).await.unwrap();
        assert!(edit.validate(StackOutputs::new()).await.is_err());

        // Clones share the check.
        assert_eq!(edit.clone(), edit);
        assert_ne!(EditDir::new("ssm-dynamic/step2").additive(), edit);
        assert!(EditDir::new("x").validate(StackOutputs::new()).await.is_ok());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RunOptions = serde_json::from_str(
            r#"{"dir": "unsupported-error", "expect_failure": true, "teardown": "best-effort"}"#,
        )
        .unwrap();
        assert!(options.expect_failure);
        assert!(!options.skip_preview);
        assert_eq!(options.teardown, TeardownPolicy::BestEffort);
        assert!(options.config.is_empty());
        assert!(options.edit_dirs.is_empty());

        let options: RunOptions = serde_json::from_str(
            r#"{"edit_dirs": [{"dir": "ssm-dynamic/step2", "additive": true}]}"#,
        )
        .unwrap();
        assert_eq!(options.edit_dirs, vec![EditDir::new("ssm-dynamic/step2").additive()]);
    }

    #[test]
    fn test_teardown_policy_display() {
        assert_eq!(TeardownPolicy::Strict.to_string(), "strict");
        assert_eq!(TeardownPolicy::BestEffort.to_string(), "best-effort");
    }
}
