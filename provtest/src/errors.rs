//! Error types for the provtest lifecycle controller and poll primitive.
//!
//! Errors carry an explicit [`ErrorKind`] so callers can tell a failure the
//! session already reported on its own from one that still needs surfacing.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::TeardownPolicy;
use crate::core::Stage;

/// Classification attached to every session error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// An ordinary failure that must be surfaced as the test result.
    #[default]
    Fatal,
    /// The session already recorded this failure itself.
    ExpectedFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::ExpectedFailure => write!(f, "expected_failure"),
        }
    }
}

/// Error returned by a [`TestSession`](crate::session::TestSession) operation.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct SessionError {
    kind: ErrorKind,
    #[source]
    source: anyhow::Error,
}

impl SessionError {
    /// Creates a fatal session error.
    pub fn fatal(source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            source: source.into(),
        }
    }

    /// Creates an error for a failure the session already reported.
    pub fn expected_failure(source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: ErrorKind::ExpectedFailure,
            source: source.into(),
        }
    }

    /// Creates a fatal error from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::fatal(anyhow::Error::msg(message))
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the underlying error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }

    /// Returns the poll error this failure was caused by, if any.
    #[must_use]
    pub fn poll_error(&self) -> Option<&PollError> {
        self.source.downcast_ref::<PollError>()
    }
}

/// Captured stdout/stderr attached to a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(pub String);

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trimmed = self.0.trim_end();
        if trimmed.is_empty() {
            Ok(())
        } else {
            write!(f, "\ncaptured output:\n{trimmed}")
        }
    }
}

/// The error surfaced by a lifecycle run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Prepare or Initialize failed.
    #[error("stage `{stage}` failed: {context}: {source}")]
    SetupFailure {
        /// The failing stage.
        stage: Stage,
        /// What the stage was doing.
        context: &'static str,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// Update, edits or runtime validation failed.
    #[error("stage `{}` failed: running test preview, update, and edits: {source}{diagnostics}", Stage::PreviewUpdateValidate)]
    ValidationFailure {
        /// The underlying session error.
        #[source]
        source: SessionError,
        /// Output captured from the session.
        diagnostics: Diagnostics,
    },

    /// Destroy failed under strict teardown.
    #[error("stage `{}` failed: destroying stack: {source}", Stage::Destroy)]
    TeardownFailure {
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// The run was already driven through its stages once.
    #[error("test run {run_id} was already executed")]
    AlreadyExecuted {
        /// Id of the run.
        run_id: uuid::Uuid,
    },

    /// The run options ask for something the controller cannot honour.
    #[error("option `{option}` is not supported with {policy} teardown")]
    UnsupportedOption {
        /// The offending option.
        option: &'static str,
        /// The configured teardown policy.
        policy: TeardownPolicy,
    },
}

impl LifecycleError {
    /// Returns the stage this error came from.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::SetupFailure { stage, .. } => Some(*stage),
            Self::ValidationFailure { .. } => Some(Stage::PreviewUpdateValidate),
            Self::TeardownFailure { .. } => Some(Stage::Destroy),
            Self::AlreadyExecuted { .. } | Self::UnsupportedOption { .. } => None,
        }
    }

    /// Returns the session error, if the failure came from a stage.
    #[must_use]
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            Self::SetupFailure { source, .. }
            | Self::ValidationFailure { source, .. }
            | Self::TeardownFailure { source } => Some(source),
            Self::AlreadyExecuted { .. } | Self::UnsupportedOption { .. } => None,
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.session_error()
            .map_or(ErrorKind::Fatal, SessionError::kind)
    }

    /// Returns true if the session already reported this failure.
    #[must_use]
    pub fn is_expected_failure(&self) -> bool {
        self.kind() == ErrorKind::ExpectedFailure
    }

    /// Returns true if the failure was a poll that ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.session_error()
            .and_then(SessionError::poll_error)
            .is_some_and(PollError::is_timeout)
    }
}

/// Error returned by the bounded poll primitive.
#[derive(Debug, Error)]
pub enum PollError {
    /// The probe never returned true before the deadline.
    #[error("condition not met within {timeout:?} after {attempts} attempts")]
    Timeout {
        /// The configured overall timeout.
        timeout: Duration,
        /// Number of probe invocations.
        attempts: u32,
    },

    /// The probe still failed after the one corrective action.
    #[error("condition not met within {timeout:?} after corrective retry ({attempts} attempts)")]
    UnmetAfterCorrection {
        /// The configured overall timeout per cycle.
        timeout: Duration,
        /// Number of probe invocations across both cycles.
        attempts: u32,
    },

    /// The corrective action itself failed.
    #[error("corrective action failed: {0}")]
    CorrectionFailed(#[source] anyhow::Error),
}

impl PollError {
    /// Returns true if the poll exhausted its time budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::UnmetAfterCorrection { .. })
    }

    /// Returns the number of probe attempts made, if known.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Timeout { attempts, .. } | Self::UnmetAfterCorrection { attempts, .. } => {
                Some(*attempts)
            }
            Self::CorrectionFailed(_) => None,
        }
    }
}

/// Error raised while loading run configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `AWS_REGION` was not set.
    #[error("missing AWS_REGION environment variable")]
    MissingRegion,

    /// A name prefix was not usable for resource names.
    #[error("invalid name prefix `{0}`: must start with a letter and be alphanumeric")]
    InvalidPrefix(String),
}

impl ConfigError {
    /// Returns true if the test should be skipped rather than failed.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::MissingRegion)
    }
}
