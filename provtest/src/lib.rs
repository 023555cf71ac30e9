//! # Provtest
//!
//! Lifecycle control for infrastructure provisioning tests.
//!
//! A provisioning test materializes a program, deploys it as a stack,
//! validates the result and tears everything down again. Provtest provides:
//!
//! - **Staged execution**: Prepare, Initialize, PreviewUpdateValidate,
//!   Destroy and Cleanup run in a fixed order against a [`session::TestSession`]
//! - **Guaranteed teardown**: owed stages run on every exit path, panics included
//! - **Teardown policies**: strict runs fail on a Destroy error, best-effort
//!   runs log it and pass
//! - **Bounded polling**: interval/deadline retry for eventually-consistent
//!   resources, with an optional single corrective action
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provtest::prelude::*;
//!
//! let env = EnvConfig::from_env()?;
//! let options = RunOptions::base(&env)
//!     .merge(RunOptions::new().with_dir("removal-policy"))
//!     .with_teardown(TeardownPolicy::BestEffort);
//!
//! let controller = LifecycleController::from_options(&options)?;
//! let mut run = TestRun::new("removal-policy", MySession::new(options));
//! let report = controller.run(&mut run).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod poll;
pub mod session;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EditDir, EnvConfig, RunOptions, TeardownPolicy};
    pub use crate::core::{Classification, RunReport, Stage, StageRecord, StageStatus};
    pub use crate::errors::{ConfigError, ErrorKind, LifecycleError, PollError, SessionError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::lifecycle::{LifecycleController, RunOutcome, TestRun};
    pub use crate::observability::init_tracing;
    pub use crate::poll::{poll_until, poll_with_correction, PollReport, RetryPolicy};
    pub use crate::session::{
        runtime_validation, OutputCapture, RuntimeValidation, StackOutputs, TestSession,
    };

    #[cfg(feature = "http")]
    pub use crate::poll::assert_http_result_with_retry;
}
