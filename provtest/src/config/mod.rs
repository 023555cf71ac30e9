//! Run configuration: environment inputs and per-test options.

mod env;
mod options;

pub use env::{derive_prefix, validate_prefix, EnvConfig, PREFIX_ENV, REGION_ENV};
pub use options::{EditDir, RunOptions, TeardownPolicy};
