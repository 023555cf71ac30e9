//! Bounded polling for eventually-consistent side effects.
//!
//! This module provides:
//! - `RetryPolicy` describing the poll interval and overall timeout
//! - `poll_until` which races a tick source against a deadline
//! - `poll_with_correction` which allows exactly one corrective nudge
//! - HTTP probes (feature `http`)

mod bounded;
#[cfg(feature = "http")]
mod http;
mod policy;

pub use bounded::{poll_until, poll_with_correction, PollReport};
#[cfg(feature = "http")]
pub use http::{assert_http_result_with_retry, http_probe};
pub use policy::RetryPolicy;
