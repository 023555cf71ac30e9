//! Tracing setup and span helpers for lifecycle runs.

use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::core::Stage;

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,provtest=debug";

/// Installs a human-readable subscriber that writes through the test harness.
///
/// `RUST_LOG` overrides `default_filter`. Safe to call from every test; only
/// the first call installs a subscriber.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Installs a JSON subscriber, for CI log collection.
pub fn init_json_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init();
}

/// Returns the span a lifecycle run executes in.
#[must_use]
pub fn run_span(run_id: Uuid, name: &str) -> Span {
    tracing::info_span!("lifecycle_run", run_id = %run_id, test = %name)
}

/// Returns the span a single stage executes in.
#[must_use]
pub fn stage_span(run_id: Uuid, stage: Stage) -> Span {
    tracing::info_span!("lifecycle_stage", run_id = %run_id, stage = %stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing(DEFAULT_FILTER);
        init_tracing("warn");
        init_json_tracing("warn");
        tracing::info!("still logging");
    }

    #[test]
    fn test_spans_enter() {
        init_tracing(DEFAULT_FILTER);
        let run_id = Uuid::new_v4();
        let _run = run_span(run_id, "span-test").entered();
        let _stage = stage_span(run_id, Stage::Initialize).entered();
        tracing::debug!("inside stage span");
    }
}
