//! Interval/deadline polling with an optional single corrective retry.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::policy::RetryPolicy;
use crate::errors::PollError;

/// Outcome of a successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Number of probe invocations, including the successful one.
    pub attempts: u32,
    /// Time from the start of polling to success.
    pub elapsed: Duration,
    /// Whether the corrective action had to run.
    pub corrected: bool,
}

/// Invokes `probe` once per interval tick until it returns true.
///
/// The first probe runs one interval after the call. Fails with
/// [`PollError::Timeout`] once the overall timeout elapses; when a tick and
/// the deadline are ready together the deadline wins. Each attempt is itself
/// cut off at the deadline, so a hung probe cannot stretch the budget. A
/// degenerate policy (interval not shorter than the timeout) makes one
/// immediate attempt.
pub async fn poll_until<F, Fut>(policy: &RetryPolicy, mut probe: F) -> Result<PollReport, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let timeout = policy.timeout();
    let start = Instant::now();
    let deadline_at = start + timeout;

    if policy.is_degenerate() {
        warn!(
            interval_ms = policy.interval_ms,
            timeout_ms = policy.timeout_ms,
            "Poll interval does not fit in timeout, making a single attempt"
        );
        return if matches!(timeout_at(deadline_at, probe()).await, Ok(true)) {
            Ok(PollReport {
                attempts: 1,
                elapsed: start.elapsed(),
                corrected: false,
            })
        } else {
            Err(PollError::Timeout {
                timeout,
                attempts: 1,
            })
        };
    }

    let interval = policy.interval();
    let mut ticker = interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = sleep_until(deadline_at);
    tokio::pin!(deadline);

    debug!(
        interval_ms = policy.interval_ms,
        timeout_ms = policy.timeout_ms,
        max_attempts = policy.max_attempts(),
        "Polling"
    );
    let mut attempts: u32 = 0;
    loop {
        tokio::select! {
            biased;
            () = &mut deadline => {
                debug!(attempts, timeout_ms = policy.timeout_ms, "Poll timed out");
                return Err(PollError::Timeout { timeout, attempts });
            }
            _ = ticker.tick() => {
                attempts += 1;
                let Ok(satisfied) = timeout_at(deadline_at, probe()).await else {
                    debug!(attempts, timeout_ms = policy.timeout_ms, "Probe still running at deadline");
                    return Err(PollError::Timeout { timeout, attempts });
                };
                if satisfied {
                    let elapsed = start.elapsed();
                    debug!(
                        attempts,
                        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "Poll condition met"
                    );
                    return Ok(PollReport { attempts, elapsed, corrected: false });
                }
                debug!(attempt = attempts, "Probe not yet satisfied");
            }
        }
    }
}

/// Polls, and on the first timeout runs `correction` once before polling again.
///
/// A second timeout is final: [`PollError::UnmetAfterCorrection`]. A failing
/// correction ends the poll with [`PollError::CorrectionFailed`].
pub async fn poll_with_correction<F, Fut, C, CFut>(
    policy: &RetryPolicy,
    mut probe: F,
    correction: C,
) -> Result<PollReport, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = anyhow::Result<()>>,
{
    let start = Instant::now();

    let first_attempts = match poll_until(policy, &mut probe).await {
        Ok(report) => return Ok(report),
        Err(PollError::Timeout { attempts, .. }) => attempts,
        Err(e) => return Err(e),
    };

    warn!(
        attempts = first_attempts,
        "Condition not met, running corrective action before one more poll"
    );
    correction().await.map_err(PollError::CorrectionFailed)?;

    match poll_until(policy, &mut probe).await {
        Ok(report) => Ok(PollReport {
            attempts: first_attempts + report.attempts,
            elapsed: start.elapsed(),
            corrected: true,
        }),
        Err(PollError::Timeout { timeout, attempts }) => Err(PollError::UnmetAfterCorrection {
            timeout,
            attempts: first_attempts + attempts,
        }),
        Err(e) => Err(e),
    }
}
