//! HTTP probes for endpoints that become reachable some time after deploy.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::bounded::{poll_until, PollReport};
use super::policy::RetryPolicy;
use crate::errors::PollError;

/// Builds a probe that GETs `url` and applies `check` to the response body.
///
/// Each request is abandoned after `request_timeout`. Transport errors,
/// timeouts and non-success statuses count as a failed attempt.
pub fn http_probe<C>(
    client: reqwest::Client,
    url: impl Into<String>,
    request_timeout: Duration,
    check: C,
) -> impl FnMut() -> BoxFuture<'static, bool>
where
    C: Fn(&str) -> bool + Send + Sync + 'static,
{
    let url = url.into();
    let check = Arc::new(check);
    move || -> BoxFuture<'static, bool> {
        let client = client.clone();
        let url = url.clone();
        let check = Arc::clone(&check);
        Box::pin(async move {
            match fetch_body(&client, &url, request_timeout).await {
                Ok(body) => check(&body),
                Err(e) => {
                    debug!(url = %url, error = %e, "HTTP probe request failed");
                    false
                }
            }
        })
    }
}

async fn fetch_body(
    client: &reqwest::Client,
    url: &str,
    request_timeout: Duration,
) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .timeout(request_timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Per-request budget: one poll interval, capped by the overall timeout.
fn request_timeout(policy: &RetryPolicy) -> Duration {
    if policy.is_degenerate() {
        policy.timeout()
    } else {
        policy.interval()
    }
}

/// Polls `url` until `check` accepts the body or the policy times out.
pub async fn assert_http_result_with_retry<C>(
    url: &str,
    policy: &RetryPolicy,
    check: C,
) -> Result<PollReport, PollError>
where
    C: Fn(&str) -> bool + Send + Sync + 'static,
{
    let probe = http_probe(reqwest::Client::new(), url, request_timeout(policy), check);
    poll_until(policy, probe).await
}
