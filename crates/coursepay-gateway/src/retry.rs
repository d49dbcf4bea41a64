//! Backoff for the status endpoint.
//!
//! Only failures to connect are resent: the request never reached the
//! gateway, so asking again cannot double-count anything and a restarting
//! gateway gets a moment to come back. A timeout is final. The gateway may
//! still be working on the first request, and the caller is waiting on the
//! same clock. Every HTTP response, 5xx included, goes back to the caller
//! for classification.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::GatewayConfig;

/// How a status check is resent after a connect failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Resends after the first attempt.
    pub retries: u32,
    /// Delay before the first resend; doubles for each one after.
    pub base_delay: Duration,
    /// Wall-clock ceiling for the whole check. No resend starts if its
    /// delay would end past it.
    pub budget: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_config(config: &GatewayConfig) -> Self {
        Self {
            retries: config.status_retries,
            base_delay: config.retry_base_delay,
            budget: config.timeout,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `send` under this policy.
    pub(crate) async fn send<F, Fut>(&self, send: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            let err = match send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            if err.is_timeout() || !err.is_connect() || attempt >= self.retries {
                return Err(err);
            }
            let delay = self.delay(attempt);
            if started.elapsed() + delay >= self.budget {
                tracing::debug!(attempt, ?delay, "status retry would exceed budget");
                return Err(err);
            }
            attempt += 1;
            tracing::warn!(
                attempt,
                retries = self.retries,
                ?delay,
                error = %err,
                "gateway unreachable, retrying status check"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
