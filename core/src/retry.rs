use crate::config::RetryConfig;
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for rate-limited calls. The remote signals overload with
/// HTTP 429 and expects the client to simply wait and repeat the same
/// request, so the delay is constant rather than exponential.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self { delay, max_attempts }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.rate_limit_delay_ms),
            config.max_attempts,
        )
    }

    /// No delay, bounded attempts. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Duration::ZERO, Some(max_attempts))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), None)
    }
}

/// Run `operation` until it returns something other than
/// [`Error::RateLimited`]. Rate-limit responses are part of normal operation
/// and are never surfaced to the caller unless the policy's attempt bound
/// runs out; any other error propagates immediately.
pub async fn retry_rate_limited<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        "Operation succeeded after rate-limit retries"
                    );
                }
                return Ok(result);
            }
            Err(Error::RateLimited) => {
                if let Some(max) = policy.max_attempts {
                    if attempts >= max {
                        warn!(
                            operation = operation_name,
                            attempts,
                            "Rate-limit retry budget exhausted"
                        );
                        return Err(Error::RateLimited);
                    }
                }

                metrics::counter!("collector_rate_limit_retries").increment(1);
                debug!(
                    operation = operation_name,
                    attempt = attempts,
                    retry_after_ms = policy.delay.as_millis(),
                    "Rate limited, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
