//! Bounded retry for network operations.

use std::time::Duration;

use crate::error::MirrorResult;

/// Backoff parameters for retryable network calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for a (1-based) failed attempt, capped, with a
    /// little jitter so synchronized clients fan out.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter = Duration::from_millis(fastrand::u64(0..=capped.as_millis() as u64 / 4 + 1));
        (capped + jitter).min(self.max_delay)
    }
}

/// Run a network call, retrying only retryable failures (rate-limited,
/// server errors, timeouts) up to the attempt ceiling. An explicit
/// retry-after hint from the server takes precedence over computed backoff.
/// Exhausting retries surfaces the terminal error to the caller.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> MirrorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MirrorResult<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.delay_for_attempt(attempt));
                log::warn!(
                    "{operation} failed (attempt {attempt}/{}), retrying in {:?}: {err}",
                    policy.max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
