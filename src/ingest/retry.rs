//! Bounded retry with exponential backoff for transient adapter failures.

use std::future::Future;
use std::time::Duration;

/// Retry budget applied to one embedding or index call site.
///
/// Attempt `n` (1-based) sleeps `base_delay * 2^(n-1)` before retrying,
/// capped at `max_delay`. Only errors the classifier marks transient are
/// retried; permanent errors escalate on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing up to `max_attempts` total attempts.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Override the first backoff delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Override the backoff ceiling.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Total attempts permitted by this policy.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16) as u32;
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, the error is permanent, or attempts run out.
pub(crate) async fn with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    operation: &str,
    classify: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if classify(&error) && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure; backing off before retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                tracing::error!(operation, attempt, error = %error, "Operation failed");
                return Err(error);
            }
        }
    }
}
