//! Bounded linear-backoff retry for external provider operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based): `attempt * base + jitter`.
    fn delay_before(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0..100);
        self.base_delay * attempt + Duration::from_millis(jitter)
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping a linearly
/// growing delay between attempts.
///
/// The first success returns immediately. Errors classified permanent
/// surface without further attempts. Exhausting the budget returns the last
/// error annotated with the attempt count and `description`.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            tracing::debug!(
                "retrying {description} after {delay:?} (attempt {attempt}/{max_attempts})"
            );
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt == max_attempts => {
                return Err(Error::RetriesExhausted {
                    operation: description.to_string(),
                    attempts: max_attempts,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                tracing::debug!("{description} attempt {attempt} failed: {e}");
            }
        }
    }

    unreachable!("retry loop returns on every path")
}
