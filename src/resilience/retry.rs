//! Retry with exponential backoff (§4.9, §7). Ported from the original's
//! `retry_payment_operation`/`retry_blockchain_operation`/
//! `retry_notification_operation` parameter sets.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
}

impl RetryPolicy {
    /// 3 attempts, 1s -> 4s, base 2 (the *payment* policy).
    pub const PAYMENT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(4),
        base: 2.0,
    };

    /// 5 attempts, 2s -> 32s, base 2 (the *audit-sink* policy).
    pub const AUDIT_SINK: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(32),
        base: 2.0,
    };

    /// 3 attempts, fixed 5s (the *notification* policy).
    pub const NOTIFICATION: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(5),
        base: 1.0,
    };

    /// Delay before attempt `n` (1-indexed retry count), `min(initial *
    /// base^(n-1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.base.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op`, retrying per `policy` while `classify` says the error is
/// retryable. Sleeps between attempts via `tokio::time::sleep`, so tests can
/// use `tokio::time::pause`/`advance` to run this instantly.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    classify: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && classify(&err) => {
                warn!(attempt, %err, "retrying after failure");
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::AUDIT_SINK;
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            &RetryPolicy::PAYMENT,
            |_: &String| true,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_and_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            &RetryPolicy::PAYMENT,
            |_: &String| true,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, String>("always fails".to_string()) }
            },
        )
        .await;
        assert_eq!(result, Err("always fails".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
