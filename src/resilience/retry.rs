//! Exponential-backoff retry (§4.C), grounded in
//! `original_source/shared/retry.py`. Logs before sleeping and reraises the
//! final error. A `CircuitOpen` outcome is never retried (§7). Each attempt
//! is additionally bounded by `timeout`, ported from
//! `original_source/shared/timeout.py`'s per-call deadline (a
//! `tokio::time::timeout` rather than the original's `SIGALRM`/thread
//! fallback, which doesn't translate to async Rust).

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub exponential_base: f64,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            exponential_base: 2.0,
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&crate::config::RetryConfig> for RetryPolicy {
    fn from(c: &crate::config::RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            initial_delay: c.initial_delay,
            exponential_base: c.exponential_base,
            max_delay: c.max_delay,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times, each attempt bounded by
/// `policy.timeout`. `is_retryable` decides whether a given error should be
/// retried at all (a `CircuitOpen` should return `false`).
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<tokio::time::error::Elapsed>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(outcome) => outcome,
            Err(elapsed) => Err(E::from(elapsed)),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                warn!(operation = op_name, attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * policy.exponential_base)
                        .min(policy.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestErr(String);

    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl From<tokio::time::error::Elapsed> for TestErr {
        fn from(e: tokio::time::error::Elapsed) -> Self {
            TestErr(e.to_string())
        }
    }

    fn err(msg: &str) -> TestErr {
        TestErr(msg.to_string())
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { initial_delay: Duration::from_millis(1), ..Default::default() };
        let result: Result<u32, TestErr> = retry_with_backoff(
            policy,
            "test_op",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(err("fail"))
                } else {
                    Ok(42)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let result: Result<u32, TestErr> =
            retry_with_backoff(policy, "test_op", || async { Err(err("fail")) }, |_| true).await;
        assert_eq!(result, Err(err("fail")));
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<u32, TestErr> = retry_with_backoff(
            policy,
            "test_op",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(err("circuit_open"))
            },
            |_| false,
        )
        .await;
        assert_eq!(result, Err(err("circuit_open")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_exceeding_timeout_is_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(5),
            ..Default::default()
        };
        let result: Result<u32, TestErr> = retry_with_backoff(
            policy,
            "test_op",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(1)
                } else {
                    Ok(2)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
