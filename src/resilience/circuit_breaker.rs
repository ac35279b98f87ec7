//! Circuit breaker (§4.C), per external dependency name.
//!
//! Three states: Closed, Open, HalfOpen. Ported from
//! `original_source/shared/circuit_breaker.py`'s state machine, with
//! `parking_lot::Mutex` guarding shared state the way the teacher's
//! `middleware/rate_limit.rs` protects its per-IP map.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_window: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration, failure_window: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            failure_window,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                last_failure: None,
                next_attempt: None,
            }),
        }
    }

    /// Returns `Err(PipelineError::CircuitOpen)` without running `f` if the
    /// breaker is open. Otherwise runs `f` and records the outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut guard = self.inner.lock();
            if guard.state == State::Open {
                let now = Instant::now();
                if guard.next_attempt.map(|t| now < t).unwrap_or(false) {
                    let retry_after = guard
                        .next_attempt
                        .map(|t| (t - now).as_secs_f64())
                        .unwrap_or(0.0);
                    return Err(CallError::CircuitOpen(PipelineError::CircuitOpen {
                        breaker_name: self.name.clone(),
                        retry_after_secs: retry_after,
                    }));
                }
                guard.state = State::HalfOpen;
                tracing::info!(breaker = %self.name, "circuit entering half-open");
            }
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CallError::Inner(err))
            }
        }
    }

    fn on_success(&self) {
        let mut guard = self.inner.lock();
        if guard.state == State::HalfOpen {
            tracing::info!(breaker = %self.name, "circuit recovered, closing");
        }
        guard.state = State::Closed;
        guard.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut guard = self.inner.lock();
        let now = Instant::now();

        if let Some(last) = guard.last_failure {
            if now.duration_since(last) > self.failure_window {
                guard.failure_count = 0;
            }
        }
        guard.failure_count += 1;
        guard.last_failure = Some(now);

        if guard.state == State::HalfOpen {
            guard.state = State::Open;
            guard.next_attempt = Some(now + self.recovery_timeout);
            tracing::warn!(breaker = %self.name, "failed in half-open, reopening circuit");
        } else if guard.failure_count >= self.failure_threshold {
            guard.state = State::Open;
            guard.next_attempt = Some(now + self.recovery_timeout);
            tracing::error!(breaker = %self.name, failures = guard.failure_count, "circuit opened");
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == State::Open
    }
}

#[derive(Debug)]
pub enum CallError<E> {
    CircuitOpen(PipelineError),
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60), Duration::from_secs(60));
        for _ in 0..3 {
            let res: Result<(), CallError<&str>> = cb.call(|| async { Err("boom") }).await;
            assert!(matches!(res, Err(CallError::Inner(_))));
        }
        let res: Result<(), CallError<&str>> = cb.call(|| async { Ok(()) }).await;
        assert!(matches!(res, Err(CallError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn recovers_after_timeout() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(10), Duration::from_secs(60));
        let _: Result<(), CallError<&str>> = cb.call(|| async { Err("boom") }).await;
        assert!(cb.is_open());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let res: Result<(), CallError<&str>> = cb.call(|| async { Ok(()) }).await;
        assert!(matches!(res, Ok(())));
        assert!(!cb.is_open());
    }
}
