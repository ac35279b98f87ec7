//! Sliding-window rate limiter, generalised from the teacher's
//! `middleware/rate_limit.rs` per-IP limiter into a reusable primitive used
//! both by the Dispatcher's chat rate limit (§4.I: 30 messages / 1 second)
//! and the HTTP `/metrics` guard (§6: default 60/min).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct SlidingWindowRateLimiter {
    max_events: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self { max_events, window, timestamps: Mutex::new(VecDeque::new()) }
    }

    fn evict_expired(&self, guard: &mut VecDeque<Instant>) {
        let now = Instant::now();
        while let Some(front) = guard.front() {
            if now.duration_since(*front) >= self.window {
                guard.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns `true` (and records the event) if the call is allowed right
    /// now without waiting, `false` if the caller should back off.
    pub fn try_acquire(&self) -> bool {
        let mut guard = self.timestamps.lock();
        self.evict_expired(&mut guard);
        if guard.len() >= self.max_events {
            return false;
        }
        guard.push_back(Instant::now());
        true
    }

    /// Blocks (async sleep) until a slot is available, then records the
    /// event. Used before every chat send (§4.I).
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = self.timestamps.lock();
                self.evict_expired(&mut guard);
                if guard.len() < self.max_events {
                    guard.push_back(Instant::now());
                    None
                } else {
                    let oldest = *guard.front().unwrap();
                    Some(self.window.saturating_sub(Instant::now().duration_since(oldest)))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.try_acquire());
    }
}
