use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;

use crate::{validate_rps, RateLimiter, RateLimiterCounters, RateLimiterConfigError, RateLimiterStats};

/// Single-bucket interval limiter. The mutex doubles as the FIFO queue:
/// tokio's `Mutex` wakes waiters in acquisition order, so the caller that
/// called `wait()` first is granted first.
pub struct LocalRateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
    counters: RateLimiterCounters,
}

impl LocalRateLimiter {
    pub fn new(requests_per_second: f64) -> Result<Self, RateLimiterConfigError> {
        let rps = validate_rps(requests_per_second)?;
        Ok(Self {
            interval: Duration::from_secs_f64(1.0 / rps),
            next_slot: Mutex::new(Instant::now()),
            counters: RateLimiterCounters::default(),
        })
    }

    pub(crate) fn record_fallback_use(&self) {
        self.counters.record_fallback();
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    #[instrument(skip(self))]
    async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let grant_at = if *next_slot > now { *next_slot } else { now };
        tokio::time::sleep_until(grant_at).await;
        *next_slot = grant_at + self.interval;
        self.counters.record_grant();
    }

    fn stats(&self) -> RateLimiterStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    #[test]
    fn rejects_out_of_range_rates() {
        assert!(LocalRateLimiter::new(0.01).is_err());
        assert!(LocalRateLimiter::new(50.0).is_err());
        assert!(LocalRateLimiter::new(3.0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn grants_are_spaced_by_the_interval() {
        let limiter = Arc::new(LocalRateLimiter::new(10.0).unwrap());

        let started = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        let elapsed = started.elapsed();

        // 5 grants at 10 rps: first is immediate, the remaining 4 are spaced
        // 100ms apart, so total elapsed is close to 400ms, never below it.
        assert!(elapsed >= StdDuration::from_millis(400));
        assert_eq!(limiter.stats().granted_total, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_order_is_preserved_under_concurrent_callers() {
        let limiter = Arc::new(LocalRateLimiter::new(5.0).unwrap());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait().await;
                order.lock().await.push(id);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3]);
    }
}
