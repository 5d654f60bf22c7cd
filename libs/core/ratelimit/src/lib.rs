//! A thread-safe gate over outbound store calls.
//!
//! [`LocalRateLimiter`] is a single-bucket interval limiter: callers queue
//! on a mutex and are granted credits no faster than `1 / requests_per_second`
//! apart, in FIFO order of `wait()` entry. [`DistributedRateLimiter`] layers
//! an identical contract over a shared, process-external counter, falling
//! back to local behavior (and counting the fallback) when that store is
//! unreachable.

mod distributed;
mod local;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

pub use distributed::{DistributedRateLimiter, SharedCounterStore, SharedStoreError};
pub use local::LocalRateLimiter;

#[derive(Debug, thiserror::Error)]
pub enum RateLimiterConfigError {
    #[error("requests_per_second must be within [0.1, 10.0], got {0}")]
    OutOfRange(f64),
}

/// Default rate, matching the remote store's documented comfortable cap.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 3.0;
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.1;
pub const MAX_REQUESTS_PER_SECOND: f64 = 10.0;

pub fn validate_rps(rps: f64) -> Result<f64, RateLimiterConfigError> {
    if (MIN_REQUESTS_PER_SECOND..=MAX_REQUESTS_PER_SECOND).contains(&rps) {
        Ok(rps)
    } else {
        Err(RateLimiterConfigError::OutOfRange(rps))
    }
}

/// Observability counters. Cheap to read: both fields are lock-free.
#[derive(Debug, Default)]
pub struct RateLimiterCounters {
    granted_total: AtomicU64,
    fallback_total: AtomicU64,
}

impl RateLimiterCounters {
    fn record_grant(&self) {
        self.granted_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RateLimiterStats {
        RateLimiterStats {
            granted_total: self.granted_total.load(Ordering::Relaxed),
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub granted_total: u64,
    pub fallback_total: u64,
}

/// Contract every limiter implementation satisfies. `wait()` suspends the
/// caller until a credit is available; it never fails — a limiter that
/// cannot grant a credit locally always has a correct local fallback.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn wait(&self);
    fn stats(&self) -> RateLimiterStats;
}
