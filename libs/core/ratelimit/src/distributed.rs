use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::local::LocalRateLimiter;
use crate::{RateLimiter, RateLimiterConfigError, RateLimiterCounters, RateLimiterStats};

#[derive(Debug, thiserror::Error)]
pub enum SharedStoreError {
    #[error("shared counter store unavailable: {0}")]
    Unavailable(String),
}

/// The shared, process-external counter a [`DistributedRateLimiter`] needs.
/// Kept abstract: the spec does not name a vendor for the sliding-window
/// store, so no concrete backend is wired in here — tests supply an
/// in-memory fake.
#[async_trait]
pub trait SharedCounterStore: Send + Sync {
    /// Increments the 1-second window counter for `rate:<scope>` and
    /// returns the count observed after the increment.
    async fn increment_and_get(&self, scope: &str) -> Result<u64, SharedStoreError>;
}

/// Identical semantics to [`LocalRateLimiter`], enforced across processes
/// via a shared sliding-window counter. Falls back to local behavior (and
/// records the fallback) whenever the shared store errors.
pub struct DistributedRateLimiter<S: SharedCounterStore> {
    scope: String,
    requests_per_second: f64,
    store: S,
    fallback: LocalRateLimiter,
    counters: RateLimiterCounters,
}

impl<S: SharedCounterStore> DistributedRateLimiter<S> {
    pub fn new(scope: impl Into<String>, requests_per_second: f64, store: S) -> Result<Self, RateLimiterConfigError> {
        Ok(Self {
            scope: scope.into(),
            requests_per_second,
            store,
            fallback: LocalRateLimiter::new(requests_per_second)?,
            counters: RateLimiterCounters::default(),
        })
    }
}

#[async_trait]
impl<S: SharedCounterStore> RateLimiter for DistributedRateLimiter<S> {
    #[instrument(skip(self))]
    async fn wait(&self) {
        loop {
            match self.store.increment_and_get(&self.scope).await {
                Ok(count) => {
                    if (count as f64) <= self.requests_per_second {
                        self.counters.record_grant();
                        return;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Err(err) => {
                    warn!(scope = %self.scope, %err, "rate.fallback: shared counter store unavailable, using local limiter");
                    self.fallback.record_fallback_use();
                    return self.fallback.wait().await;
                }
            }
        }
    }

    /// Merges this limiter's own distributed-grant counter with the
    /// embedded fallback's: a grant can come from either path, and both
    /// must show up in `granted_total`.
    fn stats(&self) -> RateLimiterStats {
        let own = self.counters.snapshot();
        let fallback = self.fallback.stats();
        RateLimiterStats {
            granted_total: own.granted_total + fallback.granted_total,
            fallback_total: own.fallback_total + fallback.fallback_total,
        }
    }
}
