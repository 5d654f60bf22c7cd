use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{instrument, warn};

use crate::error::StoreError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(2);
const JITTER_FRACTION: f64 = 0.2;

/// Runs `op` up to `max_attempts` times, backing off exponentially from
/// `base` (±20% jitter) between attempts. Only [`StoreError::Transient`] is
/// retried; validation, permanent, and rate-limited failures return
/// immediately.
#[instrument(skip(op))]
pub async fn with_backoff<T, F, Fut>(max_attempts: u32, base: Duration, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_retryable() => {
                let backoff = jittered_backoff(base, attempt);
                warn!(attempt, ?backoff, %err, "store call failed, retrying after backoff");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn jittered_backoff(base: Duration, attempt: u32) -> Duration {
    let exponential = base.as_secs_f64() * 2f64.powi((attempt - 1) as i32);
    let jitter = rand::thread_rng().gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
    Duration::from_secs_f64((exponential * jitter).max(0.0))
}
