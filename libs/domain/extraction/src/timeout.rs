use std::future::Future;
use std::time::Duration;

use crate::error::ExtractionError;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Every [`crate::ExtractionProvider`] implementation is expected to wrap
/// its call to the vendor SDK in this helper (or an equivalent) so a slow
/// or hung provider surfaces as `Transient`, never hangs the caller
/// indefinitely.
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T, ExtractionError>
where
    Fut: Future<Output = Result<T, ExtractionError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::Transient(format!("extraction did not complete within {timeout:?}"))),
    }
}
