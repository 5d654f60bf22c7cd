//! Fans a batch of transcripts out across bounded-concurrency
//! [`TranscriptProcessor`] invocations and fans the per-transcript results
//! back into one dense, index-aligned [`BatchResult`].

use std::sync::Arc;

use dossier_domain_models::error::{ErrorKind, ErrorRecord};
use dossier_domain_models::result::BatchResult;
use dossier_domain_models::transcript::Transcript;
pub use dossier_domain_models::CancellationToken;
use dossier_domain_processor::{Options, PipelineError, TranscriptProcessor};
use tokio::sync::Semaphore;
use tracing::instrument;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 16;

/// Bounded-concurrency fan-out over [`TranscriptProcessor::process`]. Holds
/// no per-batch state; safe to share across concurrent `run_batch` calls.
pub struct BatchRunner {
    processor: Arc<TranscriptProcessor>,
}

impl BatchRunner {
    pub fn new(processor: Arc<TranscriptProcessor>) -> Self {
        Self { processor }
    }

    /// Runs every transcript through the processor, at most `concurrency`
    /// at a time (clamped to `[1, MAX_CONCURRENCY]`). The returned
    /// `per_transcript` vector is index-aligned with `transcripts`
    /// regardless of completion order; a transcript that failed or was
    /// skipped because of cancellation leaves its slot `None` and its
    /// error (if any) in `BatchResult::errors`.
    #[instrument(skip(self, transcripts, options, cancel), fields(count = transcripts.len()))]
    pub async fn run_batch(&self, transcripts: &[Transcript], options: Options, concurrency: usize, cancel: CancellationToken) -> BatchResult {
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut result = BatchResult::new(transcripts.len());

        let mut handles = Vec::with_capacity(transcripts.len());
        for (index, transcript) in transcripts.iter().cloned().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            let semaphore = semaphore.clone();
            let processor = self.processor.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                if cancel.is_cancelled() {
                    return (index, None);
                }
                (index, Some(processor.process(&transcript, &options, &cancel).await))
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((index, Some(Ok(processing_result)))) => {
                    result.aggregate.accumulate(&processing_result);
                    result.per_transcript[index] = Some(processing_result);
                }
                Ok((_index, Some(Err(PipelineError::Cancelled)))) => {
                    result.cancelled = true;
                }
                Ok((_index, Some(Err(err)))) => {
                    result.aggregate.errors += 1;
                    result.errors.push(err.into());
                }
                Ok((_index, None)) => {
                    result.cancelled = true;
                }
                Err(join_err) => {
                    result.aggregate.errors += 1;
                    result.errors.push(ErrorRecord::new(ErrorKind::Internal, format!("transcript task did not complete: {join_err}")));
                }
            }
        }

        result
    }
}
