use dossier_domain_extraction::ExtractionError;
use dossier_domain_models::{ErrorKind, ErrorRecord};
use dossier_infra_store::StoreError;

/// Top-level error taxonomy for [`crate::TranscriptProcessor::process`].
/// Every variant maps onto the shared `ErrorKind` taxonomy; nothing here
/// is retried by the processor itself beyond what `StoreClient` already
/// retries internally.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("internal invariant violated: {0}")]
    Internal(String),
    #[error("processing was cancelled")]
    Cancelled,
}

impl From<PipelineError> for ErrorRecord {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => ErrorRecord::new(ErrorKind::Validation, message),
            PipelineError::Extraction(inner) => inner.into(),
            PipelineError::Store(inner) => inner.into(),
            PipelineError::Internal(message) => ErrorRecord::new(ErrorKind::Internal, message),
            PipelineError::Cancelled => ErrorRecord::new(ErrorKind::Internal, "processing was cancelled"),
        }
    }
}
