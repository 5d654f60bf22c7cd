use dossier_domain_models::{ErrorKind, ErrorRecord};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("input exceeds the maximum extraction size: {0}")]
    Validation(String),
    #[error("extraction timed out or the provider was unreachable: {0}")]
    Transient(String),
}

impl From<ExtractionError> for ErrorRecord {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Validation(message) => ErrorRecord::new(ErrorKind::Validation, message),
            ExtractionError::Transient(message) => ErrorRecord::new(ErrorKind::Transient, message),
        }
    }
}
