use dossier_domain_codec::CodecError;
use dossier_domain_models::{ErrorKind, ErrorRecord};

/// The three failure shapes a [`crate::StoreClient`] call can surface,
/// matching the taxonomy in the core error design: `Validation` is local
/// and never touches the network, `Transient` is retried within the call's
/// own budget, `Permanent` is a remote semantic rejection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure ({status}): {message}")]
    Permanent { status: u16, message: String },
    #[error("rate limited by remote store: {0}")]
    RateLimited(String),
}

impl StoreError {
    /// `RateLimited` is retried the same as `Transient`: a 429 only becomes
    /// a user-visible `RateLimited` error once it has outlived the local
    /// retry budget (SPEC_FULL.md §4.4, §7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::RateLimited(_))
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            429 => StoreError::RateLimited(message.into()),
            500..=599 => StoreError::Transient(message.into()),
            _ => StoreError::Permanent { status, message: message.into() },
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            StoreError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            StoreError::from_status(status.as_u16(), err.to_string())
        } else {
            StoreError::Transient(err.to_string())
        }
    }
}

impl From<StoreError> for ErrorRecord {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => ErrorRecord::new(ErrorKind::Validation, message),
            StoreError::Transient(message) => ErrorRecord::new(ErrorKind::Transient, message),
            StoreError::RateLimited(message) => ErrorRecord::new(ErrorKind::RateLimited, message),
            StoreError::Permanent { status, message } => {
                ErrorRecord::new(ErrorKind::Permanent, message).with_context("status", status.to_string())
            }
        }
    }
}
