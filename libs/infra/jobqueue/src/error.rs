use dossier_domain_models::error::{ErrorKind, ErrorRecord};

/// Error taxonomy for every public [`crate::JobQueue`] operation.
#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    /// No job exists with this id, or it belongs to a different owner
    /// token. Deliberately indistinguishable from the caller's side so a
    /// non-owner cannot enumerate which ids are valid.
    #[error("job not found")]
    NotFound,
    /// `result` was called before the job reached a terminal state.
    #[error("job has not finished yet")]
    NotReady,
    /// The job-store backend failed (e.g. persistence I/O).
    #[error("job store failure: {0}")]
    Store(String),
}

impl From<JobQueueError> for ErrorRecord {
    fn from(err: JobQueueError) -> Self {
        match err {
            JobQueueError::NotFound => ErrorRecord::new(ErrorKind::Validation, err.to_string()),
            JobQueueError::NotReady => ErrorRecord::new(ErrorKind::Validation, err.to_string()),
            JobQueueError::Store(message) => ErrorRecord::new(ErrorKind::Internal, message),
        }
    }
}
