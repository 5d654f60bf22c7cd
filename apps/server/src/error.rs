use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dossier_domain_models::error::{ErrorKind, ErrorRecord};
use dossier_domain_processor::PipelineError;
use dossier_infra_jobqueue::JobQueueError;

/// Maps every failure the HTTP layer can produce onto the wire-stable
/// `ErrorRecord` shape and the status codes enumerated in the core
/// contract. `JobQueueError` gets special-cased ahead of the generic
/// `ErrorKind` table: `NotFound` and `NotReady` both surface as 404,
/// matching the literal "404 until terminal" result-endpoint contract
/// rather than the 400 a bare `Validation` kind would imply.
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
    JobQueue(JobQueueError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<JobQueueError> for ApiError {
    fn from(err: JobQueueError) -> Self {
        ApiError::JobQueue(err)
    }
}

fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Permanent => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, record) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorRecord::new(ErrorKind::Validation, message)),
            ApiError::JobQueue(JobQueueError::NotFound) => (StatusCode::NOT_FOUND, JobQueueError::NotFound.into()),
            ApiError::JobQueue(JobQueueError::NotReady) => (StatusCode::NOT_FOUND, JobQueueError::NotReady.into()),
            ApiError::JobQueue(err @ JobQueueError::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, err.into()),
            ApiError::Pipeline(err) => {
                let record: ErrorRecord = err.into();
                let status = status_for_kind(record.kind);
                (status, record)
            }
        };
        (status, Json(record)).into_response()
    }
}
