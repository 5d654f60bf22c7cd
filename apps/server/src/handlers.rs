use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use dossier_domain_models::job::{Job, JobId, JobOutcome, JobRequest};
use dossier_domain_models::transcript::Transcript;
use dossier_domain_processor::Options;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Authentication/authorization is a collaborator surface this pipeline
/// only consumes the shape of: the bearer token is taken at face value as
/// the job's owner token, with no identity provider behind it. A missing
/// header is treated as the anonymous caller; a header present but not in
/// `Bearer <token>` form is rejected as unauthorized.
fn owner_token(headers: &HeaderMap) -> Result<String, ApiError> {
    match headers.get(axum::http::header::AUTHORIZATION) {
        None => Ok("anonymous".to_string()),
        Some(value) => {
            let value = value.to_str().map_err(|_| ApiError::BadRequest("authorization header is not valid UTF-8".to_string()))?;
            match value.strip_prefix("Bearer ") {
                Some(token) if !token.is_empty() => Ok(token.to_string()),
                _ => Err(ApiError::BadRequest("authorization header must be 'Bearer <token>'".to_string())),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub transcript: Transcript,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub transcripts: Vec<Transcript>,
    #[serde(default)]
    pub options: Options,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobIdResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[instrument(skip(state, headers, payload))]
pub async fn process_transcript(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<ProcessRequest>) -> Result<impl IntoResponse, ApiError> {
    let owner = owner_token(&headers)?;
    let request = JobRequest::Single(Box::new(payload.transcript));
    let job_id = state.jobs.submit(request, owner, payload.options, None).await?;
    Ok((StatusCode::ACCEPTED, Json(JobIdResponse { job_id })))
}

#[instrument(skip(state, headers, payload))]
pub async fn process_batch(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<BatchRequest>) -> Result<impl IntoResponse, ApiError> {
    if payload.transcripts.is_empty() {
        return Err(ApiError::BadRequest("transcripts must not be empty".to_string()));
    }
    let owner = owner_token(&headers)?;
    let request = JobRequest::Batch(payload.transcripts);
    let job_id = state.jobs.submit(request, owner, payload.options, payload.batch_size).await?;
    Ok((StatusCode::ACCEPTED, Json(JobIdResponse { job_id })))
}

#[instrument(skip(state, headers))]
pub async fn get_job(State(state): State<AppState>, headers: HeaderMap, Path(job_id): Path<JobId>) -> Result<Json<Job>, ApiError> {
    let owner = owner_token(&headers)?;
    let job = state.jobs.status(job_id, &owner).await?;
    Ok(Json(job))
}

#[instrument(skip(state, headers))]
pub async fn get_job_result(State(state): State<AppState>, headers: HeaderMap, Path(job_id): Path<JobId>) -> Result<Json<JobOutcome>, ApiError> {
    let owner = owner_token(&headers)?;
    let outcome = state.jobs.result(job_id, &owner).await?;
    Ok(Json(outcome))
}

#[instrument(skip(state, headers))]
pub async fn cancel_job(State(state): State<AppState>, headers: HeaderMap, Path(job_id): Path<JobId>) -> Result<impl IntoResponse, ApiError> {
    let owner = owner_token(&headers)?;
    let cancelled = state.jobs.cancel(job_id, &owner).await?;
    let status = if cancelled { StatusCode::OK } else { StatusCode::CONFLICT };
    Ok((status, Json(CancelResponse { cancelled })))
}
