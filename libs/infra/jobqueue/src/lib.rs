//! Owns the lifecycle of asynchronous processing requests: submission,
//! status lookup, cancellation, result retrieval, and listing, backed by
//! a pluggable [`JobStore`]. This is the only component in the pipeline
//! that holds long-lived mutable state beyond a single request.

mod error;
mod store;
#[cfg(feature = "sqlite")]
mod store_sqlite;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dossier_domain_batch::{BatchRunner, CancellationToken};
use dossier_domain_models::job::{Job, JobId, JobOutcome, JobProgress, JobRequest, JobState};
use dossier_domain_processor::{Options, TranscriptProcessor};
use parking_lot::Mutex;
use tracing::instrument;

pub use error::JobQueueError;
pub use store::{InProcessJobStore, JobStore};
#[cfg(feature = "sqlite")]
pub use store_sqlite::SqliteJobStore;

pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Async submission, status, cancellation and result retrieval for single
/// and batch transcript-processing requests.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    processor: Arc<TranscriptProcessor>,
    batch_runner: Arc<BatchRunner>,
    result_ttl: Duration,
    default_concurrency: usize,
    cancellation_tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, processor: Arc<TranscriptProcessor>, batch_runner: Arc<BatchRunner>, result_ttl: Duration, default_concurrency: usize) -> Self {
        Self { store, processor, batch_runner, result_ttl, default_concurrency, cancellation_tokens: Mutex::new(HashMap::new()) }
    }

    /// Creates the job in `Pending` state, then immediately spawns the
    /// background task that carries it through `Running` to a terminal
    /// state. Returns as soon as the job is recorded, not once it finishes.
    /// `concurrency` overrides the queue's default fan-out width for a
    /// `JobRequest::Batch`; ignored for `JobRequest::Single`.
    #[instrument(skip(self, request, options))]
    pub async fn submit(&self, request: JobRequest, owner_token: impl Into<String>, options: Options, concurrency: Option<usize>) -> Result<JobId, JobQueueError> {
        let job = Job::new_pending(owner_token);
        let job_id = job.id;
        self.store.insert(job).await?;

        let cancel = CancellationToken::new();
        self.cancellation_tokens.lock().insert(job_id, cancel.clone());

        let store = self.store.clone();
        let processor = self.processor.clone();
        let batch_runner = self.batch_runner.clone();
        let concurrency = concurrency.unwrap_or(self.default_concurrency);
        tokio::spawn(async move {
            run_job(store, processor, batch_runner, job_id, request, options, concurrency, cancel).await;
        });

        Ok(job_id)
    }

    #[instrument(skip(self))]
    pub async fn status(&self, job_id: JobId, owner_token: &str) -> Result<Job, JobQueueError> {
        match self.store.get(job_id).await? {
            Some(job) if job.owner_token == owner_token => Ok(job),
            _ => Err(JobQueueError::NotFound),
        }
    }

    /// Meaningful once the job is `Succeeded`; a `Failed` or `Cancelled`
    /// job carries its diagnosis in `Job::error` via [`Self::status`]
    /// instead, so this returns `NotReady` for either.
    #[instrument(skip(self))]
    pub async fn result(&self, job_id: JobId, owner_token: &str) -> Result<JobOutcome, JobQueueError> {
        let job = self.status(job_id, owner_token).await?;
        if !job.state.is_terminal() {
            return Err(JobQueueError::NotReady);
        }
        job.result.ok_or(JobQueueError::NotReady)
    }

    /// Returns `false` without side effects if the job is already
    /// terminal. Otherwise flips the shared cancellation token so the
    /// in-flight task stops before starting new work, and — if the job
    /// had not yet left `Pending` — marks it `Cancelled` directly.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: JobId, owner_token: &str) -> Result<bool, JobQueueError> {
        let mut job = self.status(job_id, owner_token).await?;
        if job.state.is_terminal() {
            return Ok(false);
        }
        if let Some(token) = self.cancellation_tokens.lock().get(&job_id) {
            token.cancel();
        }
        if job.state == JobState::Pending {
            job.state = JobState::Cancelled;
            job.finished_at = Some(Utc::now());
            self.store.replace(job).await?;
        }
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn list(&self, owner_token: &str, state_filter: Option<JobState>) -> Result<Vec<Job>, JobQueueError> {
        let mut jobs = self.store.list(owner_token).await?;
        if let Some(state) = state_filter {
            jobs.retain(|job| job.state == state);
        }
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    /// Runs a periodic sweep that purges jobs whose terminal state is
    /// older than `result_ttl`. Spawned once at startup; never returns.
    pub fn spawn_purge_daemon(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = self.store.purge_expired(self.result_ttl).await {
                    tracing::warn!(%err, "job store purge sweep failed");
                }
            }
        });
    }
}

async fn run_job(
    store: Arc<dyn JobStore>,
    processor: Arc<TranscriptProcessor>,
    batch_runner: Arc<BatchRunner>,
    job_id: JobId,
    request: JobRequest,
    options: Options,
    concurrency: usize,
    cancel: CancellationToken,
) {
    let Ok(Some(mut job)) = store.get(job_id).await else { return };
    job.state = JobState::Running;
    job.started_at = Some(Utc::now());
    job.progress = JobProgress {
        done: 0,
        total: match &request {
            JobRequest::Single(_) => 1,
            JobRequest::Batch(transcripts) => transcripts.len(),
        },
    };
    if store.replace(job.clone()).await.is_err() {
        return;
    }

    let (outcome, error) = match request {
        JobRequest::Single(transcript) => match processor.process(&transcript, &options, &cancel).await {
            Ok(result) => (Some(JobOutcome::Single(result)), None),
            Err(err) => (None, Some(err.into())),
        },
        JobRequest::Batch(transcripts) => {
            let result = batch_runner.run_batch(&transcripts, options, concurrency, cancel.clone()).await;
            (Some(JobOutcome::Batch(result)), None)
        }
    };

    job.progress.done = job.progress.total;
    job.finished_at = Some(Utc::now());
    job.state = if cancel.is_cancelled() {
        JobState::Cancelled
    } else if error.is_some() {
        JobState::Failed
    } else {
        JobState::Succeeded
    };
    job.result = outcome;
    job.error = error;
    let _ = store.replace(job).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_domain_extraction::StubExtractionProvider;
    use dossier_domain_models::page::{DatabaseSchema, PropertyKind, PropertySchemaEntry};
    use dossier_domain_models::transcript::Transcript;
    use dossier_domain_similarity::MatcherConfig;
    use dossier_infra_store::InMemoryStoreClient;
    use uuid::Uuid;

    fn queue() -> JobQueue {
        let http_store = Arc::new(InMemoryStoreClient::new());
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertySchemaEntry::new(PropertyKind::Title));
        http_store.register_schema(DatabaseSchema { database_id: "people-db".to_string(), properties });

        let mut routing = HashMap::new();
        routing.insert(dossier_domain_models::entity::EntityKind::Person, "people-db".to_string());
        let extraction = Arc::new(StubExtractionProvider::new(Uuid::new_v4()));
        let processor = Arc::new(TranscriptProcessor::new(extraction, http_store, MatcherConfig::default(), routing));
        let batch_runner = Arc::new(BatchRunner::new(processor.clone()));
        let job_store: Arc<dyn JobStore> = Arc::new(InProcessJobStore::new());
        JobQueue::new(job_store, processor, batch_runner, DEFAULT_RESULT_TTL, 4)
    }

    async fn wait_for_terminal(queue: &JobQueue, job_id: JobId, owner: &str) -> Job {
        for _ in 0..200 {
            let job = queue.status(job_id, owner).await.unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn a_single_transcript_job_runs_to_completion() {
        let queue = queue();
        let request = JobRequest::Single(Box::new(Transcript::new("t", "Alice Smith stopped by.")));
        let job_id = queue.submit(request, "owner-1", Options::default(), None).await.unwrap();

        let job = wait_for_terminal(&queue, job_id, "owner-1").await;
        assert_eq!(job.state, JobState::Succeeded);
        let outcome = queue.result(job_id, "owner-1").await.unwrap();
        assert!(matches!(outcome, JobOutcome::Single(_)));
    }

    #[tokio::test]
    async fn a_different_owner_gets_not_found_instead_of_forbidden() {
        let queue = queue();
        let request = JobRequest::Single(Box::new(Transcript::new("t", "Alice Smith stopped by.")));
        let job_id = queue.submit(request, "owner-1", Options::default(), None).await.unwrap();

        let err = queue.status(job_id, "owner-2").await.unwrap_err();
        assert!(matches!(err, JobQueueError::NotFound));
    }

    #[tokio::test]
    async fn cancelling_a_pending_job_short_circuits_to_cancelled() {
        let queue = queue();
        let request = JobRequest::Batch(vec![Transcript::new("t", "Alice Smith stopped by.")]);
        let job_id = queue.submit(request, "owner-1", Options::default(), None).await.unwrap();

        // Best-effort: cancel immediately, racing the background task.
        let cancelled = queue.cancel(job_id, "owner-1").await.unwrap();
        assert!(cancelled);

        let job = wait_for_terminal(&queue, job_id, "owner-1").await;
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_terminal_job_is_a_no_op() {
        let queue = queue();
        let request = JobRequest::Single(Box::new(Transcript::new("t", "Alice Smith stopped by.")));
        let job_id = queue.submit(request, "owner-1", Options::default(), None).await.unwrap();
        wait_for_terminal(&queue, job_id, "owner-1").await;

        let cancelled = queue.cancel(job_id, "owner-1").await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_owner_token() {
        let queue = queue();
        queue
            .submit(JobRequest::Single(Box::new(Transcript::new("t", "Alice Smith stopped by."))), "owner-1", Options::default(), None)
            .await
            .unwrap();
        queue
            .submit(JobRequest::Single(Box::new(Transcript::new("t", "Bob Jones called."))), "owner-2", Options::default(), None)
            .await
            .unwrap();

        let owner_1_jobs = queue.list("owner-1", None).await.unwrap();
        assert_eq!(owner_1_jobs.len(), 1);
    }
}
