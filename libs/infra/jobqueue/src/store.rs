//! The persistence seam for [`crate::JobQueue`]. [`InProcessJobStore`] is
//! the single-node backend; a multi-node deployment swaps in a shared
//! backend (e.g. a SQL table) behind the same trait without touching
//! `JobQueue` itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dossier_domain_models::job::{Job, JobId, JobState};
use parking_lot::RwLock;

use crate::error::JobQueueError;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), JobQueueError>;
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;
    async fn replace(&self, job: Job) -> Result<(), JobQueueError>;
    async fn list(&self, owner_token: &str) -> Result<Vec<Job>, JobQueueError>;
    /// Removes every job that has been in a terminal state for longer than
    /// `result_ttl`. Returns the number of jobs purged.
    async fn purge_expired(&self, result_ttl: Duration) -> Result<usize, JobQueueError>;
}

#[derive(Default)]
pub struct InProcessJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InProcessJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InProcessJobStore {
    async fn insert(&self, job: Job) -> Result<(), JobQueueError> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn replace(&self, job: Job) -> Result<(), JobQueueError> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }

    async fn list(&self, owner_token: &str) -> Result<Vec<Job>, JobQueueError> {
        Ok(self.jobs.read().values().filter(|job| job.owner_token == owner_token).cloned().collect())
    }

    async fn purge_expired(&self, result_ttl: Duration) -> Result<usize, JobQueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| match (job.state.is_terminal(), job.finished_at) {
            (true, Some(finished_at)) => {
                let age = now.signed_duration_since(finished_at).to_std().unwrap_or(Duration::ZERO);
                age < result_ttl
            }
            _ => true,
        });
        Ok(before - jobs.len())
    }
}
