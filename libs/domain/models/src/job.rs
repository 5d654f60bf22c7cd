use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorRecord;
use crate::result::{BatchResult, ProcessingResult};
use crate::transcript::Transcript;

pub type JobId = Uuid;

/// `Pending -> Running -> {Succeeded, Failed, Cancelled}`, plus the direct
/// `Pending -> Cancelled` shortcut. All three outcome states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

/// What a submitted job actually asks the pipeline to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobRequest {
    Single(Box<Transcript>),
    Batch(Vec<Transcript>),
}

/// The outcome of a terminal job, shaped to match whichever request kind
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobOutcome {
    Single(ProcessingResult),
    Batch(BatchResult),
}

/// Progress counters surfaced while a job is `Running`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub done: usize,
    pub total: usize,
}

/// The externally visible handle to one asynchronous processing request.
/// Callers hold only the id; the queue owns everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_token: String,
    pub state: JobState,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<JobOutcome>,
    pub error: Option<ErrorRecord>,
}

impl Job {
    pub fn new_pending(owner_token: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_token: owner_token.into(),
            state: JobState::Pending,
            progress: JobProgress::default(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}
