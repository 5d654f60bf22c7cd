//! The multi-node [`JobStore`] backend: one `jobs` table shared by every
//! process pointed at the same libsql database, so `status`/`cancel`/
//! `result` calls land on whichever node submitted the job. Grounded in
//! the teacher's `libs/infra/db-turso` connection and query style, with
//! the full `Job` kept as a JSON payload column rather than one column
//! per field — a job's shape is owned by `dossier-domain-models`, not by
//! this crate's schema.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dossier_domain_models::job::{Job, JobId, JobState};
use libsql::{params, Builder, Connection, Database};

use crate::error::JobQueueError;
use crate::store::JobStore;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        owner_token TEXT NOT NULL,
        state TEXT NOT NULL,
        finished_at TEXT,
        payload TEXT NOT NULL
    )
";
const CREATE_OWNER_INDEX: &str = "CREATE INDEX IF NOT EXISTS jobs_owner_token_idx ON jobs (owner_token)";

fn to_store_err(err: impl std::fmt::Display) -> JobQueueError {
    JobQueueError::Store(err.to_string())
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Running => "running",
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}

fn row_to_job(payload: String) -> Result<Job, JobQueueError> {
    serde_json::from_str(&payload).map_err(to_store_err)
}

/// A `libsql`-backed [`JobStore`]. `database_url` accepts anything the
/// teacher's `TursoClient` accepts: a local file path, `:memory:`, or a
/// `libsql://`/`https://` remote URL paired with `auth_token`.
pub struct SqliteJobStore {
    connection: Connection,
    // Kept alive: `Connection` borrows from `Database` for its lifetime.
    _database: Database,
}

impl SqliteJobStore {
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, JobQueueError> {
        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let database = if is_remote {
            let token = auth_token.ok_or_else(|| to_store_err("a remote job store url requires an auth token"))?;
            Builder::new_remote(database_url.to_string(), token).build().await.map_err(to_store_err)?
        } else {
            Builder::new_local(database_url).build().await.map_err(to_store_err)?
        };
        let connection = database.connect().map_err(to_store_err)?;
        connection.execute(CREATE_TABLE, ()).await.map_err(to_store_err)?;
        connection.execute(CREATE_OWNER_INDEX, ()).await.map_err(to_store_err)?;
        Ok(Self { connection, _database: database })
    }

    async fn upsert(&self, job: Job) -> Result<(), JobQueueError> {
        let payload = serde_json::to_string(&job).map_err(to_store_err)?;
        let finished_at = job.finished_at.map(|ts| ts.to_rfc3339());
        self.connection
            .execute(
                "INSERT INTO jobs (id, owner_token, state, finished_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET owner_token = excluded.owner_token, state = excluded.state,
                     finished_at = excluded.finished_at, payload = excluded.payload",
                params![job.id.to_string(), job.owner_token.clone(), state_label(job.state), finished_at, payload],
            )
            .await
            .map_err(to_store_err)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: Job) -> Result<(), JobQueueError> {
        self.upsert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let mut rows = self
            .connection
            .query("SELECT payload FROM jobs WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(to_store_err)?;
        match rows.next().await.map_err(to_store_err)? {
            Some(row) => {
                let payload: String = row.get(0).map_err(to_store_err)?;
                Ok(Some(row_to_job(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn replace(&self, job: Job) -> Result<(), JobQueueError> {
        self.upsert(job).await
    }

    async fn list(&self, owner_token: &str) -> Result<Vec<Job>, JobQueueError> {
        let mut rows = self
            .connection
            .query("SELECT payload FROM jobs WHERE owner_token = ?1", params![owner_token.to_string()])
            .await
            .map_err(to_store_err)?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(to_store_err)? {
            let payload: String = row.get(0).map_err(to_store_err)?;
            jobs.push(row_to_job(payload)?);
        }
        Ok(jobs)
    }

    async fn purge_expired(&self, result_ttl: Duration) -> Result<usize, JobQueueError> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::from_std(result_ttl).map_err(to_store_err)?;
        let affected = self
            .connection
            .execute(
                "DELETE FROM jobs WHERE finished_at IS NOT NULL AND finished_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(to_store_err)?;
        Ok(affected as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteJobStore {
        SqliteJobStore::connect(":memory:", None).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = store().await;
        let job = Job::new_pending("owner-1");
        let id = job.id;
        store.insert(job).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.owner_token, "owner-1");
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_token() {
        let store = store().await;
        store.insert(Job::new_pending("owner-1")).await.unwrap();
        store.insert(Job::new_pending("owner-2")).await.unwrap();

        let owner_1_jobs = store.list("owner-1").await.unwrap();
        assert_eq!(owner_1_jobs.len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_terminal_jobs() {
        let store = store().await;

        let mut fresh = Job::new_pending("owner-1");
        fresh.state = JobState::Succeeded;
        fresh.finished_at = Some(Utc::now());
        store.insert(fresh.clone()).await.unwrap();

        let mut stale = Job::new_pending("owner-1");
        stale.state = JobState::Succeeded;
        stale.finished_at = Some(Utc::now() - chrono::Duration::hours(48));
        store.insert(stale.clone()).await.unwrap();

        let pending = Job::new_pending("owner-1");
        store.insert(pending.clone()).await.unwrap();

        let purged = store.purge_expired(Duration::from_secs(24 * 60 * 60)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(fresh.id).await.unwrap().is_some());
        assert!(store.get(stale.id).await.unwrap().is_none());
        assert!(store.get(pending.id).await.unwrap().is_some());
    }
}
