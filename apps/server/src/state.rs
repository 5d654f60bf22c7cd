use std::sync::Arc;

use dossier_infra_jobqueue::JobQueue;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobQueue>,
}
