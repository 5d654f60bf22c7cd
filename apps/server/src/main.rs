mod config;
mod error;
mod handlers;
mod routes;
mod state;
mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;

use config::Config;
use dossier_core_cache::Cache;
use dossier_core_ratelimit::{LocalRateLimiter, RateLimiter};
use dossier_domain_batch::BatchRunner;
use dossier_domain_extraction::{ExtractionProvider, StubExtractionProvider};
use dossier_domain_models::entity::EntityKind;
use dossier_domain_processor::TranscriptProcessor;
use dossier_domain_similarity::MatcherConfig;
use dossier_infra_jobqueue::{InProcessJobStore, JobQueue, JobStore, DEFAULT_PURGE_INTERVAL};
use dossier_infra_store::{HttpStoreClient, StoreClient};
use state::AppState;
use tracing::info;
use uuid::Uuid;

/// Maps each entity kind the pipeline may extract to the id of the remote
/// database it is written to. This deployment writes people and
/// organizations only; task/event/document/transgression/place pages
/// require a routing target this binary does not have a database id for
/// yet, so entities of those kinds are left unrouted and skipped with an
/// internal error recorded rather than guessed at.
fn entity_routing() -> HashMap<EntityKind, String> {
    let mut routing = HashMap::new();
    if let Ok(people_db) = std::env::var("PEOPLE_DATABASE_ID") {
        routing.insert(EntityKind::Person, people_db);
    }
    if let Ok(org_db) = std::env::var("ORGANIZATION_DATABASE_ID") {
        routing.insert(EntityKind::Organization, org_db);
    }
    routing
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    telemetry::init_tracing(&config.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(port = config.port, "starting transcript processing pipeline");

    // Cache -> RateLimiter -> StoreClient -> ExtractionProvider ->
    // SimilarityMatcher -> TranscriptProcessor -> BatchRunner -> JobQueue.
    let cache = Arc::new(Cache::open(&config.cache_dir).await?);
    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(LocalRateLimiter::new(config.rate_limit_rps)?);
    let store: Arc<dyn StoreClient> = Arc::new(HttpStoreClient::new(config.store_base_url.as_str(), &config.store_api_key, rate_limiter.clone(), cache.clone())?);
    // No vendor extraction client ships with this pipeline; the
    // deterministic stub stands in until one is wired behind the same
    // `ExtractionProvider` contract. `EXTRACTION_API_KEY` is validated at
    // startup for parity with that future integration.
    let _ = &config.extraction_api_key;
    let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(Uuid::nil()));
    let matcher_config = MatcherConfig::default();

    let processor = Arc::new(TranscriptProcessor::new(extraction, store, matcher_config, entity_routing()));
    let batch_runner = Arc::new(BatchRunner::new(processor.clone()));
    let job_store: Arc<dyn JobStore> = Arc::new(InProcessJobStore::new());
    let jobs = Arc::new(JobQueue::new(job_store, processor, batch_runner, dossier_infra_jobqueue::DEFAULT_RESULT_TTL, config.default_concurrency));
    jobs.clone().spawn_purge_daemon(DEFAULT_PURGE_INTERVAL);

    let state = AppState { jobs };
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
