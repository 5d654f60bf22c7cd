use std::env;

use dossier_core_ratelimit::DEFAULT_REQUESTS_PER_SECOND;

/// Process configuration, read once at startup from the environment.
/// Unknown env vars are ignored; missing required ones panic with a
/// message naming the variable, matching the fail-fast posture of the
/// rest of the pipeline's startup path.
pub struct Config {
    pub store_base_url: String,
    pub store_api_key: String,
    /// Reserved for the vendor extraction client; the pipeline ships only
    /// the deterministic stub provider, which never calls out, so this is
    /// read and validated but otherwise unused today.
    pub extraction_api_key: String,
    pub rate_limit_rps: f64,
    pub cache_dir: String,
    pub log_level: String,
    pub port: u16,
    pub default_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            store_base_url: env::var("STORE_BASE_URL").unwrap_or_else(|_| "https://api.store.example.com".to_string()),
            store_api_key: env::var("STORE_API_KEY").expect("STORE_API_KEY must be set"),
            extraction_api_key: env::var("EXTRACTION_API_KEY").expect("EXTRACTION_API_KEY must be set"),
            rate_limit_rps: env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| "./.cache".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            port: env::var("PORT").ok().and_then(|value| value.parse().ok()).unwrap_or(8080),
            default_concurrency: env::var("BATCH_CONCURRENCY")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(dossier_domain_batch::DEFAULT_CONCURRENCY),
        }
    }
}
