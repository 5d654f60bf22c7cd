use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dossier_core_cache::Cache;
use dossier_core_ratelimit::RateLimiter;
use dossier_domain_codec::{is_well_formed_page_id, PropertyCodec};
use dossier_domain_models::page::{DatabaseSchema, Page, PropertyValue};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::StoreError;
use crate::retry::{with_backoff, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use crate::ssrf::{SchemeOnlyGuard, SsrfGuard};

/// Schema lookups are cached for 5 minutes, matching the contract in the
/// remote-store protocol section of the spec.
pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const SCHEMA_CACHE_KIND: &str = "schema";
const PAGE_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_LOCK_STRIPES: usize = 64;

/// Retry-wrapped, rate-limited CRUD + paginated query against the remote
/// document store. Safe for concurrent use: the only mutable state is the
/// rate limiter (owned by the caller, shared) and the SSRF DNS cache.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<Page, StoreError>;

    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        cursor: Option<String>,
    ) -> Result<(Vec<Page>, Option<String>), StoreError>;

    async fn create_page(&self, database_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError>;

    async fn update_page(&self, page_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError>;

    async fn find_by_title(&self, database_id: &str, title: &str) -> Result<Option<Page>, StoreError>;

    async fn schema(&self, database_id: &str) -> Result<DatabaseSchema, StoreError>;
}

/// The reqwest-backed implementation. One client per remote store, holding
/// the bearer token in `default_headers` (the teacher's exact pattern for
/// its worker-facing HTTP client).
pub struct HttpStoreClient {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<dyn RateLimiter>,
    schema_cache: Arc<Cache>,
    ssrf: SsrfGuard,
    page_locks: Vec<tokio::sync::Mutex<()>>,
}

impl HttpStoreClient {
    pub fn new(base_url: impl Into<String>, api_key: &str, rate_limiter: Arc<dyn RateLimiter>, schema_cache: Arc<Cache>) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| StoreError::Validation("api key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(PAGE_CALL_TIMEOUT)
            .build()
            .map_err(|err| StoreError::Validation(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            schema_cache,
            ssrf: SsrfGuard::new(),
            page_locks: (0..PAGE_LOCK_STRIPES).map(|_| tokio::sync::Mutex::new(())).collect(),
        })
    }

    fn stripe_for(&self, page_id: &str) -> &tokio::sync::Mutex<()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        page_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.page_locks.len();
        &self.page_locks[index]
    }

    /// Full host-resolution SSRF check (scheme + loopback/link-local/
    /// private-range), run symmetrically before every outbound write and
    /// after every inbound decode — a compromised store could hand back a
    /// `Files`/`Url` property pointing at an internal address just as
    /// easily as a caller could submit one.
    async fn validate_page_urls(&self, properties: &HashMap<String, PropertyValue>) -> Result<(), StoreError> {
        for value in properties.values() {
            match value {
                PropertyValue::Files(files) => {
                    for file in files {
                        self.ssrf.check(&file.url).await?;
                    }
                }
                PropertyValue::Text(text) if text.starts_with("https://") || text.starts_with("http://") => {
                    // best-effort: only `url`-kind properties carry bare URLs, and the
                    // codec already enforces scheme; this re-validates host safety.
                    if text.starts_with("https://") {
                        self.ssrf.check(text).await?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_schema_uncached(&self, database_id: &str) -> Result<DatabaseSchema, StoreError> {
        let url = format!("{}/v1/databases/{database_id}", self.base_url);
        let raw: Value = with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF, || async {
            self.rate_limiter.wait().await;
            let response = self.http.get(&url).send().await?;
            handle_response(response).await
        })
        .await?;
        serde_json::from_value(raw).map_err(|err| StoreError::Validation(format!("malformed schema payload: {err}")))
    }

    async fn decode_page(&self, raw: &Value, schema: &DatabaseSchema) -> Result<Page, StoreError> {
        let codec = PropertyCodec::new(&SchemeOnlyGuard);
        let id = raw.get("id").and_then(Value::as_str).ok_or_else(|| StoreError::Validation("page response missing id".to_string()))?;
        let parent_database_id = raw
            .get("parent_database_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Validation("page response missing parent_database_id".to_string()))?;
        let last_edited_time: DateTime<Utc> = raw
            .get("last_edited_time")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Validation("page response missing last_edited_time".to_string()))?
            .parse()
            .map_err(|err| StoreError::Validation(format!("malformed last_edited_time: {err}")))?;
        let raw_properties = raw
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| StoreError::Validation("page response missing properties".to_string()))?;

        let mut properties = HashMap::new();
        for (name, raw_value) in raw_properties {
            let Some(entry) = schema.property(name) else {
                return Err(StoreError::Validation(format!("property '{name}' is not declared by the database schema")));
            };
            properties.insert(name.clone(), codec.decode(name, entry.kind, raw_value)?);
        }
        self.validate_page_urls(&properties).await?;

        Ok(Page {
            id: id.to_string(),
            parent_database_id: parent_database_id.to_string(),
            properties,
            last_edited_time,
        })
    }

    fn encode_properties(&self, properties: &HashMap<String, PropertyValue>, schema: &DatabaseSchema) -> Result<Value, StoreError> {
        let codec = PropertyCodec::new(&SchemeOnlyGuard);
        let mut encoded = serde_json::Map::new();
        for (name, value) in properties {
            let entry = schema
                .property(name)
                .ok_or_else(|| StoreError::Validation(format!("property '{name}' is not declared by the database schema")))?;
            encoded.insert(name.clone(), codec.encode(name, value, entry)?);
        }
        Ok(Value::Object(encoded))
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    #[instrument(skip(self))]
    async fn get_page(&self, page_id: &str) -> Result<Page, StoreError> {
        if !is_well_formed_page_id(page_id) {
            return Err(StoreError::Validation(format!("'{page_id}' is not a well-formed page id")));
        }
        let url = format!("{}/v1/pages/{page_id}", self.base_url);
        let raw: Value = with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF, || async {
            self.rate_limiter.wait().await;
            let response = self.http.get(&url).send().await?;
            handle_response(response).await
        })
        .await?;

        let database_id = raw
            .get("parent_database_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Validation("page response missing parent_database_id".to_string()))?;
        let schema = self.schema(database_id).await?;
        self.decode_page(&raw, &schema).await
    }

    #[instrument(skip(self, filter))]
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        cursor: Option<String>,
    ) -> Result<(Vec<Page>, Option<String>), StoreError> {
        let schema = self.schema(database_id).await?;
        let url = format!("{}/v1/databases/{database_id}/query", self.base_url);
        let body = json!({ "filter": filter, "start_cursor": cursor });

        let raw: Value = with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF, || async {
            self.rate_limiter.wait().await;
            let response = self.http.post(&url).json(&body).send().await?;
            handle_response(response).await
        })
        .await?;

        let results = raw
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Validation("query response missing results".to_string()))?;
        let mut pages = Vec::with_capacity(results.len());
        for page in results {
            pages.push(self.decode_page(page, &schema).await?);
        }
        let next_cursor = raw.get("next_cursor").and_then(Value::as_str).map(str::to_string);
        Ok((pages, next_cursor))
    }

    #[instrument(skip(self, properties))]
    async fn create_page(&self, database_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError> {
        self.validate_page_urls(&properties).await?;
        let schema = self.schema(database_id).await?;
        let encoded = self.encode_properties(&properties, &schema)?;
        let url = format!("{}/v1/pages", self.base_url);
        let body = json!({ "parent_database_id": database_id, "properties": encoded });

        let raw: Value = with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF, || async {
            self.rate_limiter.wait().await;
            let response = self.http.post(&url).json(&body).send().await?;
            handle_response(response).await
        })
        .await?;
        self.decode_page(&raw, &schema).await
    }

    #[instrument(skip(self, properties))]
    async fn update_page(&self, page_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError> {
        if !is_well_formed_page_id(page_id) {
            return Err(StoreError::Validation(format!("'{page_id}' is not a well-formed page id")));
        }
        self.validate_page_urls(&properties).await?;

        let _guard = self.stripe_for(page_id).lock().await;

        let current = self.get_page(page_id).await?;
        let schema = self.schema(&current.parent_database_id).await?;
        let encoded = self.encode_properties(&properties, &schema)?;
        let url = format!("{}/v1/pages/{page_id}", self.base_url);
        let body = json!({ "properties": encoded });

        let raw: Value = with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF, || async {
            self.rate_limiter.wait().await;
            let response = self.http.patch(&url).json(&body).send().await?;
            handle_response(response).await
        })
        .await?;
        self.decode_page(&raw, &schema).await
    }

    #[instrument(skip(self))]
    async fn find_by_title(&self, database_id: &str, title: &str) -> Result<Option<Page>, StoreError> {
        let filter = json!({ "property": "title", "rich_text": { "equals": title } });
        let (pages, _cursor) = self.query_database(database_id, Some(filter), None).await?;
        Ok(pages.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn schema(&self, database_id: &str) -> Result<DatabaseSchema, StoreError> {
        let (cached, hit) = self.schema_cache.get(SCHEMA_CACHE_KIND, database_id).await;
        if hit {
            if let Some(bytes) = cached {
                if let Ok(schema) = serde_json::from_slice::<DatabaseSchema>(&bytes) {
                    return Ok(schema);
                }
            }
        }

        let schema = self.fetch_schema_uncached(database_id).await?;
        let bytes = serde_json::to_vec(&schema).expect("DatabaseSchema always serializes");
        let _ = self.schema_cache.set(SCHEMA_CACHE_KIND, database_id, &bytes, SCHEMA_CACHE_TTL).await;
        Ok(schema)
    }
}

/// Maps an HTTP response to a parsed JSON body or the appropriate
/// [`StoreError`] variant: connection/timeout/429/5xx are transient,
/// anything else 4xx is permanent and never retried.
async fn handle_response(response: reqwest::Response) -> Result<Value, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<Value>().await.map_err(StoreError::from);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::from_status(status.as_u16(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core_cache::Cache;
    use dossier_core_ratelimit::LocalRateLimiter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_against(server: &MockServer) -> HttpStoreClient {
        let cache = Arc::new(Cache::open(tempfile::tempdir().unwrap().keep()).await.unwrap());
        let limiter: Arc<dyn RateLimiter> = Arc::new(LocalRateLimiter::new(10.0).unwrap());
        HttpStoreClient::new(server.uri(), "test-token", limiter, cache).unwrap()
    }

    fn schema_body() -> Value {
        json!({
            "database_id": "people-db",
            "properties": {
                "Name": { "kind": "title", "choices": [], "allow_new_options": false, "relation_target_database_id": null }
            }
        })
    }

    fn page_body(id: &str) -> Value {
        json!({
            "id": id,
            "parent_database_id": "people-db",
            "properties": { "Name": { "type": "title", "title": [{ "plain_text": "Alice Smith" }] } },
            "last_edited_time": "2024-01-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn get_page_succeeds_on_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/people-db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schema_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/pages/550e8400-e29b-41d4-a716-446655440000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body("550e8400-e29b-41d4-a716-446655440000")))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let page = client.get_page("550e8400-e29b-41d4-a716-446655440000").await.unwrap();
        assert_eq!(page.parent_database_id, "people-db");
    }

    #[tokio::test]
    async fn rejects_malformed_page_ids_without_any_network_call() {
        let server = MockServer::start().await;
        let client = client_against(&server).await;
        let err = client.get_page("not-a-real-id").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn update_page_retries_a_503_then_succeeds() {
        let server = MockServer::start().await;
        let page_id = "550e8400-e29b-41d4-a716-446655440000";

        Mock::given(method("GET"))
            .and(path("/v1/databases/people-db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schema_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/pages/{page_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(page_id)))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(format!("/v1/pages/{page_id}")))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/pages/{page_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(page_id)))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        let result = client.update_page(page_id, properties).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn get_page_rejects_a_response_carrying_a_blocked_file_url() {
        let server = MockServer::start().await;
        let page_id = "550e8400-e29b-41d4-a716-446655440000";
        let schema_with_files = json!({
            "database_id": "people-db",
            "properties": {
                "Name": { "kind": "title", "choices": [], "allow_new_options": false, "relation_target_database_id": null },
                "Attachments": { "kind": "files", "choices": [], "allow_new_options": false, "relation_target_database_id": null }
            }
        });
        let page_with_internal_url = json!({
            "id": page_id,
            "parent_database_id": "people-db",
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": "Alice Smith" }] },
                "Attachments": { "type": "files", "files": [{ "name": "x", "external": { "url": "https://169.254.169.254/secret" } }] },
            },
            "last_edited_time": "2024-01-01T00:00:00Z",
        });

        Mock::given(method("GET"))
            .and(path("/v1/databases/people-db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schema_with_files))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/pages/{page_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_with_internal_url))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let err = client.get_page(page_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "expected inbound SSRF check to reject the page, got {err:?}");
    }

    #[tokio::test]
    async fn permanent_4xx_is_never_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/people-db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schema_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/pages/550e8400-e29b-41d4-a716-446655440000"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let err = client.get_page("550e8400-e29b-41d4-a716-446655440000").await.unwrap_err();
        assert!(matches!(err, StoreError::Permanent { status: 404, .. }));
    }
}
