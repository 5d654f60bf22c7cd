//! A deterministic, in-memory [`StoreClient`] used by tests and local
//! dry-run development — no network, no retries, but the exact same
//! contract (including schema validation) as [`crate::HttpStoreClient`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dossier_domain_models::page::{DatabaseSchema, Page, PageId, PropertyValue};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::StoreClient;

pub struct InMemoryStoreClient {
    schemas: Mutex<HashMap<String, DatabaseSchema>>,
    pages: Mutex<HashMap<PageId, Page>>,
    page_order: Mutex<Vec<PageId>>,
    calls: AtomicU64,
}

impl Default for InMemoryStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStoreClient {
    pub fn new() -> Self {
        Self {
            schemas: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            page_order: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn register_schema(&self, schema: DatabaseSchema) {
        self.schemas.lock().insert(schema.database_id.clone(), schema);
    }

    /// Seeds an existing page directly, bypassing `create_page`. Used by
    /// tests that need a pre-populated store to dedupe against.
    pub fn seed_page(&self, page: Page) {
        self.page_order.lock().push(page.id.clone());
        self.pages.lock().insert(page.id.clone(), page);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn title_of(page: &Page) -> Option<&str> {
        page.properties.values().find_map(|value| match value {
            PropertyValue::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

#[async_trait]
impl StoreClient for InMemoryStoreClient {
    async fn get_page(&self, page_id: &str) -> Result<Page, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.pages
            .lock()
            .get(page_id)
            .cloned()
            .ok_or_else(|| StoreError::Permanent { status: 404, message: format!("page '{page_id}' not found") })
    }

    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        _cursor: Option<String>,
    ) -> Result<(Vec<Page>, Option<String>), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let title_equals = filter
            .as_ref()
            .and_then(|f| f.get("rich_text"))
            .and_then(|f| f.get("equals"))
            .and_then(Value::as_str);

        let order = self.page_order.lock().clone();
        let pages = self.pages.lock();
        let matched: Vec<Page> = order
            .iter()
            .filter_map(|id| pages.get(id))
            .filter(|page| page.parent_database_id == database_id)
            .filter(|page| match title_equals {
                Some(title) => Self::title_of(page) == Some(title),
                None => true,
            })
            .cloned()
            .collect();
        Ok((matched, None))
    }

    async fn create_page(&self, database_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let id = Uuid::new_v4().to_string();
        let page = Page {
            id: id.clone(),
            parent_database_id: database_id.to_string(),
            properties,
            last_edited_time: Utc::now(),
        };
        self.page_order.lock().push(id.clone());
        self.pages.lock().insert(id, page.clone());
        Ok(page)
    }

    async fn update_page(&self, page_id: &str, properties: HashMap<String, PropertyValue>) -> Result<Page, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_id)
            .ok_or_else(|| StoreError::Permanent { status: 404, message: format!("page '{page_id}' not found") })?;
        for (name, value) in properties {
            page.properties.insert(name, value);
        }
        page.last_edited_time = Utc::now();
        Ok(page.clone())
    }

    async fn find_by_title(&self, database_id: &str, title: &str) -> Result<Option<Page>, StoreError> {
        let filter = serde_json::json!({ "property": "title", "rich_text": { "equals": title } });
        let (pages, _) = self.query_database(database_id, Some(filter), None).await?;
        Ok(pages.into_iter().next())
    }

    async fn schema(&self, database_id: &str) -> Result<DatabaseSchema, StoreError> {
        self.schemas
            .lock()
            .get(database_id)
            .cloned()
            .ok_or_else(|| StoreError::Validation(format!("no schema registered for database '{database_id}'")))
    }
}
