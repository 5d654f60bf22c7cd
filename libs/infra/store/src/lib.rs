//! Thread-safe, rate-limited client for the remote document store: retry-
//! wrapped CRUD, paginated query, and schema lookups backed by
//! [`dossier_core_cache::Cache`]. Every outbound URL (files, links) is
//! validated against the SSRF rule set in [`ssrf`] before it is sent.

mod client;
mod error;
pub mod memory;
mod retry;
pub mod ssrf;

pub use client::{HttpStoreClient, StoreClient};
pub use error::StoreError;
pub use memory::InMemoryStoreClient;
pub use ssrf::SsrfGuard;

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_domain_models::page::{DatabaseSchema, Page, PropertyKind, PropertySchemaEntry, PropertyValue};
    use std::collections::HashMap;

    fn person_schema() -> DatabaseSchema {
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertySchemaEntry::new(PropertyKind::Title));
        properties.insert("Email".to_string(), PropertySchemaEntry::new(PropertyKind::Email));
        DatabaseSchema { database_id: "people-db".to_string(), properties }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_through_the_in_memory_client() {
        let store = InMemoryStoreClient::new();
        store.register_schema(person_schema());

        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        let created = store.create_page("people-db", properties).await.unwrap();

        let fetched = store.get_page(&created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn find_by_title_matches_an_existing_page() {
        let store = InMemoryStoreClient::new();
        store.register_schema(person_schema());
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        store.create_page("people-db", properties).await.unwrap();

        let found = store.find_by_title("people-db", "Alice Smith").await.unwrap();
        assert!(found.is_some());

        let missing = store.find_by_title("people-db", "Bob Jones").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn update_page_merges_properties_without_dropping_existing_ones() {
        let store = InMemoryStoreClient::new();
        store.register_schema(person_schema());
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        let created = store.create_page("people-db", properties).await.unwrap();

        let mut update = HashMap::new();
        update.insert("Email".to_string(), PropertyValue::Text("alice@example.com".to_string()));
        let updated = store.update_page(&created.id, update).await.unwrap();

        assert_eq!(updated.properties.len(), 2);
    }

    #[tokio::test]
    async fn seeded_pages_are_queryable_by_database() {
        let store = InMemoryStoreClient::new();
        store.register_schema(person_schema());
        store.seed_page(Page {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            parent_database_id: "people-db".to_string(),
            properties: HashMap::new(),
            last_edited_time: chrono::Utc::now(),
        });

        let (pages, cursor) = store.query_database("people-db", None, None).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(cursor.is_none());
    }
}
