//! Orchestrates one transcript through the full pipeline: extraction,
//! deduplication against the store, property merge, and relationship
//! linking. [`TranscriptProcessor`] is the single entry point; everything
//! else in this crate supports its `process` method.

mod error;
mod merge;
mod options;

use std::collections::HashMap;
use std::sync::Arc;

use dossier_domain_extraction::{ExtractionHints, ExtractionProvider, ExtractionResult};
use dossier_domain_models::entity::{Entity, EntityKind};
use dossier_domain_models::error::{ErrorKind, ErrorRecord};
use dossier_domain_models::page::{DatabaseSchema, PageRef, PropertyKind, PropertyValue};
use dossier_domain_models::result::{ProcessingResult, SkipReason, SkipRecord};
use dossier_domain_models::transcript::{Transcript, TranscriptId};
use dossier_domain_models::CancellationToken;
use dossier_domain_similarity::{Candidate, MatchDecision, MatcherConfig, SimilarityMatcher};
use dossier_infra_store::StoreClient;
use tracing::instrument;

pub use error::PipelineError;
pub use options::{Options, DEFAULT_OVERWRITE_CONFIDENCE};

/// Bounds how many pages of an existing database `process` will scan
/// looking for dedup candidates before giving up on finding more.
const MAX_CANDIDATE_PAGES: usize = 20;

enum Outcome {
    Created(PageRef),
    Updated(PageRef, Vec<String>),
    Skipped(SkipReason, Vec<String>),
}

/// Where the result of an extracted entity came from, keyed by kind and a
/// normalized name so relationship resolution can find a page this call
/// just wrote without a second round trip to the store.
type EntityKey = (EntityKind, String);

fn entity_key(kind: EntityKind, name: &str) -> EntityKey {
    (kind, name.trim().to_ascii_lowercase())
}

/// Checked before every `StoreClient` call a transcript makes, not just
/// once at the batch boundary: a long transcript with many entities and
/// relationships can otherwise run for a while after cancellation.
fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Resolves the per-kind target database, scores candidates, merges
/// properties, and links relationships for one transcript at a time.
/// Holds no per-call state; safe to share across concurrent calls.
pub struct TranscriptProcessor {
    extraction: Arc<dyn ExtractionProvider>,
    store: Arc<dyn StoreClient>,
    matcher_config: MatcherConfig,
    routing: HashMap<EntityKind, String>,
}

impl TranscriptProcessor {
    /// `routing` maps each entity kind the extraction stage may produce to
    /// the id of the database its pages live in. A kind with no entry is
    /// never written to, regardless of `allowed_kinds`.
    pub fn new(
        extraction: Arc<dyn ExtractionProvider>,
        store: Arc<dyn StoreClient>,
        matcher_config: MatcherConfig,
        routing: HashMap<EntityKind, String>,
    ) -> Self {
        Self { extraction, store, matcher_config, routing }
    }

    #[instrument(skip(self, transcript, options, cancel), fields(transcript_id = %transcript.id))]
    pub async fn process(&self, transcript: &Transcript, options: &Options, cancel: &CancellationToken) -> Result<ProcessingResult, PipelineError> {
        let started = std::time::Instant::now();
        if transcript.body.trim().is_empty() {
            return Err(PipelineError::Validation("transcript body must not be empty".to_string()));
        }

        let hints = ExtractionHints {
            allowed_kinds: options.allowed_kinds.clone(),
            source: options.source_override.clone().or_else(|| transcript.source.clone()),
        };
        let mut extraction = self.extraction.extract(&transcript.body, &hints).await?;
        // The processor, not the provider, is authoritative on which
        // transcript this batch of entities came from; a provider shared
        // across many calls (e.g. one long-lived stub instance) has no
        // reliable way to stamp this itself.
        for entity in &mut extraction.entities {
            entity.source_transcript_id = transcript.id;
        }

        let mut result = ProcessingResult::empty(options.dry_run);
        result.warnings.extend(extraction.warnings.clone());

        let mut schema_cache: HashMap<String, DatabaseSchema> = HashMap::new();
        let mut processed: HashMap<EntityKey, PageRef> = HashMap::new();

        for entity in &extraction.entities {
            if let Some(allowed) = &options.allowed_kinds {
                if !allowed.contains(&entity.kind) {
                    result.skipped.push(SkipRecord { entity: entity.clone(), reason: SkipReason::KindNotAllowed, candidate_ids: Vec::new() });
                    continue;
                }
            }

            let Some(database_id) = self.routing.get(&entity.kind).cloned() else {
                result.errors.push(ErrorRecord::new(ErrorKind::Internal, format!("no target database routed for entity kind {:?}", entity.kind)));
                continue;
            };

            if let Err(err) = check_cancelled(cancel) {
                return Err(err);
            }

            let schema = match self.schema_for(&database_id, &mut schema_cache, cancel).await {
                Ok(schema) => schema,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) => {
                    result.errors.push(err.into());
                    continue;
                }
            };
            let Some(title_property) = title_property_name(&schema) else {
                result.errors.push(ErrorRecord::new(ErrorKind::Internal, format!("database '{database_id}' declares no title property")));
                continue;
            };

            match self.process_entity(entity, &database_id, &schema, &title_property, options, transcript.id, cancel).await {
                Ok(Outcome::Created(page_ref)) => {
                    processed.insert(entity_key(entity.kind, &entity.name), page_ref.clone());
                    result.created.push(page_ref);
                }
                Ok(Outcome::Updated(page_ref, warnings)) => {
                    processed.insert(entity_key(entity.kind, &entity.name), page_ref.clone());
                    result.updated.push(page_ref);
                    result.warnings.extend(warnings);
                }
                Ok(Outcome::Skipped(reason, candidate_ids)) => {
                    result.skipped.push(SkipRecord { entity: entity.clone(), reason, candidate_ids });
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) => result.errors.push(err.into()),
            }
        }

        if options.create_relationships {
            if let Err(err) = self.create_relationships(&extraction, &processed, &mut schema_cache, options, transcript.id, &mut result, cancel).await {
                return Err(err);
            }
        }

        result.duration = started.elapsed();
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_entity(
        &self,
        entity: &Entity,
        database_id: &str,
        schema: &DatabaseSchema,
        title_property: &str,
        options: &Options,
        transcript_id: TranscriptId,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let mut incoming = entity.properties.clone();
        incoming.insert(title_property.to_string(), PropertyValue::Text(entity.name.clone()));

        if !options.enable_deduplication {
            let page_ref = self.write_create(database_id, incoming, options, entity, cancel).await?;
            return Ok(Outcome::Created(page_ref));
        }

        let candidates = self.candidates_for(entity, database_id, title_property, cancel).await?;
        let matcher_config = MatcherConfig {
            high_threshold: options.deduplication_threshold.unwrap_or(self.matcher_config.high_threshold),
            low_threshold: self.matcher_config.low_threshold,
        };
        let matcher = SimilarityMatcher::new(matcher_config);

        match matcher.decide(entity, &candidates) {
            MatchDecision::NoMatch => {
                let page_ref = self.write_create(database_id, incoming, options, entity, cancel).await?;
                Ok(Outcome::Created(page_ref))
            }
            MatchDecision::Ambiguous(ids) => Ok(Outcome::Skipped(SkipReason::AmbiguousMatch, ids)),
            MatchDecision::Match(page) => {
                let outcome = merge::merge_properties(schema, &page.properties, &incoming, entity.clamped_confidence(), transcript_id, options.overwrite_confidence);
                if !outcome.changed {
                    return Ok(Outcome::Skipped(SkipReason::NoChange, vec![page.id.clone()]));
                }
                let page_ref = PageRef {
                    id: page.id.clone(),
                    database_id: database_id.to_string(),
                    title: extract_title(&outcome.properties, title_property),
                };
                if !options.dry_run {
                    check_cancelled(cancel)?;
                    self.store.update_page(&page.id, outcome.properties).await?;
                }
                Ok(Outcome::Updated(page_ref, outcome.warnings))
            }
        }
    }

    async fn write_create(&self, database_id: &str, properties: HashMap<String, PropertyValue>, options: &Options, entity: &Entity, cancel: &CancellationToken) -> Result<PageRef, PipelineError> {
        if options.dry_run {
            return Ok(PageRef { id: String::new(), database_id: database_id.to_string(), title: entity.name.clone() });
        }
        check_cancelled(cancel)?;
        let page = self.store.create_page(database_id, properties).await?;
        Ok(PageRef { id: page.id, database_id: database_id.to_string(), title: entity.name.clone() })
    }

    async fn candidates_for(&self, entity: &Entity, database_id: &str, title_property: &str, cancel: &CancellationToken) -> Result<Vec<Candidate>, PipelineError> {
        let matcher = SimilarityMatcher::new(self.matcher_config);
        let mut candidates = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_CANDIDATE_PAGES {
            check_cancelled(cancel)?;
            let (pages, next) = self.store.query_database(database_id, None, cursor).await?;
            for page in pages {
                let title = extract_title(&page.properties, title_property);
                if matcher.is_candidate(entity, &title, &page.properties) {
                    candidates.push(Candidate { page, title });
                }
            }
            match next {
                Some(next_cursor) => cursor = Some(next_cursor),
                None => break,
            }
        }
        Ok(candidates)
    }

    async fn schema_for(&self, database_id: &str, cache: &mut HashMap<String, DatabaseSchema>, cancel: &CancellationToken) -> Result<DatabaseSchema, PipelineError> {
        if let Some(schema) = cache.get(database_id) {
            return Ok(schema.clone());
        }
        check_cancelled(cancel)?;
        let schema = self.store.schema(database_id).await?;
        cache.insert(database_id.to_string(), schema.clone());
        Ok(schema)
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_relationships(
        &self,
        extraction: &ExtractionResult,
        processed: &HashMap<EntityKey, PageRef>,
        schema_cache: &mut HashMap<String, DatabaseSchema>,
        options: &Options,
        transcript_id: TranscriptId,
        result: &mut ProcessingResult,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        for entity in &extraction.entities {
            for rel in &entity.relationships {
                self.resolve_and_link(entity.kind, &entity.name, rel.target_kind, &rel.target_name, &rel.relation_label, processed, schema_cache, options, transcript_id, result, cancel)
                    .await?;
            }
        }
        for rel in &extraction.relationships {
            self.resolve_and_link(rel.source_kind, &rel.source_name, rel.target_kind, &rel.target_name, &rel.relation_label, processed, schema_cache, options, transcript_id, result, cancel)
                .await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_and_link(
        &self,
        source_kind: EntityKind,
        source_name: &str,
        target_kind: EntityKind,
        target_name: &str,
        relation_label: &str,
        processed: &HashMap<EntityKey, PageRef>,
        schema_cache: &mut HashMap<String, DatabaseSchema>,
        options: &Options,
        transcript_id: TranscriptId,
        result: &mut ProcessingResult,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        // Only entities this call actually wrote can carry a new relation;
        // one that was skipped (ambiguous, kind not allowed, ...) has no
        // page to attach it to.
        let Some(source_ref) = processed.get(&entity_key(source_kind, source_name)).cloned() else {
            return Ok(());
        };

        let target_ref = match processed.get(&entity_key(target_kind, target_name)) {
            Some(page_ref) => Some(page_ref.clone()),
            None => match self.routing.get(&target_kind) {
                Some(target_database_id) => {
                    check_cancelled(cancel)?;
                    match self.store.find_by_title(target_database_id, target_name).await {
                        Ok(Some(page)) => Some(PageRef { id: page.id, database_id: target_database_id.clone(), title: target_name.to_string() }),
                        Ok(None) => None,
                        Err(err) => {
                            result.errors.push(err.into());
                            return Ok(());
                        }
                    }
                }
                None => None,
            },
        };

        let Some(target_ref) = target_ref else {
            result.skipped.push(SkipRecord {
                entity: unresolved_target_placeholder(target_kind, target_name, transcript_id),
                reason: SkipReason::UnresolvedTarget,
                candidate_ids: Vec::new(),
            });
            return Ok(());
        };

        if options.dry_run {
            result.relationships_created += 1;
            return Ok(());
        }

        let schema = match self.schema_for(&source_ref.database_id, schema_cache, cancel).await {
            Ok(schema) => schema,
            Err(err @ PipelineError::Cancelled) => return Err(err),
            Err(err) => {
                result.errors.push(err.into());
                return Ok(());
            }
        };
        let Some(entry) = schema.property(relation_label) else {
            result.warnings.push(format!("relation property '{relation_label}' is not declared on database '{}'; skipped", source_ref.database_id));
            return Ok(());
        };
        if entry.kind != PropertyKind::Relation {
            result.warnings.push(format!("property '{relation_label}' on database '{}' is not a relation property; skipped", source_ref.database_id));
            return Ok(());
        }

        check_cancelled(cancel)?;
        let page = match self.store.get_page(&source_ref.id).await {
            Ok(page) => page,
            Err(err) => {
                result.errors.push(err.into());
                return Ok(());
            }
        };
        let mut linked_ids = match page.properties.get(relation_label) {
            Some(PropertyValue::Relation(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        if linked_ids.contains(&target_ref.id) {
            return Ok(());
        }
        linked_ids.push(target_ref.id.clone());

        check_cancelled(cancel)?;
        let mut properties = HashMap::new();
        properties.insert(relation_label.to_string(), PropertyValue::Relation(linked_ids));
        match self.store.update_page(&source_ref.id, properties).await {
            Ok(_) => result.relationships_created += 1,
            Err(err) => result.errors.push(err.into()),
        }
        Ok(())
    }
}

fn title_property_name(schema: &DatabaseSchema) -> Option<String> {
    schema.properties.iter().find(|(_, entry)| entry.kind == PropertyKind::Title).map(|(name, _)| name.clone())
}

fn extract_title(properties: &HashMap<String, PropertyValue>, title_property: &str) -> String {
    match properties.get(title_property) {
        Some(PropertyValue::Text(text)) => text.clone(),
        _ => String::new(),
    }
}

fn unresolved_target_placeholder(kind: EntityKind, name: &str, transcript_id: TranscriptId) -> Entity {
    Entity {
        kind,
        name: name.to_string(),
        properties: HashMap::new(),
        relationships: Vec::new(),
        source_transcript_id: transcript_id,
        confidence: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_domain_extraction::StubExtractionProvider;
    use dossier_domain_models::page::{PropertySchemaEntry, PropertyKind as Kind};
    use dossier_domain_models::transcript::SourceTag;
    use dossier_infra_store::InMemoryStoreClient;
    use std::collections::HashMap as Map;

    const PEOPLE_DB: &str = "people-db";
    const ORG_DB: &str = "org-db";

    fn people_schema() -> DatabaseSchema {
        let mut properties = Map::new();
        properties.insert("Name".to_string(), PropertySchemaEntry::new(Kind::Title));
        properties.insert("email".to_string(), PropertySchemaEntry::new(Kind::Email));
        properties.insert("employed_by".to_string(), PropertySchemaEntry::new(Kind::Relation));
        DatabaseSchema { database_id: PEOPLE_DB.to_string(), properties }
    }

    fn routing() -> Map<EntityKind, String> {
        let mut routing = Map::new();
        routing.insert(EntityKind::Person, PEOPLE_DB.to_string());
        routing.insert(EntityKind::Organization, ORG_DB.to_string());
        routing
    }

    fn processor(store: Arc<InMemoryStoreClient>, extraction: Arc<dyn ExtractionProvider>) -> TranscriptProcessor {
        TranscriptProcessor::new(extraction, store, MatcherConfig::default(), routing())
    }

    fn transcript(body: &str) -> Transcript {
        let mut transcript = Transcript::new("title", body);
        transcript.source = Some(SourceTag::VoiceMemo);
        transcript
    }

    #[tokio::test]
    async fn happy_path_creates_a_new_page_for_each_extracted_entity() {
        let store = Arc::new(InMemoryStoreClient::new());
        store.register_schema(people_schema());
        let transcript = transcript("Met with Alice Smith today.");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store.clone(), extraction);

        let result = processor.process(&transcript, &Options::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.created[0].title, "Alice Smith");
    }

    #[tokio::test]
    async fn empty_body_is_rejected_before_extraction_runs() {
        let store = Arc::new(InMemoryStoreClient::new());
        let transcript = transcript("   ");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store, extraction);

        let err = processor.process(&transcript, &Options::default(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn exact_duplicate_is_skipped_with_no_change() {
        let store = Arc::new(InMemoryStoreClient::new());
        store.register_schema(people_schema());
        let mut existing_properties = Map::new();
        existing_properties.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        store.seed_page(dossier_domain_models::page::Page {
            id: "existing-1".to_string(),
            parent_database_id: PEOPLE_DB.to_string(),
            properties: existing_properties,
            last_edited_time: chrono::Utc::now(),
        });

        let transcript = transcript("Met with Alice Smith today.");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store, extraction);

        let result = processor.process(&transcript, &Options::default(), &CancellationToken::new()).await.unwrap();
        assert!(result.created.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert!(matches!(result.skipped[0].reason, SkipReason::NoChange));
    }

    #[tokio::test]
    async fn dry_run_produces_a_decision_trace_without_writing_a_real_page() {
        let store = Arc::new(InMemoryStoreClient::new());
        store.register_schema(people_schema());
        let transcript = transcript("Met with Alice Smith today.");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store.clone(), extraction);

        let options = Options { dry_run: true, ..Options::default() };
        let result = processor.process(&transcript, &options, &CancellationToken::new()).await.unwrap();
        assert!(result.dry_run);
        assert_eq!(result.created.len(), 1);
        assert!(result.created[0].id.is_empty(), "dry run must not mint a real page id");

        let (pages, _) = store.query_database(PEOPLE_DB, None, None).await.unwrap();
        assert!(pages.is_empty(), "dry run must not persist anything to the store");
    }

    #[tokio::test]
    async fn employment_relationship_links_the_two_freshly_created_pages() {
        let store = Arc::new(InMemoryStoreClient::new());
        store.register_schema(people_schema());
        store.register_schema(DatabaseSchema {
            database_id: ORG_DB.to_string(),
            properties: {
                let mut properties = Map::new();
                properties.insert("Name".to_string(), PropertySchemaEntry::new(Kind::Title));
                properties
            },
        });

        let transcript = transcript("Alice Smith works at ACME Corp.");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store, extraction);

        let result = processor.process(&transcript, &Options::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.created.len(), 2);
        assert_eq!(result.relationships_created, 1);
    }

    #[tokio::test]
    async fn a_token_cancelled_mid_transcript_stops_before_the_next_store_call() {
        let store = Arc::new(InMemoryStoreClient::new());
        store.register_schema(people_schema());
        store.register_schema(DatabaseSchema {
            database_id: ORG_DB.to_string(),
            properties: {
                let mut properties = Map::new();
                properties.insert("Name".to_string(), PropertySchemaEntry::new(Kind::Title));
                properties
            },
        });

        let transcript = transcript("Alice Smith works at ACME Corp.");
        let extraction: Arc<dyn ExtractionProvider> = Arc::new(StubExtractionProvider::new(transcript.id));
        let processor = processor(store.clone(), extraction);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = processor.process(&transcript, &Options::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));

        let (people, _) = store.query_database(PEOPLE_DB, None, None).await.unwrap();
        assert!(people.is_empty(), "a pre-cancelled token must stop before any page is written");
    }
}
