use dossier_domain_models::entity::{Entity, EntityKind};
use dossier_domain_models::page::{Page, PageId, PropertyValue};
use tracing::instrument;

use crate::normalize::{has_token_overlap, jaccard, normalize_title, tokenize};
use crate::jaro_winkler::jaro_winkler;

/// Identifier properties checked for an exact-match boost.
const IDENTIFIER_PROPERTIES: &[&str] = &["email", "phone", "external_id"];

const TITLE_WEIGHT: f64 = 0.6;
const IDENTIFIER_WEIGHT: f64 = 0.3;
const CONTEXT_WEIGHT: f64 = 0.1;

/// An existing page worth scoring against an extracted entity, paired with
/// the title string the caller resolved for it (title resolution needs the
/// database schema, which this crate deliberately knows nothing about).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub page: Page,
    pub title: String,
}

#[derive(Debug, Clone)]
pub enum MatchDecision {
    Match(Page),
    Ambiguous(Vec<PageId>),
    NoMatch,
}

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub high_threshold: f64,
    pub low_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { high_threshold: 90.0, low_threshold: 75.0 }
    }
}

/// Scores candidate existing pages against an extracted entity and decides
/// `Match` / `Ambiguous` / `NoMatch`. Pure and deterministic: the same
/// entity and candidate snapshot always produce the same decision, with no
/// wall-clock dependency beyond the candidates' own `last_edited_time`.
pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// The candidate-set gate: non-empty normalized token overlap between
    /// the entity's name and the candidate title, or an exact match on an
    /// identifier property.
    pub fn is_candidate(&self, entity: &Entity, candidate_title: &str, candidate_properties: &std::collections::HashMap<String, PropertyValue>) -> bool {
        has_token_overlap(&entity.name, candidate_title) || identifier_matches(entity, candidate_properties) > 0
    }

    /// Composite score in `[0, 100]`: 60% title similarity, 30% identifier
    /// exact-match boost, 10% context-field token Jaccard, each weight
    /// renormalized over whichever components the entity actually carries
    /// evidence for — an entity with no identifier properties is scored on
    /// title alone rather than being capped at 60 for lack of data it was
    /// never going to have.
    pub fn score(&self, entity: &Entity, candidate: &Candidate) -> (f64, usize) {
        let title_score = title_similarity(&entity.name, &candidate.title);

        let identifier_count = identifier_matches(entity, &candidate.page.properties);
        let identifier_checked = entity_identifier_count(entity);
        let identifier_score = if identifier_checked > 0 { Some(identifier_count as f64 / identifier_checked as f64) } else { None };

        let context_score = context_score(entity, &candidate.page.properties);

        let mut weighted_sum = TITLE_WEIGHT * title_score;
        let mut total_weight = TITLE_WEIGHT;
        if let Some(identifier_score) = identifier_score {
            weighted_sum += IDENTIFIER_WEIGHT * identifier_score;
            total_weight += IDENTIFIER_WEIGHT;
        }
        if let Some(context_score) = context_score {
            weighted_sum += CONTEXT_WEIGHT * context_score;
            total_weight += CONTEXT_WEIGHT;
        }

        ((weighted_sum / total_weight) * 100.0, identifier_count)
    }

    /// Ties are broken by (a) higher identifier-match count, (b) more
    /// recent `last_edited_time`, (c) lexical order of page id.
    #[instrument(skip(self, entity, candidates))]
    pub fn decide(&self, entity: &Entity, candidates: &[Candidate]) -> MatchDecision {
        if candidates.is_empty() {
            return MatchDecision::NoMatch;
        }

        let mut scored: Vec<(f64, usize, Candidate)> = candidates
            .iter()
            .map(|candidate| {
                let (score, identifier_count) = self.score(entity, candidate);
                (score, identifier_count, candidate.clone())
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
                .then(b.2.page.last_edited_time.cmp(&a.2.page.last_edited_time))
                .then(a.2.page.id.cmp(&b.2.page.id))
        });

        let top_score = scored[0].0;
        if top_score >= self.config.high_threshold {
            MatchDecision::Match(scored[0].2.page.clone())
        } else if top_score >= self.config.low_threshold {
            let ids = scored
                .iter()
                .filter(|(score, _, _)| *score >= self.config.low_threshold && *score < self.config.high_threshold)
                .map(|(_, _, candidate)| candidate.page.id.clone())
                .collect();
            MatchDecision::Ambiguous(ids)
        } else {
            MatchDecision::NoMatch
        }
    }
}

/// Per-word-position Jaro-Winkler for titles with matching token counts
/// (captures e.g. an initialed first name matching a full one), falling
/// back to whole-string Jaro-Winkler otherwise.
fn title_similarity(entity_name: &str, candidate_title: &str) -> f64 {
    let entity_normalized = normalize_title(entity_name);
    let candidate_normalized = normalize_title(candidate_title);
    let entity_tokens: Vec<&str> = entity_normalized.split(' ').filter(|t| !t.is_empty()).collect();
    let candidate_tokens: Vec<&str> = candidate_normalized.split(' ').filter(|t| !t.is_empty()).collect();

    if entity_tokens.len() > 1 && entity_tokens.len() == candidate_tokens.len() {
        let sum: f64 = entity_tokens.iter().zip(candidate_tokens.iter()).map(|(a, b)| jaro_winkler(a, b)).sum();
        sum / entity_tokens.len() as f64
    } else {
        jaro_winkler(&entity_normalized, &candidate_normalized)
    }
}

fn identifier_matches(entity: &Entity, candidate_properties: &std::collections::HashMap<String, PropertyValue>) -> usize {
    IDENTIFIER_PROPERTIES
        .iter()
        .filter(|key| {
            let entity_value = property_as_text(entity.properties.get(**key));
            let candidate_value = property_as_text(candidate_properties.get(**key));
            match (entity_value, candidate_value) {
                (Some(a), Some(b)) if !a.is_empty() => a.eq_ignore_ascii_case(&b),
                _ => false,
            }
        })
        .count()
}

/// How many of the identifier kinds this entity actually carries — the
/// denominator for the identifier sub-score, and whether it applies at all.
fn entity_identifier_count(entity: &Entity) -> usize {
    IDENTIFIER_PROPERTIES
        .iter()
        .filter(|key| property_as_text(entity.properties.get(**key)).is_some_and(|v| !v.is_empty()))
        .count()
}

fn property_as_text(value: Option<&PropertyValue>) -> Option<String> {
    match value {
        Some(PropertyValue::Text(text)) => Some(text.trim().to_string()),
        _ => None,
    }
}

fn context_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Person => &["organization", "role"],
        EntityKind::Organization => &["industry", "location"],
        EntityKind::Task => &["assignee", "project"],
        EntityKind::Event => &["location", "organizer"],
        EntityKind::Document => &["author", "topic"],
        EntityKind::Transgression => &["location", "category"],
        EntityKind::Place => &["region", "category"],
    }
}

/// `None` when the entity carries none of its kind's context fields — in
/// that case context contributes no evidence either way and is excluded
/// from the weighted score rather than counted as a zero.
fn context_score(entity: &Entity, candidate_properties: &std::collections::HashMap<String, PropertyValue>) -> Option<f64> {
    let fields = context_fields(entity.kind);
    let mut entity_tokens = std::collections::HashSet::new();
    let mut candidate_tokens = std::collections::HashSet::new();
    let mut entity_has_any = false;

    for field in fields {
        if let Some(PropertyValue::Text(text)) = entity.properties.get(*field) {
            if !text.trim().is_empty() {
                entity_has_any = true;
                entity_tokens.extend(tokenize(text));
            }
        }
        if let Some(PropertyValue::Text(text)) = candidate_properties.get(*field) {
            candidate_tokens.extend(tokenize(text));
        }
    }

    if entity_has_any {
        Some(jaccard(&entity_tokens, &candidate_tokens))
    } else {
        None
    }
}
