use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptId;

/// Closed set of entity kinds the extraction stage may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Task,
    Event,
    Document,
    Transgression,
    Place,
}

/// A reference to another extracted or existing entity, named by surface
/// form rather than id — resolution happens during the relationship phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRef {
    pub target_name: String,
    pub target_kind: EntityKind,
    pub relation_label: String,
}

/// A structured record produced by extraction, not yet reconciled against
/// the store. Never persisted on its own — only the upsert decision made
/// from it survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, crate::page::PropertyValue>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRef>,
    pub source_transcript_id: TranscriptId,
    pub confidence: f64,
}

impl Entity {
    /// Confidence is defined on `[0, 1]`; callers that construct entities
    /// from untrusted extraction output should clamp rather than trust it.
    pub fn clamped_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}
