use std::collections::HashSet;

use dossier_domain_models::entity::EntityKind;
use dossier_domain_models::transcript::SourceTag;
use serde::{Deserialize, Serialize};

/// Default confidence an incoming scalar value must meet to overwrite a
/// non-null existing value during merge.
pub const DEFAULT_OVERWRITE_CONFIDENCE: f64 = 0.85;

/// Per-call knobs for [`crate::TranscriptProcessor::process`]. Every field
/// defaults sensibly, so a caller submitting `{}` over the wire gets the
/// same behavior as [`Options::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// When true, no writes reach the store; the full decision trace is
    /// still produced in the returned `ProcessingResult`.
    pub dry_run: bool,
    pub enable_deduplication: bool,
    /// Overrides the matcher's `high_threshold` when set.
    pub deduplication_threshold: Option<f64>,
    pub create_relationships: bool,
    /// Restricts which entity kinds are upserted; `None` means all kinds.
    pub allowed_kinds: Option<HashSet<EntityKind>>,
    pub source_override: Option<SourceTag>,
    pub overwrite_confidence: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dry_run: false,
            enable_deduplication: true,
            deduplication_threshold: None,
            create_relationships: true,
            allowed_kinds: None,
            source_override: None,
            overwrite_confidence: DEFAULT_OVERWRITE_CONFIDENCE,
        }
    }
}
