use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::ErrorRecord;
use crate::page::PageRef;

/// Why an extracted entity did not result in a create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The extraction provider downgraded the entity for a missing field.
    ExtractionWarning,
    /// The matcher returned `Ambiguous`; `candidate_ids` names the ties.
    AmbiguousMatch,
    /// A relationship target could not be resolved, in-transcript or remote.
    UnresolvedTarget,
    /// Matched an existing page, but the merge produced no changes.
    NoChange,
    /// `options.allowed_kinds` excluded this entity's kind.
    KindNotAllowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub entity: Entity,
    pub reason: SkipReason,
    #[serde(default)]
    pub candidate_ids: Vec<String>,
}

fn duration_as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

fn duration_from_millis<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let millis = u64::deserialize(d)?;
    Ok(Duration::from_millis(millis))
}

/// The per-transcript outcome of [`TranscriptProcessor::process`].
///
/// Invariant: `created.len() + updated.len() + skipped.len() + <failed
/// entities not otherwise recorded> == <entities extracted>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub created: Vec<PageRef>,
    pub updated: Vec<PageRef>,
    pub skipped: Vec<SkipRecord>,
    pub relationships_created: u32,
    pub errors: Vec<ErrorRecord>,
    /// Non-fatal conflicts noted during merge (e.g. a title overwrite that
    /// was refused because both sides were non-empty and differed).
    #[serde(default)]
    pub warnings: Vec<String>,
    pub dry_run: bool,
    #[serde(serialize_with = "duration_as_millis", deserialize_with = "duration_from_millis")]
    pub duration: Duration,
}

impl ProcessingResult {
    pub fn empty(dry_run: bool) -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            relationships_created: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            dry_run,
            duration: Duration::ZERO,
        }
    }
}

/// Aggregate counters over a batch, summed from each per-transcript result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub relationships_created: u32,
    pub errors: usize,
}

impl AggregateCounters {
    pub fn accumulate(&mut self, result: &ProcessingResult) {
        self.created += result.created.len();
        self.updated += result.updated.len();
        self.skipped += result.skipped.len();
        self.relationships_created += result.relationships_created;
        self.errors += result.errors.len();
    }
}

/// The outcome of [`BatchRunner::run_batch`]. `per_transcript` is dense and
/// index-aligned with the input vector regardless of completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub per_transcript: Vec<Option<ProcessingResult>>,
    pub aggregate: AggregateCounters,
    pub errors: Vec<ErrorRecord>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn new(capacity: usize) -> Self {
        Self {
            per_transcript: vec![None; capacity],
            aggregate: AggregateCounters::default(),
            errors: Vec::new(),
            cancelled: false,
        }
    }
}
