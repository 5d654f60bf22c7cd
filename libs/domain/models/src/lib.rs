//! Shared domain types for the transcript intelligence pipeline.
//!
//! Every type here is a plain, serde-friendly value type with no behavior
//! beyond construction helpers. Components own no domain type exclusively;
//! they borrow or clone values defined here.

pub mod cancellation;
pub mod entity;
pub mod error;
pub mod job;
pub mod page;
pub mod result;
pub mod transcript;

mod tests_serialization;

pub use cancellation::CancellationToken;
pub use entity::{Entity, EntityKind, RelationshipRef};
pub use error::{ErrorKind, ErrorRecord};
pub use job::{Job, JobId, JobOutcome, JobProgress, JobRequest, JobState};
pub use page::{DatabaseSchema, Page, PageId, PageRef, PropertyKind, PropertySchemaEntry, PropertyValue};
pub use result::{AggregateCounters, BatchResult, ProcessingResult, SkipReason, SkipRecord};
pub use transcript::{SourceTag, Transcript, TranscriptId};
