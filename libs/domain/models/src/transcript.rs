use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TranscriptId = Uuid;

/// Open enum: known values are named, anything else survives the round trip
/// as `Other`. New recording sources should not require a core release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    VoiceMemo,
    VideoTranscript,
    PersonalNote,
    ExternalSubscription,
    GoogleMeet,
    #[serde(other)]
    Other,
}

/// A single free-form transcript submitted for processing.
///
/// Immutable once handed to [`TranscriptProcessor`](../dossier_domain_processor):
/// the core never mutates a transcript in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: TranscriptId,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub source: Option<SourceTag>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Transcript {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            timestamp: Utc::now(),
            source: None,
            metadata: HashMap::new(),
        }
    }
}
