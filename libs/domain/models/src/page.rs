use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque remote-store id. The store's own id format (dashed or dashless
/// 32-hex UUID) is validated at the store-client boundary, not here.
pub type PageId = String;

/// Closed set of property kinds the remote store supports. `Formula` and
/// `Rollup` are read-only: encoding into them is a `Validation` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    RichText,
    Number,
    Select,
    MultiSelect,
    Date,
    Checkbox,
    Url,
    Email,
    Phone,
    People,
    Files,
    Relation,
    Formula,
    Rollup,
}

impl PropertyKind {
    pub fn is_read_only(self) -> bool {
        matches!(self, PropertyKind::Formula | PropertyKind::Rollup)
    }

    pub fn is_collection(self) -> bool {
        matches!(
            self,
            PropertyKind::MultiSelect | PropertyKind::Relation | PropertyKind::Files | PropertyKind::People
        )
    }
}

/// A point or range date value, normalized to UTC by the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// `true` when the original value carried no time-of-day component.
    #[serde(default)]
    pub date_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub url: String,
}

/// The plain in-memory shape a [`PropertyKind`] decodes to / encodes from.
/// One variant per kind family; `Formula`/`Rollup` only ever appear decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Number(Option<f64>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date(Option<DateValue>),
    Checkbox(bool),
    People(Vec<PersonRef>),
    Files(Vec<FileRef>),
    Relation(Vec<PageId>),
    ReadOnly(serde_json::Value),
}

/// Kind-specific parameters needed to encode/validate a property, declared
/// by the owning database's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchemaEntry {
    pub kind: PropertyKind,
    /// For `select`/`multi_select`: the allowed choice set.
    #[serde(default)]
    pub choices: Vec<String>,
    /// For `select`/`multi_select`: allow values outside `choices`.
    #[serde(default)]
    pub allow_new_options: bool,
    /// For `relation`: the id of the target database.
    pub relation_target_database_id: Option<String>,
}

impl PropertySchemaEntry {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            choices: Vec::new(),
            allow_new_options: false,
            relation_target_database_id: None,
        }
    }
}

/// Per-database declaration of property name → kind + parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_id: String,
    pub properties: HashMap<String, PropertySchemaEntry>,
}

impl DatabaseSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchemaEntry> {
        self.properties.get(name)
    }
}

/// A remote-store record. Invariant: exactly one property is the title
/// property and every key here is declared by the owning schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub parent_database_id: String,
    pub properties: HashMap<String, PropertyValue>,
    pub last_edited_time: DateTime<Utc>,
}

/// A lightweight handle returned for created/updated pages, avoiding the
/// need to ship the full `Page` back through `ProcessingResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub id: PageId,
    pub database_id: String,
    pub title: String,
}
