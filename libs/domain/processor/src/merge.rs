//! Implements the property merge policy applied when an extracted entity
//! matches an existing page (spec.md §4.7): title never overwrites a
//! differing non-empty value, scalars overwrite only above a confidence
//! bar, collections union, and rich text accumulates with a provenance
//! tag instead of overwriting.

use std::collections::HashMap;

use dossier_domain_models::page::{DatabaseSchema, PropertyKind, PropertyValue};
use dossier_domain_models::transcript::TranscriptId;

/// Result of merging one entity's properties into an existing page's.
pub struct MergeOutcome {
    pub properties: HashMap<String, PropertyValue>,
    pub changed: bool,
    pub warnings: Vec<String>,
}

/// Merges `incoming` (freshly extracted) properties onto `existing` (the
/// matched page's current properties), per `schema`'s declared kind for
/// each property name. Properties in `incoming` that the schema does not
/// declare are dropped with a warning rather than rejected outright — the
/// caller has already chosen to route this entity at this database.
pub fn merge_properties(
    schema: &DatabaseSchema,
    existing: &HashMap<String, PropertyValue>,
    incoming: &HashMap<String, PropertyValue>,
    confidence: f64,
    transcript_id: TranscriptId,
    overwrite_confidence: f64,
) -> MergeOutcome {
    let mut merged = existing.clone();
    let mut changed = false;
    let mut warnings = Vec::new();

    for (name, incoming_value) in incoming {
        let Some(entry) = schema.property(name) else {
            warnings.push(format!("property '{name}' is not declared by the target database; ignored"));
            continue;
        };
        if entry.kind.is_read_only() {
            warnings.push(format!("property '{name}' is read-only; ignored"));
            continue;
        }

        let existing_value = merged.get(name).cloned();
        match entry.kind {
            PropertyKind::Title => {
                if let Some(merged_value) = merge_title(name, existing_value.as_ref(), incoming_value, &mut warnings) {
                    if existing_value.as_ref() != Some(&merged_value) {
                        changed = true;
                    }
                    merged.insert(name.clone(), merged_value);
                }
            }
            PropertyKind::RichText => {
                if let Some(merged_value) = merge_rich_text(existing_value.as_ref(), incoming_value, transcript_id) {
                    changed = true;
                    merged.insert(name.clone(), merged_value);
                }
            }
            PropertyKind::MultiSelect | PropertyKind::Relation | PropertyKind::Files | PropertyKind::People => {
                if let Some(merged_value) = merge_collection(existing_value.as_ref(), incoming_value) {
                    changed = true;
                    merged.insert(name.clone(), merged_value);
                }
            }
            _ => {
                if let Some(merged_value) = merge_scalar(existing_value.as_ref(), incoming_value, confidence, overwrite_confidence) {
                    changed = true;
                    merged.insert(name.clone(), merged_value);
                }
            }
        }
    }

    MergeOutcome { properties: merged, changed, warnings }
}

fn merge_title(name: &str, existing: Option<&PropertyValue>, incoming: &PropertyValue, warnings: &mut Vec<String>) -> Option<PropertyValue> {
    let PropertyValue::Text(incoming_text) = incoming else { return None };
    if incoming_text.is_empty() {
        return None;
    }
    match existing {
        Some(PropertyValue::Text(existing_text)) if !existing_text.is_empty() => {
            if existing_text == incoming_text {
                None
            } else {
                warnings.push(format!("title conflict on '{name}': kept '{existing_text}', extracted '{incoming_text}'"));
                None
            }
        }
        _ => Some(PropertyValue::Text(incoming_text.clone())),
    }
}

fn merge_rich_text(existing: Option<&PropertyValue>, incoming: &PropertyValue, transcript_id: TranscriptId) -> Option<PropertyValue> {
    let PropertyValue::Text(incoming_text) = incoming else { return None };
    if incoming_text.is_empty() {
        return None;
    }
    let tag = format!("[source: {transcript_id}]");
    let block = format!("{incoming_text}\n{tag}");

    match existing {
        Some(PropertyValue::Text(existing_text)) if !existing_text.is_empty() => {
            if existing_text.contains(&block) {
                None
            } else {
                Some(PropertyValue::Text(format!("{existing_text}\n\n{block}")))
            }
        }
        _ => Some(PropertyValue::Text(block)),
    }
}

fn merge_collection(existing: Option<&PropertyValue>, incoming: &PropertyValue) -> Option<PropertyValue> {
    match (existing, incoming) {
        (Some(PropertyValue::MultiSelect(existing)), PropertyValue::MultiSelect(incoming)) => {
            union_preserving(existing, incoming).map(PropertyValue::MultiSelect)
        }
        (None, PropertyValue::MultiSelect(incoming)) if !incoming.is_empty() => Some(PropertyValue::MultiSelect(incoming.clone())),
        (Some(PropertyValue::Relation(existing)), PropertyValue::Relation(incoming)) => {
            union_preserving(existing, incoming).map(PropertyValue::Relation)
        }
        (None, PropertyValue::Relation(incoming)) if !incoming.is_empty() => Some(PropertyValue::Relation(incoming.clone())),
        (Some(PropertyValue::Files(existing)), PropertyValue::Files(incoming)) => {
            let mut merged = existing.clone();
            let mut added = false;
            for file in incoming {
                if !merged.iter().any(|f| f.url == file.url) {
                    merged.push(file.clone());
                    added = true;
                }
            }
            added.then_some(PropertyValue::Files(merged))
        }
        (None, PropertyValue::Files(incoming)) if !incoming.is_empty() => Some(PropertyValue::Files(incoming.clone())),
        (Some(PropertyValue::People(existing)), PropertyValue::People(incoming)) => {
            let mut merged = existing.clone();
            let mut added = false;
            for person in incoming {
                if !merged.iter().any(|p| p.id == person.id) {
                    merged.push(person.clone());
                    added = true;
                }
            }
            added.then_some(PropertyValue::People(merged))
        }
        (None, PropertyValue::People(incoming)) if !incoming.is_empty() => Some(PropertyValue::People(incoming.clone())),
        _ => None,
    }
}

fn union_preserving(existing: &[String], incoming: &[String]) -> Option<Vec<String>> {
    let mut merged = existing.to_vec();
    let mut added = false;
    for value in incoming {
        if !merged.iter().any(|v| v == value) {
            merged.push(value.clone());
            added = true;
        }
    }
    added.then_some(merged)
}

fn merge_scalar(existing: Option<&PropertyValue>, incoming: &PropertyValue, confidence: f64, overwrite_confidence: f64) -> Option<PropertyValue> {
    if !is_present(incoming) {
        return None;
    }
    let existing_present = existing.is_some_and(is_present);
    if existing_present && confidence < overwrite_confidence {
        return None;
    }
    if existing == Some(incoming) {
        return None;
    }
    Some(incoming.clone())
}

fn is_present(value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Text(text) => !text.is_empty(),
        PropertyValue::Number(value) => value.is_some(),
        PropertyValue::Select(value) => value.is_some(),
        PropertyValue::Date(value) => value.is_some(),
        PropertyValue::Checkbox(_) => true,
        PropertyValue::ReadOnly(_) => false,
        PropertyValue::MultiSelect(values) => !values.is_empty(),
        PropertyValue::People(values) => !values.is_empty(),
        PropertyValue::Files(values) => !values.is_empty(),
        PropertyValue::Relation(values) => !values.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_domain_models::page::PropertySchemaEntry;
    use uuid::Uuid;

    fn schema() -> DatabaseSchema {
        let mut properties = HashMap::new();
        properties.insert("Name".to_string(), PropertySchemaEntry::new(PropertyKind::Title));
        properties.insert("Notes".to_string(), PropertySchemaEntry::new(PropertyKind::RichText));
        properties.insert("Role".to_string(), PropertySchemaEntry::new(PropertyKind::Select));
        properties.insert("Tags".to_string(), PropertySchemaEntry::new(PropertyKind::MultiSelect));
        DatabaseSchema { database_id: "db".to_string(), properties }
    }

    #[test]
    fn title_conflict_keeps_existing_and_warns() {
        let mut existing = HashMap::new();
        existing.insert("Name".to_string(), PropertyValue::Text("Alice Smith".to_string()));
        let mut incoming = HashMap::new();
        incoming.insert("Name".to_string(), PropertyValue::Text("Alicia Smith".to_string()));

        let outcome = merge_properties(&schema(), &existing, &incoming, 0.9, Uuid::new_v4(), 0.85);
        assert_eq!(outcome.properties.get("Name"), Some(&PropertyValue::Text("Alice Smith".to_string())));
        assert!(!outcome.warnings.is_empty());
        assert!(!outcome.changed);
    }

    #[test]
    fn rich_text_appends_with_provenance_tag_and_is_idempotent() {
        let transcript_id = Uuid::new_v4();
        let mut existing = HashMap::new();
        existing.insert("Notes".to_string(), PropertyValue::Text("first note".to_string()));
        let mut incoming = HashMap::new();
        incoming.insert("Notes".to_string(), PropertyValue::Text("second note".to_string()));

        let outcome = merge_properties(&schema(), &existing, &incoming, 0.9, transcript_id, 0.85);
        let PropertyValue::Text(merged) = outcome.properties.get("Notes").unwrap() else { panic!("expected text") };
        assert!(merged.contains("first note"));
        assert!(merged.contains("second note"));
        assert!(merged.contains(&format!("[source: {transcript_id}]")));

        let second_pass = merge_properties(&schema(), &outcome.properties, &incoming, 0.9, transcript_id, 0.85);
        assert!(!second_pass.changed, "re-processing the same transcript must not append a duplicate block");
    }

    #[test]
    fn scalar_overwrite_requires_confidence_above_threshold() {
        let mut existing = HashMap::new();
        existing.insert("Role".to_string(), PropertyValue::Select(Some("Analyst".to_string())));
        let mut incoming = HashMap::new();
        incoming.insert("Role".to_string(), PropertyValue::Select(Some("Manager".to_string())));

        let low_confidence = merge_properties(&schema(), &existing, &incoming, 0.5, Uuid::new_v4(), 0.85);
        assert!(!low_confidence.changed);

        let high_confidence = merge_properties(&schema(), &existing, &incoming, 0.9, Uuid::new_v4(), 0.85);
        assert!(high_confidence.changed);
        assert_eq!(high_confidence.properties.get("Role"), Some(&PropertyValue::Select(Some("Manager".to_string()))));
    }

    #[test]
    fn scalar_overwrite_is_unconditional_when_existing_is_null() {
        let existing = HashMap::new();
        let mut incoming = HashMap::new();
        incoming.insert("Role".to_string(), PropertyValue::Select(Some("Analyst".to_string())));

        let outcome = merge_properties(&schema(), &existing, &incoming, 0.1, Uuid::new_v4(), 0.85);
        assert!(outcome.changed);
    }

    #[test]
    fn collection_properties_union_preserving_existing() {
        let mut existing = HashMap::new();
        existing.insert("Tags".to_string(), PropertyValue::MultiSelect(vec!["vip".to_string()]));
        let mut incoming = HashMap::new();
        incoming.insert("Tags".to_string(), PropertyValue::MultiSelect(vec!["vip".to_string(), "contact".to_string()]));

        let outcome = merge_properties(&schema(), &existing, &incoming, 0.9, Uuid::new_v4(), 0.85);
        let PropertyValue::MultiSelect(tags) = outcome.properties.get("Tags").unwrap() else { panic!("expected multi_select") };
        assert_eq!(tags, &vec!["vip".to_string(), "contact".to_string()]);
    }
}
