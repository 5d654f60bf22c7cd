#[cfg(test)]
mod tests {
    use crate::entity::{Entity, EntityKind, RelationshipRef};
    use crate::page::{PropertyKind, PropertyValue};
    use crate::transcript::{SourceTag, Transcript};
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn transcript_roundtrips_through_json() {
        let mut t = Transcript::new("Team Meeting", "Alice and Bob discussed the roadmap.");
        t.source = Some(SourceTag::GoogleMeet);
        t.metadata.insert("room".into(), "north-wing".into());

        let json = serde_json::to_string(&t).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, t.id);
        assert_eq!(back.title, t.title);
        assert_eq!(back.source, Some(SourceTag::GoogleMeet));
    }

    #[test]
    fn source_tag_accepts_unknown_values() {
        let back: SourceTag = serde_json::from_str("\"satellite_uplink\"").unwrap();
        assert_eq!(back, SourceTag::Other);
    }

    #[test]
    fn entity_with_relationships_roundtrips() {
        let mut properties = HashMap::new();
        properties.insert("email".to_string(), PropertyValue::Text("alice@example.com".into()));

        let entity = Entity {
            kind: EntityKind::Person,
            name: "Alice Smith".into(),
            properties,
            relationships: vec![RelationshipRef {
                target_name: "ACME Corp".into(),
                target_kind: EntityKind::Organization,
                relation_label: "employed_by".into(),
            }],
            source_transcript_id: Uuid::new_v4(),
            confidence: 0.92,
        };

        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.relationships.len(), 1);
        assert_eq!(back.relationships[0].target_kind, EntityKind::Organization);
    }

    #[test]
    fn property_kind_is_a_closed_set() {
        assert!(PropertyKind::Formula.is_read_only());
        assert!(!PropertyKind::Title.is_read_only());
        assert!(PropertyKind::MultiSelect.is_collection());
        assert!(!PropertyKind::Number.is_collection());
    }
}
