//! Bidirectional translation between the remote store's per-kind property
//! wire shape and the plain [`PropertyValue`] the rest of the pipeline
//! works with. One `encode`/`decode` pair per [`PropertyKind`] variant,
//! dispatched from a `match` in [`PropertyCodec`] — never a dynamic
//! registry, since the kind set is closed.

mod date;
mod error;
mod ids;
mod kinds;
mod url_guard;

use dossier_domain_models::page::{PropertyKind, PropertySchemaEntry, PropertyValue};
use serde_json::Value as StoreValue;

pub use error::CodecError;
pub use ids::is_well_formed_page_id;
pub use url_guard::{AllowAllUrlGuard, UrlGuard};

pub const MAX_TEXT_LENGTH: usize = 2000;
pub const MAX_PHONE_LENGTH: usize = 100;
pub const MAX_URL_LENGTH: usize = 2000;

/// Stateless, pure translator between store wire payloads and
/// [`PropertyValue`]s. Holds only a borrowed [`UrlGuard`] for the `url`/
/// `files` kinds; everything else is a free function in [`kinds`].
pub struct PropertyCodec<'a> {
    url_guard: &'a dyn UrlGuard,
}

impl<'a> PropertyCodec<'a> {
    pub fn new(url_guard: &'a dyn UrlGuard) -> Self {
        Self { url_guard }
    }

    /// Translates a plain value into the store's wire shape for
    /// `property_name`, validating it against `schema` along the way.
    /// `formula`/`rollup` are read-only: encoding into them always fails.
    pub fn encode(
        &self,
        property_name: &str,
        value: &PropertyValue,
        schema: &PropertySchemaEntry,
    ) -> Result<StoreValue, CodecError> {
        if schema.kind.is_read_only() {
            return Err(CodecError::new(property_name, schema.kind, "formula/rollup properties are read-only"));
        }
        match schema.kind {
            PropertyKind::Title | PropertyKind::RichText => kinds::encode_text(value, property_name, schema.kind),
            PropertyKind::Number => kinds::encode_number(value, property_name),
            PropertyKind::Select => kinds::encode_select(value, property_name, schema),
            PropertyKind::MultiSelect => kinds::encode_multi_select(value, property_name, schema),
            PropertyKind::Date => kinds::encode_date(value, property_name),
            PropertyKind::Checkbox => kinds::encode_checkbox(value, property_name),
            PropertyKind::Url => kinds::encode_url(value, property_name, self.url_guard),
            PropertyKind::Email => kinds::encode_email(value, property_name),
            PropertyKind::Phone => kinds::encode_phone(value, property_name),
            PropertyKind::People => kinds::encode_people(value, property_name),
            PropertyKind::Files => kinds::encode_files(value, property_name, self.url_guard),
            PropertyKind::Relation => kinds::encode_relation(value, property_name),
            PropertyKind::Formula | PropertyKind::Rollup => unreachable!("read-only kinds rejected above"),
        }
    }

    /// Translates a store wire payload back into a plain value. `formula`/
    /// `rollup` decode to the embedded typed value, opaque to the caller.
    ///
    /// `url`/`files` are validated against `self.url_guard` here too, not
    /// just on encode: a compromised or misbehaving remote store could
    /// hand back a property pointing at an internal address, and that
    /// payload must fail the same SSRF check an outbound write would.
    pub fn decode(&self, property_name: &str, kind: PropertyKind, raw: &StoreValue) -> Result<PropertyValue, CodecError> {
        match kind {
            PropertyKind::Title | PropertyKind::RichText => kinds::decode_text(raw, property_name, kind),
            PropertyKind::Number => kinds::decode_number(raw, property_name),
            PropertyKind::Select => kinds::decode_select(raw, property_name),
            PropertyKind::MultiSelect => kinds::decode_multi_select(raw, property_name),
            PropertyKind::Date => kinds::decode_date(raw, property_name),
            PropertyKind::Checkbox => kinds::decode_checkbox(raw, property_name),
            PropertyKind::Url => kinds::decode_url(raw, property_name, self.url_guard),
            PropertyKind::Email => kinds::decode_email(raw, property_name),
            PropertyKind::Phone => kinds::decode_phone(raw, property_name),
            PropertyKind::People => kinds::decode_people(raw, property_name),
            PropertyKind::Files => kinds::decode_files(raw, property_name, self.url_guard),
            PropertyKind::Relation => kinds::decode_relation(raw, property_name),
            PropertyKind::Formula | PropertyKind::Rollup => kinds::decode_read_only(raw, property_name, kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_domain_models::page::{DateValue, FileRef, PersonRef};

    fn schema(kind: PropertyKind) -> PropertySchemaEntry {
        PropertySchemaEntry::new(kind)
    }

    fn select_schema(choices: &[&str]) -> PropertySchemaEntry {
        PropertySchemaEntry {
            kind: PropertyKind::Select,
            choices: choices.iter().map(|s| s.to_string()).collect(),
            allow_new_options: false,
            relation_target_database_id: None,
        }
    }

    #[test]
    fn title_round_trips() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let value = PropertyValue::Text("Alice Smith".into());
        let encoded = codec.encode("Name", &value, &schema(PropertyKind::Title)).unwrap();
        let decoded = codec.decode("Name", PropertyKind::Title, &encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn empty_text_decodes_to_empty_string() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let encoded = codec.encode("Name", &PropertyValue::Text(String::new()), &schema(PropertyKind::Title)).unwrap();
        assert_eq!(encoded["title"].as_array().unwrap().len(), 0);
        let decoded = codec.decode("Name", PropertyKind::Title, &encoded).unwrap();
        assert_eq!(decoded, PropertyValue::Text(String::new()));
    }

    #[test]
    fn text_over_2000_chars_is_truncated_on_encode() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let long = "a".repeat(2500);
        let encoded = codec.encode("Notes", &PropertyValue::Text(long), &schema(PropertyKind::RichText)).unwrap();
        let decoded = codec.decode("Notes", PropertyKind::RichText, &encoded).unwrap();
        match decoded {
            PropertyValue::Text(text) => assert_eq!(text.chars().count(), MAX_TEXT_LENGTH),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn number_rejects_nan_and_infinity() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        assert!(codec.encode("Score", &PropertyValue::Number(Some(f64::NAN)), &schema(PropertyKind::Number)).is_err());
        assert!(codec
            .encode("Score", &PropertyValue::Number(Some(f64::INFINITY)), &schema(PropertyKind::Number))
            .is_err());
        assert!(codec.encode("Score", &PropertyValue::Number(None), &schema(PropertyKind::Number)).is_ok());
    }

    #[test]
    fn select_rejects_values_outside_the_choice_set() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let schema = select_schema(&["Open", "Closed"]);
        assert!(codec.encode("Status", &PropertyValue::Select(Some("Open".into())), &schema).is_ok());
        assert!(codec.encode("Status", &PropertyValue::Select(Some("Bogus".into())), &schema).is_err());
    }

    #[test]
    fn select_with_allow_new_options_accepts_anything() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let schema = PropertySchemaEntry {
            kind: PropertyKind::Select,
            choices: vec!["Open".into()],
            allow_new_options: true,
            relation_target_database_id: None,
        };
        assert!(codec.encode("Status", &PropertyValue::Select(Some("Brand New".into())), &schema).is_ok());
    }

    #[test]
    fn multi_select_collapses_duplicates() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let schema = PropertySchemaEntry {
            kind: PropertyKind::MultiSelect,
            choices: vec!["a".into(), "b".into()],
            allow_new_options: false,
            relation_target_database_id: None,
        };
        let value = PropertyValue::MultiSelect(vec!["a".into(), "a".into(), "b".into()]);
        let encoded = codec.encode("Tags", &value, &schema).unwrap();
        let decoded = codec.decode("Tags", PropertyKind::MultiSelect, &encoded).unwrap();
        assert_eq!(decoded, PropertyValue::MultiSelect(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn checkbox_null_decodes_to_false() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let raw = serde_json::json!({ "type": "checkbox", "checkbox": null });
        let decoded = codec.decode("Done", PropertyKind::Checkbox, &raw).unwrap();
        assert_eq!(decoded, PropertyValue::Checkbox(false));
    }

    #[test]
    fn url_requires_https_scheme() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        assert!(codec
            .encode("Link", &PropertyValue::Text("http://example.com".into()), &schema(PropertyKind::Url))
            .is_err());
        assert!(codec
            .encode("Link", &PropertyValue::Text("https://example.com".into()), &schema(PropertyKind::Url))
            .is_ok());
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        assert!(codec.encode("Email", &PropertyValue::Text("not-an-email".into()), &schema(PropertyKind::Email)).is_err());
        assert!(codec
            .encode("Email", &PropertyValue::Text("alice@example.com".into()), &schema(PropertyKind::Email))
            .is_ok());
    }

    #[test]
    fn phone_rejects_over_100_chars() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let long = "5".repeat(101);
        assert!(codec.encode("Phone", &PropertyValue::Text(long), &schema(PropertyKind::Phone)).is_err());
    }

    #[test]
    fn relation_rejects_malformed_ids() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let value = PropertyValue::Relation(vec!["not-a-uuid".into()]);
        assert!(codec.encode("Employer", &value, &schema(PropertyKind::Relation)).is_err());
    }

    #[test]
    fn relation_preserves_order() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let ids = vec![
            "550e8400-e29b-41d4-a716-446655440000".to_string(),
            "660e8400-e29b-41d4-a716-446655440001".to_string(),
        ];
        let encoded = codec.encode("Employer", &PropertyValue::Relation(ids.clone()), &schema(PropertyKind::Relation)).unwrap();
        let decoded = codec.decode("Employer", PropertyKind::Relation, &encoded).unwrap();
        assert_eq!(decoded, PropertyValue::Relation(ids));
    }

    #[test]
    fn formula_cannot_be_encoded() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let raw = serde_json::json!({ "type": "formula", "formula": { "type": "number", "number": 3 } });
        assert!(codec.decode("Score", PropertyKind::Formula, &raw).is_ok());
        assert!(codec
            .encode("Score", &PropertyValue::ReadOnly(serde_json::json!(3)), &schema(PropertyKind::Formula))
            .is_err());
    }

    #[test]
    fn people_round_trips() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let value = PropertyValue::People(vec![PersonRef { id: "user-1".into() }]);
        let encoded = codec.encode("Owner", &value, &schema(PropertyKind::People)).unwrap();
        let decoded = codec.decode("Owner", PropertyKind::People, &encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn files_validate_their_urls() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let bad = PropertyValue::Files(vec![FileRef { name: "x".into(), url: "http://example.com/x".into() }]);
        assert!(codec.encode("Attachments", &bad, &schema(PropertyKind::Files)).is_err());
    }

    #[test]
    fn date_range_round_trips() {
        let codec = PropertyCodec::new(&AllowAllUrlGuard);
        let value = PropertyValue::Date(Some(DateValue {
            start: "2024-01-01T10:00:00Z".parse().unwrap(),
            end: Some("2024-01-02T10:00:00Z".parse().unwrap()),
            date_only: false,
        }));
        let encoded = codec.encode("Window", &value, &schema(PropertyKind::Date)).unwrap();
        let decoded = codec.decode("Window", PropertyKind::Date, &encoded).unwrap();
        assert_eq!(decoded, value);
    }
}
