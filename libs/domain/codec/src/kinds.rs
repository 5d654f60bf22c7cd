use dossier_domain_models::page::{
    DateValue, FileRef, PageId, PersonRef, PropertyKind, PropertySchemaEntry, PropertyValue,
};
use serde_json::{json, Value as StoreValue};
use std::collections::HashSet;

use crate::date;
use crate::error::CodecError;
use crate::ids::is_well_formed_page_id;
use crate::url_guard::UrlGuard;
use crate::{MAX_PHONE_LENGTH, MAX_TEXT_LENGTH, MAX_URL_LENGTH};

/// The JSON key a [`PropertyKind`] is nested under in the store's per-
/// property wire object, e.g. `{"type": "url", "url": "https://..."}`.
pub(crate) fn wire_key(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Title => "title",
        PropertyKind::RichText => "rich_text",
        PropertyKind::Number => "number",
        PropertyKind::Select => "select",
        PropertyKind::MultiSelect => "multi_select",
        PropertyKind::Date => "date",
        PropertyKind::Checkbox => "checkbox",
        PropertyKind::Url => "url",
        PropertyKind::Email => "email",
        PropertyKind::Phone => "phone_number",
        PropertyKind::People => "people",
        PropertyKind::Files => "files",
        PropertyKind::Relation => "relation",
        PropertyKind::Formula => "formula",
        PropertyKind::Rollup => "rollup",
    }
}

fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_LENGTH {
        text.to_string()
    } else {
        text.chars().take(MAX_TEXT_LENGTH).collect()
    }
}

pub(crate) fn encode_text(value: &PropertyValue, property_name: &str, kind: PropertyKind) -> Result<StoreValue, CodecError> {
    let PropertyValue::Text(text) = value else {
        return Err(CodecError::new(property_name, kind, "expected a text value"));
    };
    if text.is_empty() {
        return Ok(json!({ "type": wire_key(kind), wire_key(kind): [] }));
    }
    let truncated = truncate_text(text);
    Ok(json!({
        "type": wire_key(kind),
        wire_key(kind): [{ "plain_text": truncated }],
    }))
}

pub(crate) fn decode_text(raw: &StoreValue, property_name: &str, kind: PropertyKind) -> Result<PropertyValue, CodecError> {
    let segments = raw
        .get(wire_key(kind))
        .and_then(StoreValue::as_array)
        .ok_or_else(|| CodecError::new(property_name, kind, "missing segment array"))?;
    let Some(first) = segments.first() else {
        return Ok(PropertyValue::Text(String::new()));
    };
    let text = first
        .get("plain_text")
        .and_then(StoreValue::as_str)
        .ok_or_else(|| CodecError::new(property_name, kind, "segment missing plain_text"))?;
    Ok(PropertyValue::Text(text.to_string()))
}

pub(crate) fn encode_number(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Number(number) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Number, "expected a number value"));
    };
    match number {
        None => Ok(json!({ "type": "number", "number": null })),
        Some(n) if n.is_nan() || n.is_infinite() => {
            Err(CodecError::new(property_name, PropertyKind::Number, "NaN and infinities are not representable").with_offending_value(n.to_string()))
        }
        Some(n) => Ok(json!({ "type": "number", "number": n })),
    }
}

pub(crate) fn decode_number(raw: &StoreValue, property_name: &str) -> Result<PropertyValue, CodecError> {
    match raw.get("number") {
        None | Some(StoreValue::Null) => Ok(PropertyValue::Number(None)),
        Some(StoreValue::Number(n)) => Ok(PropertyValue::Number(n.as_f64())),
        Some(_) => Err(CodecError::new(property_name, PropertyKind::Number, "number field is not numeric")),
    }
}

fn validate_choice(property_name: &str, kind: PropertyKind, option: &str, schema: &PropertySchemaEntry) -> Result<(), CodecError> {
    if schema.allow_new_options || schema.choices.iter().any(|choice| choice == option) {
        Ok(())
    } else {
        Err(CodecError::new(property_name, kind, format!("'{option}' is not a declared choice")).with_offending_value(option))
    }
}

pub(crate) fn encode_select(value: &PropertyValue, property_name: &str, schema: &PropertySchemaEntry) -> Result<StoreValue, CodecError> {
    let PropertyValue::Select(option) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Select, "expected a select value"));
    };
    match option {
        None => Ok(json!({ "type": "select", "select": null })),
        Some(name) => {
            validate_choice(property_name, PropertyKind::Select, name, schema)?;
            Ok(json!({ "type": "select", "select": { "name": name } }))
        }
    }
}

pub(crate) fn decode_select(raw: &StoreValue, _property_name: &str) -> Result<PropertyValue, CodecError> {
    let name = raw.get("select").and_then(|v| v.get("name")).and_then(StoreValue::as_str);
    Ok(PropertyValue::Select(name.map(str::to_string)))
}

pub(crate) fn encode_multi_select(value: &PropertyValue, property_name: &str, schema: &PropertySchemaEntry) -> Result<StoreValue, CodecError> {
    let PropertyValue::MultiSelect(options) = value else {
        return Err(CodecError::new(property_name, PropertyKind::MultiSelect, "expected a multi_select value"));
    };
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for option in options {
        validate_choice(property_name, PropertyKind::MultiSelect, option, schema)?;
        if seen.insert(option.clone()) {
            deduped.push(json!({ "name": option }));
        }
    }
    Ok(json!({ "type": "multi_select", "multi_select": deduped }))
}

pub(crate) fn decode_multi_select(raw: &StoreValue, property_name: &str) -> Result<PropertyValue, CodecError> {
    let items = raw
        .get("multi_select")
        .and_then(StoreValue::as_array)
        .ok_or_else(|| CodecError::new(property_name, PropertyKind::MultiSelect, "missing multi_select array"))?;
    let names = items
        .iter()
        .filter_map(|item| item.get("name").and_then(StoreValue::as_str).map(str::to_string))
        .collect();
    Ok(PropertyValue::MultiSelect(names))
}

pub(crate) fn encode_date(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Date(date) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Date, "expected a date value"));
    };
    match date {
        None => Ok(json!({ "type": "date", "date": null })),
        Some(d) => {
            let payload = date::encode(property_name, d)?;
            Ok(json!({ "type": "date", "date": payload }))
        }
    }
}

pub(crate) fn decode_date(raw: &StoreValue, property_name: &str) -> Result<PropertyValue, CodecError> {
    match raw.get("date") {
        None | Some(StoreValue::Null) => Ok(PropertyValue::Date(None)),
        Some(payload) => {
            let parsed: date::DatePayload = serde_json::from_value(payload.clone())
                .map_err(|err| CodecError::new(property_name, PropertyKind::Date, format!("malformed date payload: {err}")))?;
            Ok(PropertyValue::Date(Some(date::decode(property_name, &parsed)?)))
        }
    }
}

pub(crate) fn encode_checkbox(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Checkbox(checked) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Checkbox, "expected a checkbox value"));
    };
    Ok(json!({ "type": "checkbox", "checkbox": checked }))
}

pub(crate) fn decode_checkbox(raw: &StoreValue, _property_name: &str) -> Result<PropertyValue, CodecError> {
    let checked = raw.get("checkbox").and_then(StoreValue::as_bool).unwrap_or(false);
    Ok(PropertyValue::Checkbox(checked))
}

fn validate_url(property_name: &str, kind: PropertyKind, url: &str, guard: &dyn UrlGuard) -> Result<(), CodecError> {
    if url.chars().count() > MAX_URL_LENGTH {
        return Err(CodecError::new(property_name, kind, "url exceeds 2000 characters"));
    }
    let parsed = url::Url::parse(url).map_err(|err| CodecError::new(property_name, kind, format!("unparseable url: {err}")))?;
    if parsed.scheme() != "https" {
        return Err(CodecError::new(property_name, kind, "url scheme must be https"));
    }
    guard.check(url).map_err(|reason| CodecError::new(property_name, kind, reason))
}

pub(crate) fn encode_url(value: &PropertyValue, property_name: &str, guard: &dyn UrlGuard) -> Result<StoreValue, CodecError> {
    let PropertyValue::Text(url) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Url, "expected a text value"));
    };
    if url.is_empty() {
        return Ok(json!({ "type": "url", "url": null }));
    }
    validate_url(property_name, PropertyKind::Url, url, guard)?;
    Ok(json!({ "type": "url", "url": url }))
}

pub(crate) fn decode_url(raw: &StoreValue, property_name: &str, guard: &dyn UrlGuard) -> Result<PropertyValue, CodecError> {
    let url = raw.get("url").and_then(StoreValue::as_str).unwrap_or_default();
    if !url.is_empty() {
        validate_url(property_name, PropertyKind::Url, url, guard)?;
    }
    Ok(PropertyValue::Text(url.to_string()))
}

pub(crate) fn encode_email(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Text(email) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Email, "expected a text value"));
    };
    if email.is_empty() {
        return Ok(json!({ "type": "email", "email": null }));
    }
    if !looks_like_email(email) {
        return Err(CodecError::new(property_name, PropertyKind::Email, "not a valid email address").with_offending_value(email.clone()));
    }
    Ok(json!({ "type": "email", "email": email }))
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !value.contains(' ')
}

pub(crate) fn decode_email(raw: &StoreValue, _property_name: &str) -> Result<PropertyValue, CodecError> {
    let email = raw.get("email").and_then(StoreValue::as_str).unwrap_or_default();
    Ok(PropertyValue::Text(email.to_string()))
}

pub(crate) fn encode_phone(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Text(phone) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Phone, "expected a text value"));
    };
    if phone.chars().count() > MAX_PHONE_LENGTH {
        return Err(CodecError::new(property_name, PropertyKind::Phone, "phone number exceeds 100 characters"));
    }
    Ok(json!({ "type": "phone_number", "phone_number": phone }))
}

pub(crate) fn decode_phone(raw: &StoreValue, _property_name: &str) -> Result<PropertyValue, CodecError> {
    let phone = raw.get("phone_number").and_then(StoreValue::as_str).unwrap_or_default();
    Ok(PropertyValue::Text(phone.to_string()))
}

pub(crate) fn encode_people(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::People(people) = value else {
        return Err(CodecError::new(property_name, PropertyKind::People, "expected a people value"));
    };
    for person in people {
        if person.id.trim().is_empty() {
            return Err(CodecError::new(property_name, PropertyKind::People, "person id must not be blank"));
        }
    }
    let items: Vec<StoreValue> = people.iter().map(|p| json!({ "id": p.id })).collect();
    Ok(json!({ "type": "people", "people": items }))
}

pub(crate) fn decode_people(raw: &StoreValue, property_name: &str) -> Result<PropertyValue, CodecError> {
    let items = raw
        .get("people")
        .and_then(StoreValue::as_array)
        .ok_or_else(|| CodecError::new(property_name, PropertyKind::People, "missing people array"))?;
    let people = items
        .iter()
        .filter_map(|item| item.get("id").and_then(StoreValue::as_str))
        .map(|id| PersonRef { id: id.to_string() })
        .collect();
    Ok(PropertyValue::People(people))
}

pub(crate) fn encode_files(value: &PropertyValue, property_name: &str, guard: &dyn UrlGuard) -> Result<StoreValue, CodecError> {
    let PropertyValue::Files(files) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Files, "expected a files value"));
    };
    let mut items = Vec::with_capacity(files.len());
    for file in files {
        validate_url(property_name, PropertyKind::Files, &file.url, guard)?;
        items.push(json!({ "name": file.name, "external": { "url": file.url } }));
    }
    Ok(json!({ "type": "files", "files": items }))
}

pub(crate) fn decode_files(raw: &StoreValue, property_name: &str, guard: &dyn UrlGuard) -> Result<PropertyValue, CodecError> {
    let items = raw
        .get("files")
        .and_then(StoreValue::as_array)
        .ok_or_else(|| CodecError::new(property_name, PropertyKind::Files, "missing files array"))?;
    let mut files = Vec::with_capacity(items.len());
    for item in items {
        let name = item.get("name").and_then(StoreValue::as_str).unwrap_or_default().to_string();
        let url = item
            .get("external")
            .and_then(|e| e.get("url"))
            .and_then(StoreValue::as_str)
            .ok_or_else(|| CodecError::new(property_name, PropertyKind::Files, "file entry missing external.url"))?
            .to_string();
        validate_url(property_name, PropertyKind::Files, &url, guard)?;
        files.push(FileRef { name, url });
    }
    Ok(PropertyValue::Files(files))
}

pub(crate) fn encode_relation(value: &PropertyValue, property_name: &str) -> Result<StoreValue, CodecError> {
    let PropertyValue::Relation(ids) = value else {
        return Err(CodecError::new(property_name, PropertyKind::Relation, "expected a relation value"));
    };
    for id in ids {
        if !is_well_formed_page_id(id) {
            return Err(CodecError::new(property_name, PropertyKind::Relation, "malformed page id").with_offending_value(id.clone()));
        }
    }
    let items: Vec<StoreValue> = ids.iter().map(|id| json!({ "id": id })).collect();
    Ok(json!({ "type": "relation", "relation": items }))
}

pub(crate) fn decode_relation(raw: &StoreValue, property_name: &str) -> Result<PropertyValue, CodecError> {
    let items = raw
        .get("relation")
        .and_then(StoreValue::as_array)
        .ok_or_else(|| CodecError::new(property_name, PropertyKind::Relation, "missing relation array"))?;
    let ids: Vec<PageId> = items
        .iter()
        .filter_map(|item| item.get("id").and_then(StoreValue::as_str))
        .map(str::to_string)
        .collect();
    Ok(PropertyValue::Relation(ids))
}

pub(crate) fn decode_read_only(raw: &StoreValue, property_name: &str, kind: PropertyKind) -> Result<PropertyValue, CodecError> {
    raw.get(wire_key(kind))
        .cloned()
        .map(PropertyValue::ReadOnly)
        .ok_or_else(|| CodecError::new(property_name, kind, "missing embedded value"))
}
