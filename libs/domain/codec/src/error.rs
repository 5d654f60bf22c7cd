use dossier_domain_models::page::PropertyKind;
use dossier_domain_models::{ErrorKind, ErrorRecord};

/// Every codec failure carries enough context to build an [`ErrorRecord`]
/// without ever raising through the encoding path as a bare exception.
#[derive(Debug, thiserror::Error)]
#[error("property '{property_name}' ({kind:?}): {reason}")]
pub struct CodecError {
    pub property_name: String,
    pub kind: PropertyKind,
    pub reason: String,
    pub offending_value: Option<String>,
}

impl CodecError {
    pub fn new(property_name: impl Into<String>, kind: PropertyKind, reason: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            kind,
            reason: reason.into(),
            offending_value: None,
        }
    }

    pub fn with_offending_value(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.offending_value = Some(redact(&value));
        self
    }
}

/// Strings over 64 characters are redacted to a length-only marker so
/// transcript/page content never leaks into error context.
fn redact(value: &str) -> String {
    if value.chars().count() > 64 {
        format!("<redacted, {} chars>", value.chars().count())
    } else {
        value.to_string()
    }
}

impl From<CodecError> for ErrorRecord {
    fn from(err: CodecError) -> Self {
        let mut record = ErrorRecord::new(ErrorKind::Validation, err.to_string())
            .with_context("property_name", &err.property_name)
            .with_context("kind", format!("{:?}", err.kind));
        if let Some(value) = &err.offending_value {
            record = record.with_context("offending_value", value);
        }
        record
    }
}
