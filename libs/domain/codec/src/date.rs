use chrono::{DateTime, Utc};
use dossier_domain_models::page::{DateValue, PropertyKind};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DatePayload {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

/// Normalizes a [`DateValue`] to RFC3339 UTC. A range requires `end >=
/// start`; a date-only value is serialized with a midnight time component
/// but `date_only` survives in the payload so decode can tell the two apart.
pub(crate) fn encode(property_name: &str, value: &DateValue) -> Result<DatePayload, CodecError> {
    if let Some(end) = value.end {
        if end < value.start {
            return Err(CodecError::new(
                property_name,
                PropertyKind::Date,
                "range end must not precede start",
            ));
        }
    }
    Ok(DatePayload {
        start: format_instant(value.start, value.date_only),
        end: value.end.map(|end| format_instant(end, value.date_only)),
    })
}

fn format_instant(instant: DateTime<Utc>, date_only: bool) -> String {
    if date_only {
        instant.format("%Y-%m-%d").to_string()
    } else {
        instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

/// Missing time-of-day in the wire payload (a bare `YYYY-MM-DD`) decodes to
/// a date-only value; anything else must parse as RFC3339.
pub(crate) fn decode(property_name: &str, payload: &DatePayload) -> Result<DateValue, CodecError> {
    let (start, date_only) = parse_instant(property_name, &payload.start)?;
    let end = payload
        .end
        .as_deref()
        .map(|raw| parse_instant(property_name, raw).map(|(instant, _)| instant))
        .transpose()?;
    Ok(DateValue { start, end, date_only })
}

fn parse_instant(property_name: &str, raw: &str) -> Result<(DateTime<Utc>, bool), CodecError> {
    if raw.len() == "YYYY-MM-DD".len() && !raw.contains('T') {
        let naive = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| {
            CodecError::new(property_name, PropertyKind::Date, format!("invalid date: {err}"))
        })?;
        let midnight = naive.and_hms_opt(0, 0, 0).expect("midnight always valid");
        return Ok((DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc), true));
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|err| CodecError::new(property_name, PropertyKind::Date, format!("invalid RFC3339 timestamp: {err}")))?;
    Ok((parsed.with_timezone(&Utc), false))
}
