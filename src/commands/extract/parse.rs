use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One field as reported by the model. Values arrive as arbitrary JSON
/// (strings, numbers, nested objects); page numbers arrive as numbers or
/// numeric strings.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldAnswer {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub verbatim_source: Option<String>,
    #[serde(default)]
    pub page_number: Option<Value>,
}

impl FieldAnswer {
    /// The value rendered as text. Null stays absent; non-string JSON is
    /// serialized so structured answers still surface.
    pub fn value_str(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn page(&self) -> Option<usize> {
        match self.page_number.as_ref()? {
            Value::Number(number) => number.as_u64().map(|page| page as usize),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the answer carries an actual finding rather than a null or
    /// a literal "not found" marker.
    pub fn is_usable(&self) -> bool {
        match self.value_str() {
            None => false,
            Some(text) => {
                let trimmed = text.trim();
                !trimmed.is_empty() && trimmed != "null" && trimmed != "Not Found"
            }
        }
    }
}

pub type ParsedFields = BTreeMap<String, FieldAnswer>;

/// Outcome of decoding one model response.
#[derive(Debug)]
pub enum ParsedResponse {
    Fields(ParsedFields),
    Malformed(String),
}

impl ParsedResponse {
    /// Recover: a malformed payload becomes an empty field map so the run
    /// degrades instead of aborting.
    pub fn into_fields_or_empty(self) -> ParsedFields {
        match self {
            Self::Fields(fields) => fields,
            Self::Malformed(reason) => {
                warn!(reason = reason.as_str(), "discarding malformed model payload");
                ParsedFields::new()
            }
        }
    }
}

/// Decode the field map out of a model response that may wrap the JSON in
/// prose. The widest `{...}` span is tried first, then the raw text.
pub fn parse_field_payload(raw: &str) -> ParsedResponse {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(fields) = serde_json::from_str::<ParsedFields>(&raw[start..=end]) {
                return ParsedResponse::Fields(fields);
            }
        }
    }

    match serde_json::from_str::<ParsedFields>(raw) {
        Ok(fields) => ParsedResponse::Fields(fields),
        Err(error) => ParsedResponse::Malformed(error.to_string()),
    }
}
