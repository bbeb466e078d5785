//! Complaint API payload handling.
//!
//! The search API answers with a JSON array of hits; the complaint itself sits
//! under each hit's `_source` field. Throttled requests get a JSON object (or
//! plain text) telling the caller how long to wait instead.

use super::error::IngestError;
use serde_json::Value;

/// Field that wraps each complaint record inside a search hit.
pub const RECORD_WRAPPER_FIELD: &str = "_source";

/// Pull the complaint records out of a raw response body.
///
/// Hits without the wrapper field are skipped. A non-array payload, a
/// non-object hit, or a wrapped value that is not an object is an error.
pub fn extract_records(body: &[u8]) -> Result<Vec<Value>, IngestError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| IngestError::Serialization(format!("invalid JSON: {e}")))?;

    let hits = match payload {
        Value::Array(hits) => hits,
        other => {
            return Err(IngestError::Serialization(format!(
                "expected an array of hits, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(hits.len());
    for (i, hit) in hits.into_iter().enumerate() {
        let mut hit = match hit {
            Value::Object(map) => map,
            other => {
                return Err(IngestError::Serialization(format!(
                    "hit {i} is {}, expected an object",
                    json_kind(&other)
                )))
            }
        };
        match hit.remove(RECORD_WRAPPER_FIELD) {
            Some(record @ Value::Object(_)) => records.push(record),
            Some(other) => {
                return Err(IngestError::Serialization(format!(
                    "hit {i} has a non-object {RECORD_WRAPPER_FIELD}: {}",
                    json_kind(&other)
                )))
            }
            None => continue,
        }
    }

    Ok(records)
}

/// First unsigned integer appearing in the body, used as a backoff hint
/// ("retry in 30 seconds").
pub fn parse_wait_hint(body: &[u8]) -> Option<u64> {
    let text = String::from_utf8_lossy(body);
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
