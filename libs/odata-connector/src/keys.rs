//! Key literals for `Set(key)` addressing.

use crate::filter::quote;
use odata_edm::{FieldType, ModelDefinition};
use serde_json::Value;

/// Characters kept as-is inside a key segment; everything else is
/// percent-encoded.
const SEGMENT_SAFE: &str = "-._~!$&'()*+,;=:@";

fn raw_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders `key` the way the service expects it between parentheses.
///
/// With a model, its declared key type decides: `string` keys are quoted,
/// everything else is bare. Without one, a JSON string is quoted.
#[must_use]
pub fn key_literal(model: Option<&ModelDefinition>, key: &Value) -> String {
    let quoted = model.map_or_else(
        || key.is_string(),
        |model| model.key.field_type == FieldType::String,
    );
    let text = raw_text(key);
    let literal = if quoted { quote(&text) } else { text };
    encode_segment(&literal)
}

/// Brings `key` to the model's declared key type, so `"3"` and `3` name
/// the same row of a numeric-keyed set. Keys that don't convert are kept.
#[must_use]
pub fn normalize_key(model: Option<&ModelDefinition>, key: &Value) -> Value {
    let Some(model) = model else {
        return key.clone();
    };
    match (model.key.field_type, key) {
        (FieldType::String, Value::Number(_) | Value::Bool(_)) => Value::String(raw_text(key)),
        (FieldType::Number, Value::String(text)) => text
            .trim()
            .parse::<serde_json::Number>()
            .map_or_else(|_| key.clone(), Value::Number),
        _ => key.clone(),
    }
}

/// The key of `item`: its primary-key property when it is a row, the
/// value itself otherwise.
#[must_use]
pub fn key_of(model: Option<&ModelDefinition>, item: &Value) -> Option<Value> {
    match item {
        Value::Object(row) => model
            .and_then(|m| row.get(m.primary_key()))
            .filter(|key| !key.is_null())
            .cloned(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

pub fn encode_segment(raw: &str) -> String {
    raw.chars().fold(String::with_capacity(raw.len()), |mut out, c| {
        if c.is_ascii_alphanumeric() || SEGMENT_SAFE.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
        out
    })
}
