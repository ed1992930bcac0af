//! Value coercion for outgoing sink payloads.
//!
//! Source values arrive as loosely typed JSON. The sentinel `"unknown"` and
//! unparseable numbers are dropped rather than sent, so a create payload
//! never carries either.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Source placeholder for "no value".
pub const UNKNOWN_SENTINEL: &str = "unknown";

/// Target type of a mapped field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Float,
}

/// Whether `value` is the `"unknown"` sentinel (trimmed, any case).
pub fn is_unknown(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(UNKNOWN_SENTINEL))
}

/// Parse a number written with optional thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Coerce a source value to `kind`. `None` means "omit the field".
pub fn normalize_value(value: &Value, kind: FieldKind) -> Option<Value> {
    if value.is_null() || is_unknown(value) {
        return None;
    }

    match kind {
        FieldKind::Text => match value {
            Value::String(s) => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldKind::Integer => {
            if let Some(n) = value.as_i64() {
                return Some(Value::from(n));
            }
            let n = numeric(value)?;
            Some(Value::from(n.round() as i64))
        }
        FieldKind::Float => {
            let n = numeric(value)?;
            Number::from_f64(n).map(Value::Number)
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Encode asset bytes for transmission (standard alphabet, padded).
pub fn encode_asset(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
