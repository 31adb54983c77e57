//! Tolerant field decoders
//!
//! Stored documents were hand-edited and written by several generations of
//! the admin UI, so scalars show up with the wrong JSON type (`"1200"` for a
//! count, `null` for a title). These helpers accept any JSON value and coerce
//! it instead of failing the whole document.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::ShareCount;

/// Coerce any scalar into a string; `null` becomes empty
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

/// Coerce into a boolean: numbers are truthy when non-zero, strings when
/// they read `true`, `1`, `yes` or `on`
pub fn boolean<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(truthy(&Value::deserialize(deserializer)?))
}

/// Coerce into an integer score
pub fn score<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(as_score(&Value::deserialize(deserializer)?).unwrap_or(0))
}

/// Coerce an object of counters; numeric values become numbers, other
/// non-empty strings are kept as display labels
pub fn counts<'de, D>(deserializer: D) -> Result<BTreeMap<String, ShareCount>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => return Ok(BTreeMap::new()),
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let count = match as_score(&value) {
                Some(n) => ShareCount::Number(n.max(0) as u64),
                None => match value {
                    Value::String(s) if !s.trim().is_empty() => ShareCount::Text(s),
                    _ => ShareCount::Number(0),
                },
            };
            (key, count)
        })
        .collect())
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

/// Read a JSON number or numeric string as an integer (floats are rounded)
pub(crate) fn as_score(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}
