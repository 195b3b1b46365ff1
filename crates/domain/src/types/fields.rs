//! Open-ended field mappings

use std::collections::BTreeMap;

use serde_json::Value;

/// Field name to value mapping for one remote object.
pub type FieldMap = BTreeMap<String, Value>;

/// A value counts as present when it is neither null nor an empty string.
///
/// Lookup and correlation keys are only taken from present values.
pub fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Get a present field value.
pub fn present<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| has_value(v))
}

/// Render a scalar value as a key string (`"42"` and `42` both give `42`).
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Build a [`FieldMap`] from `(name, value)` pairs.
pub fn field_map<I, K, V>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
