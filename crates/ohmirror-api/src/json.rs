// JSON shape helpers shared by the client and the entity model.

use serde_json::Value;

/// openHAB 1 (and some openHAB 2 endpoints) return a bare object instead
/// of a one-element array. Normalize both shapes into a list.
pub fn as_array(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// String field lookup that treats JSON `null` as absent.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
