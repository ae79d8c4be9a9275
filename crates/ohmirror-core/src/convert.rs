// ── Payload helpers ──
//
// Small, lenient accessors over openHAB JSON. Older servers send
// numbers and booleans as strings, so every accessor accepts both.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value as Json;

use crate::error::CoreError;

/// Split `"Outside Temperature [9,0 °C]"` into the label and the
/// bracketed value. Labels without a trailing `[...]` have no value.
pub fn split_label(label: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(label) = label else {
        return (None, None);
    };
    let Some(body) = label.strip_suffix(']') else {
        return (Some(label.to_owned()), None);
    };
    let search_from = body.rfind(']').map_or(0, |i| i + 1);
    match body[search_from..].find('[') {
        Some(rel) => {
            let open = search_from + rel;
            (
                Some(body[..open].trim_end().to_owned()),
                Some(body[open + 1..].to_owned()),
            )
        }
        None => (Some(label.to_owned()), None),
    }
}

/// Parse a decimal, accepting scientific notation as a fallback.
pub fn parse_decimal(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    let raw = raw.trim();
    Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw))
}

pub(crate) fn required_str<'a>(
    json: &'a Json,
    entity: &'static str,
    key: &str,
) -> Result<&'a str, CoreError> {
    opt_str(json, key).ok_or_else(|| CoreError::missing(entity, key))
}

pub(crate) fn opt_str<'a>(json: &'a Json, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Json::as_str)
}

pub(crate) fn json_bool(json: &Json, key: &str) -> Option<bool> {
    match json.get(key)? {
        Json::Bool(b) => Some(*b),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Integer field with a default for when it is absent.
pub(crate) fn json_int(json: &Json, key: &str, default: i64) -> Result<i64, CoreError> {
    match json.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(Json::Number(n)) => n
            .as_i64()
            .ok_or_else(|| CoreError::decode(key, format!("{n} is not an integer"))),
        Some(Json::String(s)) => s.trim().parse().map_err(|e| CoreError::decode(key, e)),
        Some(other) => Err(CoreError::decode(key, format!("unexpected value {other}"))),
    }
}

pub(crate) fn json_decimal(
    json: &Json,
    entity: &'static str,
    key: &str,
) -> Result<Decimal, CoreError> {
    let raw = match json.get(key) {
        Some(Json::Number(n)) => n.to_string(),
        Some(Json::String(s)) => s.clone(),
        _ => return Err(CoreError::missing(entity, key)),
    };
    parse_decimal(&raw).map_err(|e| CoreError::decode(key, e))
}
