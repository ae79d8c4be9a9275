// ── Attribute values ──
//
// Every attribute stored in a change set is one of these. There is no
// null variant: an attribute without a value is simply absent, and its
// removal shows up in the `deleted` half of a diff.

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use super::color::Hsb;
use super::mapping::Mapping;

/// Wire format for date-time item states.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Hsb(Hsb),
    DateTime(NaiveDateTime),
    Mapping(Mapping),
    List(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Decimal view; integers widen losslessly.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hsb(&self) -> Option<Hsb> {
        match self {
            Self::Hsb(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Short type name, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Hsb(_) => "hsb",
            Self::DateTime(_) => "datetime",
            Self::Mapping(_) => "mapping",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
            Self::Hsb(c) => write!(f, "{c}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Self::Mapping(m) => write!(f, "{m}"),
            Self::List(l) => f.write_str(&l.join(",")),
        }
    }
}

// ── Conversions ──

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Hsb> for Value {
    fn from(v: Hsb) -> Self {
        Self::Hsb(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<Mapping> for Value {
    fn from(v: Mapping) -> Self {
        Self::Mapping(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn decimal_equality_ignores_scale() {
        let a = Value::from(Decimal::from_str("22.50").unwrap());
        let b = Value::from(Decimal::from_str("22.5").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn int_widens_to_decimal() {
        assert_eq!(Value::Int(7).as_decimal(), Some(Decimal::from(7)));
        assert_eq!(Value::from("7").as_decimal(), None);
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_value(Value::List(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(json, serde_json::json!(["a", "b"]));
        let json = serde_json::to_value(Value::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!(true));
    }
}
