// Selection and switch widgets map command values to display labels.
// Numeric commands compare as decimals so "1" and "1.0" hit the same
// entry.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use ohmirror_api::json::{as_array, str_field};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingKey {
    Number(Decimal),
    Text(String),
}

impl MappingKey {
    pub fn parse(raw: &str) -> Self {
        Decimal::from_str(raw.trim()).map_or_else(|_| Self::Text(raw.to_owned()), Self::Number)
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for MappingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Ordered command → label mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Mapping(IndexMap<MappingKey, String>);

impl Mapping {
    /// Build from the `mappings` field of a widget payload. Accepts a
    /// single object or an array; entries without `command` or `label`
    /// are skipped. Returns `None` if the field is absent.
    pub fn from_json(raw: Option<&Json>) -> Option<Self> {
        let raw = raw.filter(|v| !v.is_null())?;
        let entries = as_array(raw)
            .into_iter()
            .filter_map(|m| {
                let command = str_field(m, "command")?;
                let label = str_field(m, "label")?;
                Some((MappingKey::parse(command), label.to_owned()))
            })
            .collect();
        Some(Self(entries))
    }

    /// Label for a wire-encoded command or state.
    pub fn label_for(&self, wire: &str) -> Option<&str> {
        self.0.get(&MappingKey::parse(wire)).map(String::as_str)
    }

    pub fn insert(&mut self, key: MappingKey, label: impl Into<String>) {
        self.0.insert(key, label.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MappingKey, &str)> {
        self.0.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}
