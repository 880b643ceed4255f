//! Open key/value bag attached to artifacts, runs and audit entries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered string-keyed metadata bag.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
///
/// Integers and floats are kept apart so `17` survives a round trip as `17`
/// rather than `17.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<&String> for MetadataValue {
    fn from(value: &String) -> Self {
        MetadataValue::String(value.clone())
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(i64::from(value))
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value.into_iter().map(MetadataValue::String).collect())
    }
}

impl From<&[String]> for MetadataValue {
    fn from(value: &[String]) -> Self {
        MetadataValue::List(value.iter().map(MetadataValue::from).collect())
    }
}

impl From<Vec<MetadataValue>> for MetadataValue {
    fn from(value: Vec<MetadataValue>) -> Self {
        MetadataValue::List(value)
    }
}

impl From<Metadata> for MetadataValue {
    fn from(value: Metadata) -> Self {
        MetadataValue::Map(value)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => MetadataValue::Null,
        }
    }
}
