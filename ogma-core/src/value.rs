//! In-memory attribute values and their stored, primitive form.
//!
//! Two layers mirror the two sides of the serialization protocol: [`Value`]
//! is what application code reads and writes on instances, [`PropertyValue`]
//! is what ends up in the `{key → primitive}` dictionary on a graph node or
//! edge. `Uuid` and `DateTime` only exist on the in-memory side; they are
//! stored as strings.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// An in-memory attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Null,
}

/// A primitive value as stored on a graph node or edge.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// The property dictionary stored on a node or edge.
///
/// Equality is key-wise and independent of insertion order, which is what
/// the update-vs-no-op arbitration in `save` relies on.
pub type PropertyMap = IndexMap<String, PropertyValue>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Encode without an attribute kind, keeping the primitive as-is.
    ///
    /// Used for raw query parameters and index filters, where no declared
    /// kind is in play.
    pub fn to_db(&self) -> PropertyValue {
        match self {
            Value::Str(s) => PropertyValue::Str(s.clone()),
            Value::Int(i) => PropertyValue::Int(*i),
            Value::Float(f) => PropertyValue::Float(*f),
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Uuid(u) => PropertyValue::Str(u.as_hyphenated().to_string()),
            Value::DateTime(dt) => {
                PropertyValue::Str(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Null => PropertyValue::Null,
        }
    }
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Decode without an attribute kind, keeping the primitive as-is.
    pub fn to_value(&self) -> Value {
        match self {
            PropertyValue::Str(s) => Value::Str(s.clone()),
            PropertyValue::Int(i) => Value::Int(*i),
            PropertyValue::Float(f) => Value::Float(*f),
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Null => Value::Null,
        }
    }

    /// Canonical text form used when adding to or looking up a secondary
    /// index.
    pub fn index_repr(&self) -> String {
        match self {
            PropertyValue::Str(s) => s.clone(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Null => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}
