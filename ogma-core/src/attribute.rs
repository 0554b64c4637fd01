//! Attribute kinds and attribute declarations.
//!
//! A kind is the closed set of primitive attribute types plus the two
//! traversal capabilities (`Outgoing`/`Incoming`, which are never stored as
//! node properties) and user-declared custom kinds layered over a primitive
//! base.

use chrono::{DateTime, Utc};
use uuid::Uuid as UuidValue;

use crate::builtins;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::value::{PropertyValue, Value};

/// The kind of a declared attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Str,
    Int,
    Bool,
    Uuid,
    DateTime,

    /// Traversal capability: follow relationships of the given type away
    /// from the instance. Never stored as a property.
    Outgoing(UStr),

    /// Traversal capability: follow relationships of the given type towards
    /// the instance. Never stored as a property.
    Incoming(UStr),

    /// A user-declared kind with its own type id, storing and loading
    /// values the way its primitive base does.
    Custom { type_id: UStr, base: Box<AttributeKind> },
}

impl AttributeKind {
    /// The type id attribute-descriptor nodes carry as `__type__`.
    pub fn type_id(&self) -> UStr {
        match self {
            AttributeKind::Str => builtins::STRING.into(),
            AttributeKind::Int => builtins::INTEGER.into(),
            AttributeKind::Bool => builtins::BOOL.into(),
            AttributeKind::Uuid => builtins::UUID.into(),
            AttributeKind::DateTime => builtins::DATE_TIME.into(),
            AttributeKind::Outgoing(_) => builtins::OUTGOING.into(),
            AttributeKind::Incoming(_) => builtins::INCOMING.into(),
            AttributeKind::Custom { type_id, .. } => type_id.clone(),
        }
    }

    /// Whether values of this kind appear in the stored property dict.
    pub fn is_stored(&self) -> bool {
        !matches!(self, AttributeKind::Outgoing(_) | AttributeKind::Incoming(_))
    }

    /// Declare a custom kind over a primitive base.
    pub fn custom(type_id: impl Into<UStr>, base: AttributeKind) -> Result<Self> {
        if !base.is_stored() || matches!(base, AttributeKind::Custom { .. }) {
            return Err(Error::Configuration(format!(
                "custom attribute kinds must be based on a primitive kind, not {}",
                base.type_id()
            )));
        }
        Ok(AttributeKind::Custom { type_id: type_id.into(), base: Box::new(base) })
    }

    fn storage_base(&self) -> &AttributeKind {
        match self {
            AttributeKind::Custom { base, .. } => base,
            other => other,
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::Encode { kind: self.type_id(), value: format!("{value:?}") }
    }

    /// Encode an in-memory value for storage.
    ///
    /// `Null` encodes to `Null`, which the serializer drops from property
    /// dicts; traversal kinds always encode to `Null`.
    pub fn to_db(&self, value: &Value) -> Result<PropertyValue> {
        if value.is_null() || !self.is_stored() {
            return Ok(PropertyValue::Null);
        }

        match (self.storage_base(), value) {
            (AttributeKind::Str, Value::Str(s)) => Ok(PropertyValue::Str(s.clone())),
            (AttributeKind::Int, Value::Int(i)) => Ok(PropertyValue::Int(*i)),
            (AttributeKind::Bool, Value::Bool(b)) => Ok(PropertyValue::Bool(*b)),
            (AttributeKind::Uuid, Value::Uuid(_)) | (AttributeKind::DateTime, Value::DateTime(_)) => {
                Ok(value.to_db())
            }
            _ => Err(self.mismatch(value)),
        }
    }

    /// Decode a stored primitive back into an in-memory value.
    pub fn from_db(&self, value: &PropertyValue) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self.storage_base(), value) {
            (AttributeKind::Str, PropertyValue::Str(s)) => Ok(Value::Str(s.clone())),
            (AttributeKind::Int, PropertyValue::Int(i)) => Ok(Value::Int(*i)),
            (AttributeKind::Bool, PropertyValue::Bool(b)) => Ok(Value::Bool(*b)),
            (AttributeKind::Uuid, PropertyValue::Str(s)) => UuidValue::parse_str(s)
                .map(Value::Uuid)
                .map_err(|err| Error::Deserialisation(format!("invalid uuid {s:?}: {err}"))),
            (AttributeKind::DateTime, PropertyValue::Str(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|err| Error::Deserialisation(format!("invalid datetime {s:?}: {err}"))),
            _ => Err(Error::Deserialisation(format!(
                "stored value {value:?} does not fit attribute kind {}",
                self.type_id()
            ))),
        }
    }
}

/// A raw attribute declaration, before registration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub kind: AttributeKind,
    pub unique: bool,
    pub default: Option<Value>,
}

impl AttributeDef {
    pub fn new(kind: AttributeKind) -> Self {
        AttributeDef { kind, unique: false, default: None }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A registered attribute: the declaration plus its name and the type it
/// was declared on. The declaring type is what names the unique index, and
/// re-declaration in a subtype does not move it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: UStr,
    pub kind: AttributeKind,
    pub unique: bool,
    pub default: Option<Value>,
    pub declared_on: UStr,
}

impl AttributeSpec {
    pub(crate) fn declare(name: UStr, def: AttributeDef, declared_on: UStr) -> Self {
        AttributeSpec { name, kind: def.kind, unique: def.unique, default: def.default, declared_on }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_kinds_are_not_stored() {
        assert!(!AttributeKind::Outgoing("Likes".into()).is_stored());
        assert!(!AttributeKind::Incoming("Likes".into()).is_stored());
        assert!(AttributeKind::Str.is_stored());
    }

    #[test]
    fn custom_kind_stores_like_its_base() {
        let kind = AttributeKind::custom("Score", AttributeKind::Int).unwrap();
        assert_eq!(kind.type_id(), "Score");
        assert_eq!(kind.to_db(&Value::Int(7)).unwrap(), PropertyValue::Int(7));
        assert_eq!(kind.from_db(&PropertyValue::Int(7)).unwrap(), Value::Int(7));
    }

    #[test]
    fn custom_kind_over_custom_kind_is_rejected() {
        let base = AttributeKind::custom("Score", AttributeKind::Int).unwrap();
        assert!(AttributeKind::custom("MetaScore", base).is_err());
    }

    #[test]
    fn encode_rejects_mismatched_values() {
        let err = AttributeKind::Int.to_db(&Value::Str("seven".into())).unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    #[test]
    fn datetime_survives_its_stored_form() {
        let dt = DateTime::parse_from_rfc3339("2014-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let stored = AttributeKind::DateTime.to_db(&Value::DateTime(dt)).unwrap();
        assert_eq!(AttributeKind::DateTime.from_db(&stored).unwrap(), Value::DateTime(dt));
    }
}
