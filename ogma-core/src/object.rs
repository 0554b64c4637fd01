//! The in-memory object model.
//!
//! Class objects, instances, relationships and attribute descriptors are
//! the four shapes the serializer knows how to turn into property
//! dictionaries and back. Instances carry their attributes as data rather
//! than as struct fields; declared types exist only in the registry
//! (an explicit registration step replaces the original's metaclass
//! reflection).

use indexmap::IndexMap;

use crate::attribute::AttributeSpec;
use crate::ext::ustr::UStr;
use crate::value::Value;

/// Any object the store can serialize.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// A registered type, referenced by its id.
    Class(UStr),
    /// An instance of a registered node type.
    Instance(Instance),
    /// An instance of a registered relationship type.
    Rel(Relationship),
    /// An attribute descriptor, as it appears on attribute nodes.
    Attr(AttributeSpec),
}

impl Object {
    /// The type id of the object's type: the meta-type for classes, the
    /// registered type for everything else.
    pub fn type_id(&self) -> UStr {
        match self {
            Object::Class(_) => crate::builtins::PERSISTABLE_META.into(),
            Object::Instance(instance) => instance.type_id.clone(),
            Object::Rel(rel) => rel.type_id.clone(),
            Object::Attr(spec) => spec.kind.type_id(),
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Object::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&UStr> {
        match self {
            Object::Class(type_id) => Some(type_id),
            _ => None,
        }
    }

    pub fn as_rel(&self) -> Option<&Relationship> {
        match self {
            Object::Rel(rel) => Some(rel),
            _ => None,
        }
    }
}

impl From<Instance> for Object {
    fn from(instance: Instance) -> Self {
        Object::Instance(instance)
    }
}

impl From<Relationship> for Object {
    fn from(rel: Relationship) -> Self {
        Object::Rel(rel)
    }
}

/// An instance of a registered node type: a type id plus attribute values.
///
/// Only set attributes are carried; an unset attribute is simply absent
/// from the stored property dict.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_id: UStr,
    attrs: IndexMap<UStr, Value>,
}

impl Instance {
    pub fn new(type_id: impl Into<UStr>) -> Self {
        Instance { type_id: type_id.into(), attrs: IndexMap::new() }
    }

    pub fn type_id(&self) -> &UStr {
        &self.type_id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Set an attribute value. `Null` unsets it.
    pub fn set(&mut self, name: impl Into<UStr>, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        let name = name.into();
        if value.is_null() {
            self.attrs.swap_remove(&name);
        } else {
            self.attrs.insert(name, value);
        }
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<UStr>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&UStr, &Value)> {
        self.attrs.iter()
    }
}

/// Which way a traversal runs, relative to the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An instance of a relationship type between two persisted objects.
///
/// Endpoints are not stored as edge properties; they are resolved through
/// their own unique indexes when the relationship is written, and filled in
/// from the driver's edge value when one is read back.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    type_id: UStr,
    pub start: Option<Box<Object>>,
    pub end: Option<Box<Object>>,
    attrs: IndexMap<UStr, Value>,
}

impl Relationship {
    pub fn new(type_id: impl Into<UStr>, start: Object, end: Object) -> Self {
        Relationship {
            type_id: type_id.into(),
            start: Some(Box::new(start)),
            end: Some(Box::new(end)),
            attrs: IndexMap::new(),
        }
    }

    /// A relationship value without endpoints, as used for the property
    /// dicts of the metamodel edges.
    pub fn detached(type_id: impl Into<UStr>) -> Self {
        Relationship { type_id: type_id.into(), start: None, end: None, attrs: IndexMap::new() }
    }

    pub fn type_id(&self) -> &UStr {
        &self.type_id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn set(&mut self, name: impl Into<UStr>, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        let name = name.into();
        if value.is_null() {
            self.attrs.swap_remove(&name);
        } else {
            self.attrs.insert(name, value);
        }
        self
    }

    pub fn with(mut self, name: impl Into<UStr>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&UStr, &Value)> {
        self.attrs.iter()
    }
}
