//! The type registry and its two namespaces.
//!
//! A process-wide *static* registry holds the built-in lattice and every
//! statically declared user type; each `Storage` additionally owns a
//! *dynamic* registry private to that store. Lookups resolve
//! dynamic-then-static through a [`TypeResolver`] view.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::attribute::AttributeDef;
use crate::builtins;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::object::Instance;
use crate::value::Value;

/// A raw type declaration: the explicit registration step that replaces
/// the original's metaclass reflection.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub(crate) type_id: UStr,
    pub(crate) bases: Vec<UStr>,
    pub(crate) attributes: Vec<(UStr, AttributeDef)>,
}

impl TypeDef {
    pub fn new(type_id: impl Into<UStr>) -> Self {
        TypeDef { type_id: type_id.into(), bases: Vec::new(), attributes: Vec::new() }
    }

    /// Append a direct base type. Order matters for linearization.
    pub fn base(mut self, type_id: impl Into<UStr>) -> Self {
        self.bases.push(type_id.into());
        self
    }

    /// Append a declared attribute. Order matters for the stored
    /// declaration order.
    pub fn attribute(mut self, name: impl Into<UStr>, def: AttributeDef) -> Self {
        self.attributes.push((name.into(), def));
        self
    }

    pub fn type_id(&self) -> &UStr {
        &self.type_id
    }
}

/// One namespace of registered types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: IndexMap<UStr, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// An empty namespace, as used for the per-store dynamic types.
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// A namespace seeded with the built-in lattice.
    pub fn with_builtins() -> Self {
        let mut registry = TypeRegistry::new();
        builtins::seed(&mut registry);
        registry
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Register an already-derived descriptor.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        if self.contains(descriptor.type_id()) {
            return Err(Error::TypeAlreadyRegistered(descriptor.type_id().clone()));
        }
        let descriptor = Arc::new(descriptor);
        self.types.insert(descriptor.type_id().clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Derive and register a declaration, resolving bases within this
    /// namespace only.
    pub fn register_def(&mut self, def: TypeDef) -> Result<Arc<TypeDescriptor>> {
        if self.contains(&def.type_id) {
            return Err(Error::TypeAlreadyRegistered(def.type_id.clone()));
        }
        let descriptor = TypeDescriptor::derive(def, &|id| self.get(id))?;
        self.register(descriptor)
    }

    pub fn get(&self, type_id: &str) -> Result<Arc<TypeDescriptor>> {
        self.types
            .get(type_id)
            .cloned()
            .ok_or_else(|| Error::UnknownType(UStr::new(type_id)))
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &UStr> {
        self.types.keys()
    }

    /// Remove a registration. Only meant for the test harness, to roll
    /// back a scope of temporarily added types.
    pub fn remove(&mut self, type_id: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.shift_remove(type_id)
    }
}

static STATIC_TYPES: Lazy<RwLock<TypeRegistry>> =
    Lazy::new(|| RwLock::new(TypeRegistry::with_builtins()));

/// The process-wide static namespace. Populated with the built-in lattice
/// on first use; statically declared user types are added through
/// [`register_static_type`].
pub fn static_registry() -> &'static RwLock<TypeRegistry> {
    &STATIC_TYPES
}

/// Register a statically declared user type, visible to every store.
pub fn register_static_type(def: TypeDef) -> Result<Arc<TypeDescriptor>> {
    static_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_def(def)
}

/// A resolution view over the dynamic and static namespaces.
///
/// The dynamic namespace, when present, shadows the static one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeResolver<'a> {
    dynamic: Option<&'a TypeRegistry>,
}

impl<'a> TypeResolver<'a> {
    /// Resolve in the static namespace only.
    pub fn static_only() -> TypeResolver<'static> {
        TypeResolver { dynamic: None }
    }

    /// Resolve dynamic-then-static.
    pub fn with_dynamic(dynamic: &'a TypeRegistry) -> Self {
        TypeResolver { dynamic: Some(dynamic) }
    }

    pub fn resolve(&self, type_id: &str) -> Result<Arc<TypeDescriptor>> {
        if let Some(dynamic) = self.dynamic {
            if let Ok(descriptor) = dynamic.get(type_id) {
                return Ok(descriptor);
            }
        }
        static_registry()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)
    }

    pub fn is_subtype(&self, type_id: &str, ancestor: &str) -> bool {
        self.resolve(type_id)
            .map(|descriptor| descriptor.has_ancestor(ancestor))
            .unwrap_or(false)
    }

    /// Build an instance of a registered node type, applying declared
    /// defaults and rejecting unknown or traversal attributes.
    pub fn instantiate<N, V, I>(&self, type_id: &str, attrs: I) -> Result<Instance>
    where
        N: Into<UStr>,
        V: Into<Value>,
        I: IntoIterator<Item = (N, V)>,
    {
        let descriptor = self.resolve(type_id)?;
        if !descriptor.has_ancestor(builtins::ATTRIBUTED_BASE) {
            return Err(Error::Configuration(format!(
                "{type_id:?} is not an instantiable type"
            )));
        }
        if descriptor.has_ancestor(builtins::RELATIONSHIP) {
            return Err(Error::Configuration(format!(
                "{type_id:?} is a relationship type; build it with Relationship::new"
            )));
        }

        let mut instance = Instance::new(descriptor.type_id().clone());
        for (name, value) in attrs {
            let name = name.into();
            let value = value.into();
            let spec = descriptor.attribute(&name).ok_or_else(|| {
                Error::Configuration(format!("{type_id:?} declares no attribute {name:?}"))
            })?;
            if !spec.kind.is_stored() {
                return Err(Error::Configuration(format!(
                    "traversal attribute {name:?} of {type_id:?} cannot be assigned"
                )));
            }
            if !value.is_null() {
                spec.kind.to_db(&value)?;
            }
            instance.set(name, value);
        }

        for (name, spec) in descriptor.attributes() {
            if spec.kind.is_stored() && instance.get(name).is_none() {
                if let Some(default) = &spec.default {
                    instance.set(name.clone(), default.clone());
                }
            }
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let registry = TypeRegistry::with_builtins();
        for id in [
            builtins::PERSISTABLE,
            builtins::PERSISTABLE_META,
            builtins::ATTRIBUTED_BASE,
            builtins::ENTITY,
            builtins::RELATIONSHIP,
            builtins::TYPE_SYSTEM,
            builtins::IS_A,
            builtins::INSTANCE_OF,
            builtins::DECLARED_ON,
            builtins::DEFINES,
        ] {
            assert!(registry.get(id).is_ok(), "missing builtin {id}");
        }
    }

    #[test]
    fn the_meta_type_resolves_under_its_own_id() {
        let registry = TypeRegistry::with_builtins();
        let meta = registry.get(builtins::PERSISTABLE_META).unwrap();
        assert_eq!(meta.type_id(), builtins::PERSISTABLE_META);
        assert!(meta.has_ancestor(builtins::PERSISTABLE));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_def(TypeDef::new("Widget").base("Entity")).unwrap();
        let err = registry.register_def(TypeDef::new("Widget").base("Entity")).unwrap_err();
        assert!(matches!(err, Error::TypeAlreadyRegistered(id) if id == "Widget"));
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = TypeRegistry::new();
        let err = registry.get("Missing").unwrap_err();
        assert!(matches!(err, Error::UnknownType(id) if id == "Missing"));
    }

    #[test]
    fn remove_rolls_back_a_registration() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_def(TypeDef::new("Widget").base("Entity")).unwrap();
        assert!(registry.remove("Widget").is_some());
        assert!(registry.get("Widget").is_err());
    }

    #[test]
    fn dynamic_namespace_shadows_static() {
        let mut dynamic = TypeRegistry::new();
        let entity = TypeRegistry::with_builtins().get(builtins::ENTITY).unwrap();
        dynamic.register(TypeDescriptor::clone(&entity)).unwrap();

        let resolver = TypeResolver::with_dynamic(&dynamic);
        let resolved = resolver.resolve(builtins::ENTITY).unwrap();
        assert!(Arc::ptr_eq(&resolved, &dynamic.get(builtins::ENTITY).unwrap()));
    }

    #[test]
    fn instantiate_applies_defaults_and_validates() {
        let resolver = TypeResolver::static_only();
        let instance = resolver
            .instantiate(builtins::TYPE_SYSTEM, [("id", Value::from("TypeSystem"))])
            .unwrap();
        assert_eq!(instance.get("id"), Some(&Value::Str("TypeSystem".into())));
        assert_eq!(instance.get("version"), None);

        let err = resolver
            .instantiate(builtins::TYPE_SYSTEM, [("nope", Value::from("x"))])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
