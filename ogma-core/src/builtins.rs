//! Well-known type ids and the built-in type lattice.
//!
//! Everything the storage engine knows by name lives here: the persistable
//! root, the meta-type under which class objects are serialized, the
//! `AttributedBase` frontier below which the type graph is mirrored into
//! the store, the four metamodel relationships and the attribute kinds.

use crate::attribute::{AttributeDef, AttributeKind};
use crate::registry::{TypeDef, TypeRegistry};

/// The key every stored property dictionary carries its type id under.
pub const TYPE_KEY: &str = "__type__";

/// Root marker: only objects whose type descends from this can be saved.
pub const PERSISTABLE: &str = "Persistable";

/// The meta-type. Class objects serialize as
/// `{ "__type__": "PersistableMeta", "id": <type_id> }` and class nodes are
/// indexed under this name.
pub const PERSISTABLE_META: &str = "PersistableMeta";

/// The mirror frontier: the type graph is reflected into the store for this
/// type's descendants only.
pub const ATTRIBUTED_BASE: &str = "AttributedBase";

/// Base of ordinary user node types.
pub const ENTITY: &str = "Entity";

/// Base of all relationship types.
pub const RELATIONSHIP: &str = "Relationship";

/// Base of the attribute kinds; attribute-descriptor nodes carry a kind's
/// type id as their `__type__`.
pub const ATTRIBUTE: &str = "Attribute";

/// The singleton anchor node type; its one instance has `id = "TypeSystem"`.
pub const TYPE_SYSTEM: &str = "TypeSystem";

// The four well-known metamodel relationships.
pub const INSTANCE_OF: &str = "InstanceOf";
pub const IS_A: &str = "IsA";
pub const DECLARED_ON: &str = "DeclaredOn";
pub const DEFINES: &str = "Defines";

// Attribute kinds.
pub const STRING: &str = "String";
pub const INTEGER: &str = "Integer";
pub const BOOL: &str = "Bool";
pub const UUID: &str = "Uuid";
pub const DATE_TIME: &str = "DateTime";
pub const OUTGOING: &str = "Outgoing";
pub const INCOMING: &str = "Incoming";

/// Seed a registry with the built-in lattice.
///
/// Registration order respects base-before-subtype so the effective
/// attribute maps can be derived in one pass.
pub(crate) fn seed(registry: &mut TypeRegistry) {
    let defs = [
        TypeDef::new(PERSISTABLE),
        TypeDef::new(PERSISTABLE_META).base(PERSISTABLE),
        TypeDef::new(ATTRIBUTED_BASE).base(PERSISTABLE),
        TypeDef::new(ENTITY).base(ATTRIBUTED_BASE),
        TypeDef::new(RELATIONSHIP).base(ATTRIBUTED_BASE),
        TypeDef::new(ATTRIBUTE).base(ATTRIBUTED_BASE),
        TypeDef::new(STRING).base(ATTRIBUTE),
        TypeDef::new(INTEGER).base(ATTRIBUTE),
        TypeDef::new(BOOL).base(ATTRIBUTE),
        TypeDef::new(UUID).base(ATTRIBUTE),
        TypeDef::new(DATE_TIME).base(ATTRIBUTE),
        TypeDef::new(OUTGOING).base(ATTRIBUTE),
        TypeDef::new(INCOMING).base(ATTRIBUTE),
        TypeDef::new(INSTANCE_OF).base(RELATIONSHIP),
        TypeDef::new(IS_A).base(RELATIONSHIP),
        TypeDef::new(DECLARED_ON)
            .base(RELATIONSHIP)
            .attribute("name", AttributeDef::new(AttributeKind::Str)),
        TypeDef::new(DEFINES).base(RELATIONSHIP),
        TypeDef::new(TYPE_SYSTEM)
            .base(ATTRIBUTED_BASE)
            .attribute("id", AttributeDef::new(AttributeKind::Str).unique())
            .attribute("version", AttributeDef::new(AttributeKind::Uuid)),
    ];

    for def in defs {
        registry
            .register_def(def)
            .expect("built-in type lattice must register cleanly");
    }
}
