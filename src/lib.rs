#![forbid(unsafe_code)]

//! ogma: object-graph persistence for Cypher-speaking graph databases.
//!
//! Declare types, save their instances, and the type hierarchy itself is
//! mirrored into the same graph:
//!
//! ```
//! use ogma::testing::MemoryGraph;
//! use ogma::{AttributeDef, AttributeKind, Object, Storage, TypeDef, Value};
//!
//! # fn main() -> ogma::Result<()> {
//! let mut store = Storage::new(MemoryGraph::new());
//! store.initialize()?;
//!
//! store.register_dynamic_type(
//!     TypeDef::new("Person")
//!         .base("Entity")
//!         .attribute("id", AttributeDef::new(AttributeKind::Str).unique()),
//! )?;
//!
//! let alice = store.instantiate("Person", [("id", "alice")])?;
//! store.save(&Object::Instance(alice))?;
//!
//! let found = store.get("Person", &[("id", Value::from("alice"))])?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

pub use ogma_core::error::{self, Error, Result};

pub use ogma_core::builtins;
pub use ogma_core::testing;

pub use ogma_core::{
    attribute, client, descriptor, object, options, query, registry, serialize, storage, value,
};

pub use ogma_core::{
    register_dynamic_type, register_static_type, static_registry, AttributeDef, AttributeKind,
    AttributeSpec, Connect, CypherValue, Direction, GraphClient, GraphId, GraphNode, GraphRel,
    IndexKind, Instance, Object, Param, Params, PropertyMap, PropertyValue, Relationship, Row,
    RowValue, Storage, StorageOptions, TypeDef, TypeDescriptor, TypeRegistry, TypeResolver, UStr,
    Value,
};
