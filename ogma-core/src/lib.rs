#![forbid(unsafe_code)]

//! Core of ogma: an object-graph persistence layer for Cypher-speaking
//! graph databases.
//!
//! User types, their instances and their relationships are all stored as
//! nodes and edges in one graph, and the type hierarchy itself is mirrored
//! into that graph so that instances can be retrieved, filtered by their
//! declared attributes and traversed via typed relationships.

pub mod builtins;
pub mod error;

mod ext;

pub mod attribute;
pub mod client;
pub mod descriptor;
pub mod object;
pub mod options;
pub mod query;
pub mod registry;
pub mod serialize;
pub mod storage;
pub mod testing;
pub mod value;

mod logger;

#[doc(inline)]
pub use error::{Error, Result};

pub use attribute::{AttributeDef, AttributeKind, AttributeSpec};
pub use client::{Connect, CypherValue, GraphClient, GraphId, GraphNode, GraphRel, Row};
pub use descriptor::TypeDescriptor;
pub use ext::ustr::UStr;
pub use object::{Direction, Instance, Object, Relationship};
pub use options::StorageOptions;
pub use query::{IndexKind, Param, Params};
pub use registry::{
    register_static_type, static_registry, TypeDef, TypeRegistry, TypeResolver,
};
pub use storage::{register_dynamic_type, RowValue, Storage};
pub use value::{PropertyMap, PropertyValue, Value};
