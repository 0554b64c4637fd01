//! The graph-driver abstraction.
//!
//! The storage engine speaks to the database exclusively through
//! [`GraphClient`]: parameterized query execution plus the driver's
//! secondary-index facility, in two namespaces (nodes and relationships).
//! Returned values are typed ([`CypherValue`]) so callers can recognize
//! nodes and edges and extract their properties, endpoints and stable ids.

use std::fmt::Debug;

use crate::error::Result;
use crate::options::StorageOptions;
use crate::query::{IndexKind, Params};
use crate::value::{PropertyMap, PropertyValue};

/// A driver-assigned stable identifier for a node or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(pub u64);

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A node as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: GraphId,
    pub properties: PropertyMap,
}

/// An edge as returned by the driver, with both endpoint nodes
/// materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRel {
    pub id: GraphId,
    pub rel_type: String,
    pub start: GraphNode,
    pub end: GraphNode,
    pub properties: PropertyMap,
}

/// One value in a returned row.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue {
    Node(GraphNode),
    Rel(GraphRel),
    Scalar(PropertyValue),
}

impl CypherValue {
    pub fn as_node(&self) -> Option<&GraphNode> {
        match self {
            CypherValue::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The stable id, for nodes and edges.
    pub fn graph_id(&self) -> Option<GraphId> {
        match self {
            CypherValue::Node(node) => Some(node.id),
            CypherValue::Rel(rel) => Some(rel.id),
            CypherValue::Scalar(_) => None,
        }
    }
}

/// One returned row.
pub type Row = Vec<CypherValue>;

/// Construction of a client from parsed connection options.
pub trait Connect: Sized {
    fn connect_with(options: &StorageOptions) -> Result<Self>;
}

/// The graph driver, as consumed by the storage engine.
///
/// All calls are synchronous; the engine performs one call at a time and
/// surfaces driver errors untouched.
pub trait GraphClient: Debug {
    /// Run a parameterized query, returning all rows.
    fn execute(&mut self, query: &str, params: &Params) -> Result<Vec<Row>>;

    /// Ensure an index exists in the given namespace.
    fn get_or_create_index(&mut self, kind: IndexKind, name: &str) -> Result<()>;

    /// Add a node or edge to an index under `(key, value)`.
    fn add_to_index(
        &mut self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &PropertyValue,
        target: GraphId,
    ) -> Result<()>;

    /// Look a node up by `(index, key, value)`.
    fn get_indexed_node(
        &mut self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Option<GraphNode>>;

    /// The names of all indexes in a namespace.
    fn get_indexes(&mut self, kind: IndexKind) -> Result<Vec<String>>;

    /// Drop an index.
    fn delete_index(&mut self, kind: IndexKind, name: &str) -> Result<()>;

    /// Remove every node and every edge.
    fn clear(&mut self) -> Result<()>;
}
