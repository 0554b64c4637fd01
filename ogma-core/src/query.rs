//! The Cypher templates: all graph interaction goes through the query
//! shapes produced here, parameterized by primitive values.

use std::fmt::Write;

use indexmap::IndexMap;

use crate::builtins;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::object::{Direction, Instance, Object, Relationship};
use crate::registry::TypeResolver;
use crate::serialize::{class_relationships, get_indexes, object_to_dict, TripleRef};
use crate::value::{PropertyMap, PropertyValue};

/// A named query parameter: a whole property dict, or a single primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Map(PropertyMap),
    Value(PropertyValue),
}

/// The parameter map attached to a query.
pub type Params = IndexMap<String, Param>;

/// The two index namespaces of the graph driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Node,
    Relationship,
}

impl IndexKind {
    pub(crate) fn start_fn(self) -> &'static str {
        match self {
            IndexKind::Node => "node",
            IndexKind::Relationship => "relationship",
        }
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// An index lookup as used by a `START` clause, through the object's first
/// unique index.
pub fn start_clause(resolver: &TypeResolver<'_>, obj: &Object, name: &str) -> Result<String> {
    let indexes = get_indexes(resolver, obj)?;
    let (index_name, key, value) = indexes
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotIndexable(obj.type_id()))?;
    Ok(format!(
        "{name}=node:{index_name}({key}=\"{}\")",
        quote(&value.index_repr())
    ))
}

/// The `CREATE UNIQUE` query mirroring an entire type hierarchy, including
/// each type's declared attributes.
///
/// Returns the query text, the mentioned classes in `RETURN` order, and
/// the parameter map. Re-running the query is idempotent: identical
/// patterns collapse.
pub fn create_types_query(
    resolver: &TypeResolver<'_>,
    type_id: &str,
    root: &Instance,
) -> Result<(String, Vec<UStr>, Params)> {
    let triples = class_relationships(resolver, type_id)?;

    let mut params = Params::new();
    let root_indexes = get_indexes(resolver, &Object::Instance(root.clone()))?;
    let (root_index, root_key, root_value) = root_indexes
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotIndexable(builtins::TYPE_SYSTEM.into()))?;
    params.insert("root_id".into(), Param::Value(root_value));
    params.insert(
        "IsA_props".into(),
        Param::Map(object_to_dict(resolver, &Object::Rel(Relationship::detached(builtins::IS_A)))?),
    );
    params.insert(
        "Defines_props".into(),
        Param::Map(object_to_dict(
            resolver,
            &Object::Rel(Relationship::detached(builtins::DEFINES)),
        )?),
    );

    let mut lines: Vec<String> = Vec::new();
    let mut mentioned: IndexMap<UStr, ()> = IndexMap::new();
    let mut is_first = true;

    for triple in triples {
        // only the part of the lattice below the mirror frontier is persisted
        if !resolver.is_subtype(&triple.dst, builtins::ATTRIBUTED_BASE) {
            continue;
        }
        let src = match triple.src {
            TripleRef::Class(id) => id,
            TripleRef::This => continue,
        };

        let src_new = !mentioned.contains_key(&src);
        let lhs = if src_new {
            format!("({src} {{{src}_props}})")
        } else {
            src.to_string()
        };
        mentioned.insert(src.clone(), ());

        let mut dst_new = false;
        if is_first {
            // the first persisted triple bootstraps the hierarchy off the root
            is_first = false;
            lines.push(format!("root -[:DEFINES {{Defines_props}}]-> {lhs}"));
        } else {
            let dst = triple.dst;
            dst_new = !mentioned.contains_key(&dst);
            let rhs = if dst_new {
                format!("({dst} {{{dst}_props}})")
            } else {
                dst.to_string()
            };
            mentioned.insert(dst.clone(), ());

            let rel_name = triple.rel.type_id();
            lines.push(format!(
                "{lhs} -[:{} {{{rel_name}_props}}]-> {rhs}",
                rel_name.to_uppercase()
            ));
            if dst_new {
                declare_attribute_lines(resolver, &dst, &mut lines, &mut params)?;
            }
        }
        if src_new {
            declare_attribute_lines(resolver, &src, &mut lines, &mut params)?;
        }
    }

    if lines.is_empty() {
        return Err(Error::Configuration(format!(
            "type {type_id:?} has no hierarchy below {}",
            builtins::ATTRIBUTED_BASE
        )));
    }

    for class_id in mentioned.keys() {
        params.insert(
            format!("{class_id}_props"),
            Param::Map(object_to_dict(resolver, &Object::Class(class_id.clone()))?),
        );
    }

    let mut query = format!("START root=node:{root_index}({root_key}={{root_id}})\nCREATE UNIQUE\n");
    for (i, line) in lines.iter().enumerate() {
        let sep = if i + 1 == lines.len() { "\n" } else { ",\n" };
        write!(query, "    {line}{sep}").expect("writing to a string cannot fail");
    }
    query.push_str("RETURN ");
    let classes: Vec<UStr> = mentioned.into_keys().collect();
    for (i, class_id) in classes.iter().enumerate() {
        if i > 0 {
            query.push_str(", ");
        }
        query.push_str(class_id);
    }

    Ok((query, classes, params))
}

/// One attribute node plus its `DECLAREDON` edge per declared attribute of
/// `class_id`.
fn declare_attribute_lines(
    resolver: &TypeResolver<'_>,
    class_id: &UStr,
    lines: &mut Vec<String>,
    params: &mut Params,
) -> Result<()> {
    let descriptor = resolver.resolve(class_id)?;
    for (attr_name, spec) in descriptor.declared_attributes() {
        let key = format!("{class_id}_{attr_name}");
        let decl_key = format!("{key}_decl_props");

        lines.push(format!("({{{key}}}) -[:DECLAREDON {{{decl_key}}}]-> {class_id}"));

        params.insert(key, Param::Map(object_to_dict(resolver, &Object::Attr(spec.clone()))?));
        let declared_on = Relationship::detached(builtins::DECLARED_ON)
            .with("name", attr_name.as_str());
        params.insert(
            decl_key,
            Param::Map(object_to_dict(resolver, &Object::Rel(declared_on))?),
        );
    }
    Ok(())
}

/// `START n1=…, n2=… CREATE n1 -[r:REL_TYPE {props}]-> n2 RETURN r`.
///
/// Both endpoints must be indexable.
pub fn create_relationship_query(
    resolver: &TypeResolver<'_>,
    rel: &Relationship,
) -> Result<(String, Params)> {
    let start = rel.start.as_deref().ok_or_else(|| {
        Error::Configuration(format!("relationship {:?} has no start object", rel.type_id()))
    })?;
    let end = rel.end.as_deref().ok_or_else(|| {
        Error::Configuration(format!("relationship {:?} has no end object", rel.type_id()))
    })?;

    let props = object_to_dict(resolver, &Object::Rel(rel.clone()))?;
    let query = format!(
        "START {}, {} CREATE n1 -[r:{} {{props}}]-> n2 RETURN r",
        start_clause(resolver, start, "n1")?,
        start_clause(resolver, end, "n2")?,
        rel.type_id().to_uppercase(),
    );

    let mut params = Params::new();
    params.insert("props".into(), Param::Map(props));
    Ok((query, params))
}

/// `START cls=… CREATE (n {props}) -[:INSTANCEOF {rel_props}]-> cls RETURN n`.
pub fn create_instance_query(
    resolver: &TypeResolver<'_>,
    instance: &Instance,
) -> Result<(String, Params)> {
    let query = format!(
        "START cls=node:{}(id={{type_id}}) CREATE (n {{props}}) -[:INSTANCEOF {{rel_props}}]-> cls RETURN n",
        builtins::PERSISTABLE_META,
    );

    let mut params = Params::new();
    params.insert(
        "type_id".into(),
        Param::Value(PropertyValue::Str(instance.type_id().to_string())),
    );
    params.insert(
        "props".into(),
        Param::Map(object_to_dict(resolver, &Object::Instance(instance.clone()))?),
    );
    params.insert(
        "rel_props".into(),
        Param::Map(object_to_dict(
            resolver,
            &Object::Rel(Relationship::detached(builtins::INSTANCE_OF)),
        )?),
    );
    Ok((query, params))
}

/// `START n=… SET n.k1={k1}, … RETURN n` over exactly the changed keys.
pub fn update_query(
    resolver: &TypeResolver<'_>,
    existing: &Object,
    changes: &PropertyMap,
) -> Result<(String, Params)> {
    let mut set_clauses = String::new();
    let mut params = Params::new();
    for (i, (key, value)) in changes.iter().enumerate() {
        if i > 0 {
            set_clauses.push_str(", ");
        }
        write!(set_clauses, "n.{key}={{{key}}}").expect("writing to a string cannot fail");
        params.insert(key.clone(), Param::Value(value.clone()));
    }

    let query = format!(
        "START {}\nSET {set_clauses}\nRETURN n",
        start_clause(resolver, existing, "n")?
    );
    Ok((query, params))
}

/// Direct index lookup, used for class objects and relationships.
pub fn indexed_lookup_query(kind: IndexKind, index_name: &str, key: &str) -> String {
    format!(
        "START nr = {}:{index_name}({key}={{idx_value}}) RETURN nr",
        kind.start_fn()
    )
}

/// The instance lookup: anchored at the TypeSystem root, reaching any
/// instance below the mirrored hierarchy, OR-filtered over the supplied
/// unique keys.
pub fn instance_lookup_query(
    resolver: &TypeResolver<'_>,
    root: &Instance,
    filter: &PropertyMap,
) -> Result<(String, Params)> {
    let root_indexes = get_indexes(resolver, &Object::Instance(root.clone()))?;
    let (root_index, root_key, root_value) = root_indexes
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotIndexable(builtins::TYPE_SYSTEM.into()))?;

    let mut params = Params::new();
    let mut where_clauses = String::new();
    for (i, (key, value)) in filter.iter().enumerate() {
        if i > 0 {
            where_clauses.push_str(" or ");
        }
        write!(where_clauses, "n.{key}? = {{{key}}}").expect("writing to a string cannot fail");
        params.insert(key.clone(), Param::Value(value.clone()));
    }
    params.insert("idx_value".into(), Param::Value(root_value));

    let query = format!(
        "START root=node:{root_index}({root_key}={{idx_value}})\n\
         MATCH n -[:INSTANCEOF]-> () -[:ISA*]-> () <-[:DEFINES]- root\n\
         WHERE {where_clauses}\n\
         RETURN n"
    );
    Ok((query, params))
}

/// `START n=… MATCH n -[:REL]-> related RETURN related` (or the incoming
/// mirror image).
pub fn traversal_query(
    resolver: &TypeResolver<'_>,
    rel_type_id: &str,
    direction: Direction,
    obj: &Object,
) -> Result<String> {
    let rel_pattern = match direction {
        Direction::Outgoing => format!("n -[:{}]-> related", rel_type_id.to_uppercase()),
        Direction::Incoming => format!("n <-[:{}]- related", rel_type_id.to_uppercase()),
    };
    Ok(format!(
        "START {} MATCH {rel_pattern} RETURN related",
        start_clause(resolver, obj, "n")?
    ))
}

/// The delete statement for an object: edge by its endpoints, class with
/// its attribute nodes, instance with its incident edges.
pub fn delete_query(resolver: &TypeResolver<'_>, obj: &Object) -> Result<String> {
    match obj {
        Object::Rel(rel) => {
            let start = rel.start.as_deref().ok_or_else(|| {
                Error::Configuration(format!("relationship {:?} has no start object", rel.type_id()))
            })?;
            let end = rel.end.as_deref().ok_or_else(|| {
                Error::Configuration(format!("relationship {:?} has no end object", rel.type_id()))
            })?;
            Ok(format!(
                "START {}, {}\nMATCH n1 -[rel]-> n2\nDELETE rel",
                start_clause(resolver, start, "n1")?,
                start_clause(resolver, end, "n2")?,
            ))
        }
        Object::Class(_) => Ok(format!(
            "START {}\nMATCH attr -[:DECLAREDON]-> obj\nDELETE attr\nMATCH obj -[rel]- ()\nDELETE obj, rel",
            start_clause(resolver, obj, "obj")?
        )),
        Object::Instance(_) => Ok(format!(
            "START {}\nMATCH obj -[rel]- ()\nDELETE obj, rel",
            start_clause(resolver, obj, "obj")?
        )),
        Object::Attr(spec) => Err(Error::CannotPersist(spec.kind.type_id())),
    }
}
