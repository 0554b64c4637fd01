//! The serialization protocol: objects to property dicts and back, the
//! type-relationship stream, and change detection.

use std::collections::HashSet;

use crate::attribute::{AttributeKind, AttributeSpec};
use crate::builtins;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::object::{Instance, Object, Relationship};
use crate::registry::TypeResolver;
use crate::value::{PropertyMap, PropertyValue, Value};

/// The two relationship kinds appearing in the type-relationship stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelKind {
    IsA,
    InstanceOf,
}

impl RelKind {
    pub fn type_id(self) -> &'static str {
        match self {
            RelKind::IsA => builtins::IS_A,
            RelKind::InstanceOf => builtins::INSTANCE_OF,
        }
    }
}

/// The source of a triple: a class, or the object the stream was derived
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TripleRef {
    Class(UStr),
    This,
}

/// One `(src, rel, dst)` triple mirroring the metamodel into the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub src: TripleRef,
    pub rel: RelKind,
    pub dst: UStr,
}

/// The type-relationship stream for an object, deduplicated, in
/// depth-first base order.
///
/// For a class: for each direct base, the transitive triples of the base
/// followed by `(class, IsA, base)`; finally `(class, InstanceOf,
/// PersistableMeta)`. The meta-type itself is the root of the native
/// lattice and gets no `InstanceOf` triple. For an instance or
/// relationship value: the triples of its type, then `(obj, InstanceOf,
/// type)`.
pub fn type_relationships(resolver: &TypeResolver<'_>, obj: &Object) -> Result<Vec<Triple>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    match obj {
        Object::Class(type_id) => {
            class_triples(resolver, type_id, &mut seen, &mut out)?;
        }
        Object::Instance(instance) => {
            class_triples(resolver, instance.type_id(), &mut seen, &mut out)?;
            out.push(Triple {
                src: TripleRef::This,
                rel: RelKind::InstanceOf,
                dst: instance.type_id().clone(),
            });
        }
        Object::Rel(rel) => {
            class_triples(resolver, rel.type_id(), &mut seen, &mut out)?;
            out.push(Triple {
                src: TripleRef::This,
                rel: RelKind::InstanceOf,
                dst: rel.type_id().clone(),
            });
        }
        Object::Attr(spec) => {
            return Err(Error::CannotPersist(spec.kind.type_id()));
        }
    }

    Ok(out)
}

/// The class-only stream, as consumed by the create-types query.
pub fn class_relationships(resolver: &TypeResolver<'_>, type_id: &str) -> Result<Vec<Triple>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    class_triples(resolver, &UStr::new(type_id), &mut seen, &mut out)?;
    Ok(out)
}

fn class_triples(
    resolver: &TypeResolver<'_>,
    type_id: &UStr,
    seen: &mut HashSet<(UStr, RelKind, UStr)>,
    out: &mut Vec<Triple>,
) -> Result<()> {
    let descriptor = resolver.resolve(type_id)?;

    for base in descriptor.bases() {
        class_triples(resolver, base, seen, out)?;
        push_unique(seen, out, type_id.clone(), RelKind::IsA, base.clone());
    }

    if *type_id != builtins::PERSISTABLE_META {
        push_unique(
            seen,
            out,
            type_id.clone(),
            RelKind::InstanceOf,
            builtins::PERSISTABLE_META.into(),
        );
    }

    Ok(())
}

fn push_unique(
    seen: &mut HashSet<(UStr, RelKind, UStr)>,
    out: &mut Vec<Triple>,
    src: UStr,
    rel: RelKind,
    dst: UStr,
) {
    if seen.insert((src.clone(), rel, dst.clone())) {
        out.push(Triple { src: TripleRef::Class(src), rel, dst });
    }
}

/// Serialize any persistable object to its stored property dict.
pub fn object_to_dict(resolver: &TypeResolver<'_>, obj: &Object) -> Result<PropertyMap> {
    let mut props = PropertyMap::new();

    match obj {
        Object::Class(type_id) => {
            props.insert(builtins::TYPE_KEY.into(), builtins::PERSISTABLE_META.into());
            props.insert("id".into(), PropertyValue::Str(type_id.to_string()));
        }

        Object::Attr(spec) => {
            props.insert(builtins::TYPE_KEY.into(), PropertyValue::Str(spec.kind.type_id().to_string()));
            props.insert("name".into(), PropertyValue::Str(spec.name.to_string()));
            if spec.unique {
                props.insert("unique".into(), PropertyValue::Bool(true));
            }
            if let Some(default) = &spec.default {
                let stored = spec.kind.to_db(default)?;
                if !stored.is_null() {
                    props.insert("default".into(), stored);
                }
            }
        }

        Object::Instance(instance) => {
            let descriptor = resolver.resolve(instance.type_id())?;
            props.insert(builtins::TYPE_KEY.into(), PropertyValue::Str(instance.type_id().to_string()));
            encode_attrs(&descriptor, |name| instance.get(name), &mut props)?;
        }

        Object::Rel(rel) => {
            let descriptor = resolver.resolve(rel.type_id())?;
            props.insert(builtins::TYPE_KEY.into(), PropertyValue::Str(rel.type_id().to_string()));
            encode_attrs(&descriptor, |name| rel.get(name), &mut props)?;
        }
    }

    Ok(props)
}

fn encode_attrs<'v>(
    descriptor: &TypeDescriptor,
    get: impl Fn(&str) -> Option<&'v Value>,
    props: &mut PropertyMap,
) -> Result<()> {
    for (name, spec) in descriptor.attributes() {
        if !spec.kind.is_stored() {
            continue;
        }
        if let Some(value) = get(name) {
            let stored = spec.kind.to_db(value)?;
            if !stored.is_null() {
                props.insert(name.to_string(), stored);
            }
        }
    }
    Ok(())
}

/// Deserialize a stored property dict back into an object.
pub fn dict_to_object(resolver: &TypeResolver<'_>, props: &PropertyMap) -> Result<Object> {
    let type_id = props
        .get(builtins::TYPE_KEY)
        .ok_or_else(|| Error::Deserialisation("property dict has no __type__".into()))?;
    let type_id = type_id
        .as_str()
        .ok_or_else(|| Error::Deserialisation(format!("__type__ is not a string: {type_id:?}")))?;

    if type_id == builtins::PERSISTABLE_META {
        let id = props
            .get("id")
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| Error::Deserialisation("class dict has no id".into()))?;
        resolver.resolve(id)?;
        return Ok(Object::Class(UStr::new(id)));
    }

    let descriptor = resolver.resolve(type_id)?;

    if descriptor.has_ancestor(builtins::ATTRIBUTE) {
        return attr_from_dict(&descriptor, props);
    }

    if descriptor.has_ancestor(builtins::RELATIONSHIP) {
        let mut rel = Relationship::detached(descriptor.type_id().clone());
        decode_attrs(&descriptor, props, |name, value| {
            rel.set(name, value);
        })?;
        return Ok(Object::Rel(rel));
    }

    let mut instance = Instance::new(descriptor.type_id().clone());
    decode_attrs(&descriptor, props, |name, value| {
        instance.set(name, value);
    })?;
    Ok(Object::Instance(instance))
}

fn decode_attrs(
    descriptor: &TypeDescriptor,
    props: &PropertyMap,
    mut set: impl FnMut(UStr, Value),
) -> Result<()> {
    for (name, spec) in descriptor.attributes() {
        if !spec.kind.is_stored() {
            continue;
        }
        match props.get(name.as_str()) {
            Some(stored) => set(name.clone(), spec.kind.from_db(stored)?),
            None => {
                if let Some(default) = &spec.default {
                    set(name.clone(), default.clone());
                }
            }
        }
    }
    Ok(())
}

/// Attribute nodes deserialize by raw assignment of the stored fields.
fn attr_from_dict(descriptor: &TypeDescriptor, props: &PropertyMap) -> Result<Object> {
    let kind = kind_for_descriptor(descriptor)?;

    let name = props
        .get("name")
        .and_then(PropertyValue::as_str)
        .map(UStr::new)
        .unwrap_or(UStr::Static(""));
    let unique = matches!(props.get("unique"), Some(PropertyValue::Bool(true)));
    let default = props.get("default").map(PropertyValue::to_value);

    Ok(Object::Attr(AttributeSpec {
        name,
        kind,
        unique,
        default,
        declared_on: UStr::Static(""),
    }))
}

/// Map a registered attribute-kind type back onto its [`AttributeKind`]:
/// either a built-in kind, or a custom kind over the nearest built-in
/// primitive in its ancestor chain.
fn kind_for_descriptor(descriptor: &TypeDescriptor) -> Result<AttributeKind> {
    fn builtin(id: &str) -> Option<AttributeKind> {
        match id {
            builtins::STRING => Some(AttributeKind::Str),
            builtins::INTEGER => Some(AttributeKind::Int),
            builtins::BOOL => Some(AttributeKind::Bool),
            builtins::UUID => Some(AttributeKind::Uuid),
            builtins::DATE_TIME => Some(AttributeKind::DateTime),
            _ => None,
        }
    }

    if let Some(kind) = builtin(descriptor.type_id()) {
        return Ok(kind);
    }
    for ancestor in descriptor.lineage().iter().skip(1) {
        if let Some(base) = builtin(ancestor) {
            return AttributeKind::custom(descriptor.type_id().clone(), base);
        }
    }
    Err(Error::Deserialisation(format!(
        "{:?} is not a storable attribute kind",
        descriptor.type_id()
    )))
}

/// The keys on which `new` differs from `old`; a key missing from `new`
/// maps to `Null`, signaling removal of the stored field.
pub fn get_changes(old: &PropertyMap, new: &PropertyMap) -> PropertyMap {
    let mut changes = PropertyMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                changes.insert(key.clone(), PropertyValue::Null);
            }
            Some(new_value) if new_value != old_value => {
                changes.insert(key.clone(), new_value.clone());
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            changes.insert(key.clone(), new_value.clone());
        }
    }
    changes
}

/// Encode a filter or parameter map to stored primitives, without any
/// declared kind in play.
pub fn values_to_db<'v>(values: impl IntoIterator<Item = (&'v str, &'v Value)>) -> PropertyMap {
    values
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_db()))
        .collect()
}

/// The `(index_name, key, value)` triples under which an object is
/// indexed.
///
/// Class objects are indexed under the meta-type's name by their id;
/// instances and relationships under the declaring type of each unique
/// attribute that has a value.
pub fn get_indexes(
    resolver: &TypeResolver<'_>,
    obj: &Object,
) -> Result<Vec<(UStr, UStr, PropertyValue)>> {
    match obj {
        Object::Class(type_id) => Ok(vec![(
            builtins::PERSISTABLE_META.into(),
            "id".into(),
            PropertyValue::Str(type_id.to_string()),
        )]),
        Object::Instance(instance) => {
            let descriptor = resolver.resolve(instance.type_id())?;
            unique_index_entries(&descriptor, |name| instance.get(name))
        }
        Object::Rel(rel) => {
            let descriptor = resolver.resolve(rel.type_id())?;
            unique_index_entries(&descriptor, |name| rel.get(name))
        }
        Object::Attr(_) => Ok(Vec::new()),
    }
}

fn unique_index_entries<'v>(
    descriptor: &TypeDescriptor,
    get: impl Fn(&str) -> Option<&'v Value>,
) -> Result<Vec<(UStr, UStr, PropertyValue)>> {
    let mut entries = Vec::new();
    for spec in descriptor.unique_attributes() {
        if let Some(value) = get(&spec.name) {
            let stored = spec.kind.to_db(value)?;
            if !stored.is_null() {
                entries.push((spec.declared_on.clone(), spec.name.clone(), stored));
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDef;
    use crate::registry::{TypeDef, TypeRegistry};

    fn dynamic_with_person() -> TypeRegistry {
        let mut dynamic = TypeRegistry::new();
        // a self-contained namespace: builtins plus one user type
        crate::builtins::seed(&mut dynamic);
        dynamic
            .register_def(
                TypeDef::new("Person")
                    .base("Entity")
                    .attribute("id", AttributeDef::new(AttributeKind::Str).unique())
                    .attribute("name", AttributeDef::new(AttributeKind::Str)),
            )
            .unwrap();
        dynamic
    }

    #[test]
    fn classes_round_trip_as_meta_dicts() {
        let resolver = TypeResolver::static_only();

        let dict = object_to_dict(&resolver, &Object::Class("Entity".into())).unwrap();
        let mut expected = PropertyMap::new();
        expected.insert("__type__".into(), "PersistableMeta".into());
        expected.insert("id".into(), "Entity".into());
        assert_eq!(dict, expected);

        let back = dict_to_object(&resolver, &dict).unwrap();
        assert_eq!(back, Object::Class("Entity".into()));
    }

    #[test]
    fn instances_carry_type_and_set_attributes_only() {
        let dynamic = dynamic_with_person();
        let resolver = TypeResolver::with_dynamic(&dynamic);

        let person = resolver.instantiate("Person", [("id", Value::from("alice"))]).unwrap();
        let dict = object_to_dict(&resolver, &Object::Instance(person.clone())).unwrap();

        let mut expected = PropertyMap::new();
        expected.insert("__type__".into(), "Person".into());
        expected.insert("id".into(), "alice".into());
        assert_eq!(dict, expected);

        let back = dict_to_object(&resolver, &dict).unwrap();
        assert_eq!(back, Object::Instance(person));
    }

    #[test]
    fn relationship_values_serialize_like_instances() {
        let resolver = TypeResolver::static_only();
        let rel = Relationship::detached(builtins::INSTANCE_OF);
        let dict = object_to_dict(&resolver, &Object::Rel(rel)).unwrap();

        let mut expected = PropertyMap::new();
        expected.insert("__type__".into(), "InstanceOf".into());
        assert_eq!(dict, expected);
    }

    #[test]
    fn attribute_specs_serialize_their_non_neutral_fields() {
        let resolver = TypeResolver::static_only();
        let spec = AttributeSpec {
            name: "id".into(),
            kind: AttributeKind::Str,
            unique: true,
            default: None,
            declared_on: "Person".into(),
        };
        let dict = object_to_dict(&resolver, &Object::Attr(spec)).unwrap();

        let mut expected = PropertyMap::new();
        expected.insert("__type__".into(), "String".into());
        expected.insert("name".into(), "id".into());
        expected.insert("unique".into(), PropertyValue::Bool(true));
        assert_eq!(dict, expected);

        let back = dict_to_object(&resolver, &dict).unwrap();
        match back {
            Object::Attr(spec) => {
                assert_eq!(spec.name, "id");
                assert!(spec.unique);
                assert_eq!(spec.kind, AttributeKind::Str);
            }
            other => panic!("expected an attribute spec, got {other:?}"),
        }
    }

    #[test]
    fn missing_type_key_is_a_deserialisation_error() {
        let resolver = TypeResolver::static_only();
        let err = dict_to_object(&resolver, &PropertyMap::new()).unwrap_err();
        assert!(matches!(err, Error::Deserialisation(_)));
    }

    #[test]
    fn dynamic_classes_resolve_in_their_namespace_only() {
        let mut dynamic = TypeRegistry::new();
        crate::builtins::seed(&mut dynamic);
        dynamic.register_def(TypeDef::new("Foobar").base("Entity")).unwrap();

        let resolver = TypeResolver::with_dynamic(&dynamic);
        let dict = object_to_dict(&resolver, &Object::Class("Foobar".into())).unwrap();

        let mut expected = PropertyMap::new();
        expected.insert("__type__".into(), "PersistableMeta".into());
        expected.insert("id".into(), "Foobar".into());
        assert_eq!(dict, expected);

        // Unknown in the static namespace...
        let err = dict_to_object(&TypeResolver::static_only(), &dict).unwrap_err();
        assert!(matches!(err, Error::UnknownType(id) if id == "Foobar"));

        // ...but resolvable through the dynamic one.
        let back = dict_to_object(&resolver, &dict).unwrap();
        assert_eq!(back, Object::Class("Foobar".into()));
    }

    #[test]
    fn type_relationship_stream_is_ordered_and_unique() {
        let dynamic = dynamic_with_person();
        let resolver = TypeResolver::with_dynamic(&dynamic);

        let triples = class_relationships(&resolver, "Person").unwrap();
        let rendered: Vec<(String, &str, String)> = triples
            .iter()
            .map(|t| {
                let src = match &t.src {
                    TripleRef::Class(id) => id.to_string(),
                    TripleRef::This => "<this>".into(),
                };
                (src, t.rel.type_id(), t.dst.to_string())
            })
            .collect();

        assert_eq!(
            rendered,
            [
                ("Persistable".to_string(), "InstanceOf", "PersistableMeta".to_string()),
                ("AttributedBase".to_string(), "IsA", "Persistable".to_string()),
                ("AttributedBase".to_string(), "InstanceOf", "PersistableMeta".to_string()),
                ("Entity".to_string(), "IsA", "AttributedBase".to_string()),
                ("Entity".to_string(), "InstanceOf", "PersistableMeta".to_string()),
                ("Person".to_string(), "IsA", "Entity".to_string()),
                ("Person".to_string(), "InstanceOf", "PersistableMeta".to_string()),
            ]
        );

        // the instance stream appends exactly one InstanceOf triple
        let person = resolver.instantiate("Person", [("id", Value::from("a"))]).unwrap();
        let triples = type_relationships(&resolver, &Object::Instance(person)).unwrap();
        let last = triples.last().unwrap();
        assert_eq!(last.src, TripleRef::This);
        assert_eq!(last.rel, RelKind::InstanceOf);
        assert_eq!(last.dst, "Person");
        let class_only = triples.iter().filter(|t| t.src == TripleRef::This).count();
        assert_eq!(class_only, 1);
    }

    #[test]
    fn diamond_hierarchies_emit_no_duplicate_triples() {
        let mut dynamic = TypeRegistry::new();
        crate::builtins::seed(&mut dynamic);
        dynamic.register_def(TypeDef::new("A").base("Entity")).unwrap();
        dynamic.register_def(TypeDef::new("B").base("A")).unwrap();
        dynamic.register_def(TypeDef::new("C").base("A")).unwrap();
        dynamic.register_def(TypeDef::new("D").base("B").base("C")).unwrap();

        let resolver = TypeResolver::with_dynamic(&dynamic);
        let triples = class_relationships(&resolver, "D").unwrap();

        let mut seen = HashSet::new();
        for triple in &triples {
            assert!(seen.insert((triple.src.clone(), triple.rel, triple.dst.clone())));
        }
        // every ancestor is reachable through an IsA triple
        for ancestor in ["A", "B", "C", "Entity", "AttributedBase", "Persistable"] {
            assert!(
                triples.iter().any(|t| t.rel == RelKind::IsA && t.dst == *ancestor),
                "no IsA triple pointing at {ancestor}"
            );
        }
    }

    #[test]
    fn changes_are_empty_for_identical_dicts() {
        let dynamic = dynamic_with_person();
        let resolver = TypeResolver::with_dynamic(&dynamic);
        let person = resolver.instantiate("Person", [("id", Value::from("a"))]).unwrap();
        let dict = object_to_dict(&resolver, &Object::Instance(person)).unwrap();
        assert!(get_changes(&dict, &dict).is_empty());
    }

    #[test]
    fn changes_track_updates_removals_and_additions() {
        let mut old = PropertyMap::new();
        old.insert("a".into(), PropertyValue::Int(1));
        old.insert("b".into(), PropertyValue::Str("x".into()));

        let mut new = PropertyMap::new();
        new.insert("a".into(), PropertyValue::Int(2));
        new.insert("c".into(), PropertyValue::Bool(true));

        let changes = get_changes(&old, &new);
        assert_eq!(changes.get("a"), Some(&PropertyValue::Int(2)));
        assert_eq!(changes.get("b"), Some(&PropertyValue::Null));
        assert_eq!(changes.get("c"), Some(&PropertyValue::Bool(true)));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn index_entries_name_the_declaring_type() {
        let mut dynamic = dynamic_with_person();
        dynamic.register_def(TypeDef::new("Employee").base("Person")).unwrap();
        let resolver = TypeResolver::with_dynamic(&dynamic);

        let employee = resolver.instantiate("Employee", [("id", Value::from("e1"))]).unwrap();
        let indexes = get_indexes(&resolver, &Object::Instance(employee)).unwrap();
        assert_eq!(
            indexes,
            vec![("Person".into(), "id".into(), PropertyValue::Str("e1".into()))]
        );
    }
}
