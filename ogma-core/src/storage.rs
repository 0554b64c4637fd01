//! The storage engine: orchestrates the registry, the serializer and the
//! query builder against a graph client.

use std::sync::Arc;

use crate::attribute::AttributeDef;
use crate::builtins;
use crate::client::{Connect, CypherValue, GraphClient, Row};
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::logger::QueryLogger;
use crate::object::{Direction, Instance, Object};
use crate::options::StorageOptions;
use crate::query::{
    create_instance_query, create_relationship_query, create_types_query, delete_query,
    indexed_lookup_query, instance_lookup_query, traversal_query, update_query, IndexKind, Param,
    Params,
};
use crate::registry::{TypeDef, TypeRegistry, TypeResolver};
use crate::serialize::{get_changes, get_indexes, dict_to_object, object_to_dict, values_to_db};
use crate::value::{PropertyMap, PropertyValue, Value};

/// One converted value out of a returned row: a stored object, or a plain
/// primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Object(Object),
    Value(PropertyValue),
}

/// A queryable object store over a graph database.
///
/// The store can persist any object whose type is registered, either
/// statically or in this store's own dynamic namespace. `InstanceOf` and
/// `IsA` relationships mirroring the type hierarchy are generated
/// automatically when an object is persisted.
///
/// A store performs one client call at a time; concurrent stores against
/// the same database converge on the type hierarchy (the mirror query is
/// idempotent) but do not serialize instance writes against each other.
#[derive(Debug)]
pub struct Storage<C> {
    client: C,
    type_system: Instance,
    dynamic: TypeRegistry,
}

impl<C: GraphClient + Connect> Storage<C> {
    /// Connect a store through a connection URI.
    pub fn connect(uri: &str) -> Result<Self> {
        let options: StorageOptions = uri.parse()?;
        Ok(Storage::new(C::connect_with(&options)?))
    }
}

impl<C: GraphClient> Storage<C> {
    /// Wrap an already connected client.
    pub fn new(client: C) -> Self {
        Storage {
            client,
            type_system: Instance::new(builtins::TYPE_SYSTEM).with("id", "TypeSystem"),
            dynamic: TypeRegistry::new(),
        }
    }

    /// The TypeSystem root this store anchors the mirrored hierarchy on.
    pub fn type_system(&self) -> &Instance {
        &self.type_system
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn resolver(&self) -> TypeResolver<'_> {
        TypeResolver::with_dynamic(&self.dynamic)
    }

    /// Ensure the root index exists and persist the TypeSystem node.
    ///
    /// Must run once per database before instances can be looked up; safe
    /// to run again at any time.
    pub fn initialize(&mut self) -> Result<()> {
        let indexes = get_indexes(&self.resolver(), &Object::Instance(self.type_system.clone()))?;
        let (index_name, _, _) = indexes
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotIndexable(builtins::TYPE_SYSTEM.into()))?;
        self.client.get_or_create_index(IndexKind::Node, &index_name)?;

        let root = Object::Instance(self.type_system.clone());
        self.save(&root)?;
        Ok(())
    }

    /// Register a type visible to this store only.
    pub fn register_dynamic_type(&mut self, def: TypeDef) -> Result<Arc<TypeDescriptor>> {
        if self.dynamic.contains(def.type_id()) {
            return Err(Error::TypeAlreadyRegistered(def.type_id().clone()));
        }
        let descriptor = TypeDescriptor::derive(def, &|id| self.resolver().resolve(id))?;
        self.dynamic.register(descriptor)
    }

    /// Build an instance of a registered type, applying declared defaults.
    pub fn instantiate<N, V, I>(&self, type_id: &str, attrs: I) -> Result<Instance>
    where
        N: Into<UStr>,
        V: Into<Value>,
        I: IntoIterator<Item = (N, V)>,
    {
        self.resolver().instantiate(type_id, attrs)
    }

    fn execute(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut logger = QueryLogger::new(query);
        let rows = self.client.execute(query, params)?;
        logger.returned_rows(rows.len() as u64);
        logger.finish();
        Ok(rows)
    }

    fn convert_node(&self, properties: &PropertyMap) -> Result<Object> {
        dict_to_object(&self.resolver(), properties)
    }

    /// Convert a driver value to a stored object or a plain primitive.
    fn convert_value(&self, value: CypherValue) -> Result<RowValue> {
        match value {
            CypherValue::Node(node) => Ok(RowValue::Object(self.convert_node(&node.properties)?)),
            CypherValue::Rel(rel) => {
                match self.convert_node(&rel.properties)? {
                    Object::Rel(mut converted) => {
                        converted.start = Some(Box::new(self.convert_node(&rel.start.properties)?));
                        converted.end = Some(Box::new(self.convert_node(&rel.end.properties)?));
                        Ok(RowValue::Object(Object::Rel(converted)))
                    }
                    other => Ok(RowValue::Object(other)),
                }
            }
            CypherValue::Scalar(value) => Ok(RowValue::Value(value)),
        }
    }

    fn convert_object(&self, value: CypherValue) -> Result<Object> {
        match self.convert_value(value)? {
            RowValue::Object(obj) => Ok(obj),
            RowValue::Value(value) => Err(Error::client(format!(
                "expected a node or relationship, the driver returned {value:?}"
            ))),
        }
    }

    fn single_value(rows: Vec<Row>) -> Result<CypherValue> {
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| Error::client("query returned no rows"))
    }

    /// Add a node or edge to every index its object belongs in.
    fn index_object(&mut self, obj: &Object, target: &CypherValue) -> Result<()> {
        let entries = get_indexes(&self.resolver(), obj)?;
        let kind = match obj {
            Object::Rel(_) => IndexKind::Relationship,
            _ => IndexKind::Node,
        };
        let Some(id) = target.graph_id() else { return Ok(()) };
        for (index_name, key, value) in entries {
            self.client.get_or_create_index(kind, &index_name)?;
            self.client.add_to_index(kind, &index_name, &key, &value, id)?;
        }
        Ok(())
    }

    /// Idempotently mirror a type hierarchy into the graph and index the
    /// class nodes.
    fn add_types(&mut self, type_id: &str) -> Result<()> {
        let (query, classes, params) =
            create_types_query(&self.resolver(), type_id, &self.type_system)?;
        let rows = self.execute(&query, &params)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::client("create-types query returned no rows"))?;

        // make sure the instance indexes exist before any instance of
        // these types is stored or looked up
        for class_id in &classes {
            let descriptor = self.resolver().resolve(class_id)?;
            let mut index_names: Vec<UStr> = Vec::new();
            for spec in descriptor.unique_attributes() {
                if !index_names.contains(&spec.declared_on) {
                    index_names.push(spec.declared_on.clone());
                }
            }
            for name in index_names {
                self.client.get_or_create_index(IndexKind::Node, &name)?;
            }
        }

        for (class_id, value) in classes.iter().zip(row) {
            self.index_object(&Object::Class(class_id.clone()), &value)?;
        }
        Ok(())
    }

    fn check_persistable(&self, obj: &Object) -> Result<()> {
        let resolver = self.resolver();
        match obj {
            Object::Class(type_id) => {
                resolver.resolve(type_id)?;
                Ok(())
            }
            Object::Instance(instance) => {
                let descriptor = resolver.resolve(instance.type_id())?;
                if descriptor.has_ancestor(builtins::ATTRIBUTED_BASE) {
                    Ok(())
                } else {
                    Err(Error::CannotPersist(instance.type_id().clone()))
                }
            }
            Object::Rel(rel) => {
                let descriptor = resolver.resolve(rel.type_id())?;
                if descriptor.has_ancestor(builtins::RELATIONSHIP) {
                    Ok(())
                } else {
                    Err(Error::CannotPersist(rel.type_id().clone()))
                }
            }
            Object::Attr(spec) => Err(Error::CannotPersist(spec.kind.type_id())),
        }
    }

    /// Insert an object that is known to be absent.
    fn add(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Class(type_id) => {
                let type_id = type_id.clone();
                self.add_types(&type_id)?;
                Ok(obj.clone())
            }

            // the TypeSystem root is the one node created without a type
            // hierarchy behind it
            Object::Instance(instance) if instance.type_id().as_str() == builtins::TYPE_SYSTEM => {
                let mut params = Params::new();
                params.insert(
                    "props".into(),
                    Param::Map(object_to_dict(&self.resolver(), obj)?),
                );
                let rows = self.execute("CREATE (n {props}) RETURN n", &params)?;
                let value = Self::single_value(rows)?;
                self.index_object(obj, &value)?;
                Ok(obj.clone())
            }

            Object::Rel(rel) => {
                let type_id = rel.type_id().clone();
                self.add_types(&type_id)?;
                let (query, params) = create_relationship_query(&self.resolver(), rel)?;
                let rows = self.execute(&query, &params)?;
                let value = Self::single_value(rows)?;
                self.index_object(obj, &value)?;
                Ok(obj.clone())
            }

            Object::Instance(instance) => {
                let type_id = instance.type_id().clone();
                self.add_types(&type_id)?;
                let (query, params) = create_instance_query(&self.resolver(), instance)?;
                let rows = self.execute(&query, &params)?;
                let value = Self::single_value(rows)?;
                self.index_object(obj, &value)?;
                Ok(obj.clone())
            }

            Object::Attr(spec) => Err(Error::CannotPersist(spec.kind.type_id())),
        }
    }

    /// Store an object.
    ///
    /// If a matching object (by unique keys) already exists, the stored
    /// node is updated field-by-field instead; an identical object is a
    /// no-op. Changing an attribute that participates in a unique index is
    /// refused.
    pub fn save(&mut self, obj: &Object) -> Result<Object> {
        self.check_persistable(obj)?;

        let existing = self.get_existing(obj)?;
        let Some(existing) = existing else {
            return self.add(obj);
        };

        let (query, params) = {
            let resolver = self.resolver();
            let existing_props = object_to_dict(&resolver, &existing)?;
            let props = object_to_dict(&resolver, obj)?;
            if existing_props == props {
                return Ok(existing);
            }

            let changes = get_changes(&existing_props, &props);
            for (_, key, _) in get_indexes(&resolver, &existing)? {
                if changes.contains_key(key.as_str()) {
                    return Err(Error::UniqueAttributeChangeNotSupported {
                        type_id: existing.type_id(),
                        attribute: key,
                    });
                }
            }

            update_query(&resolver, &existing, &changes)?
        };

        let rows = self.execute(&query, &params)?;
        let value = Self::single_value(rows)?;
        self.convert_object(value)
    }

    /// Look the stored counterpart of an object up by its unique keys.
    fn get_existing(&mut self, obj: &Object) -> Result<Option<Object>> {
        // The TypeSystem root has no InstanceOf edge, so the instance
        // lookup cannot reach it; it resolves through its own index. This
        // is what keeps `initialize` a no-op the second time around.
        if let Object::Instance(instance) = obj {
            if instance.type_id().as_str() == builtins::TYPE_SYSTEM {
                let entries = get_indexes(&self.resolver(), obj)?;
                let Some((index_name, key, value)) = entries.into_iter().next() else {
                    return Ok(None);
                };
                let node = self.client.get_indexed_node(&index_name, &key, &value)?;
                return node
                    .map(|node| self.convert_node(&node.properties))
                    .transpose();
            }
        }

        let filter: PropertyMap = get_indexes(&self.resolver(), obj)?
            .into_iter()
            .map(|(_, key, value)| (key.to_string(), value))
            .collect();
        let lookup_type = match obj {
            Object::Class(_) => UStr::from(builtins::PERSISTABLE_META),
            Object::Instance(instance) => instance.type_id().clone(),
            Object::Rel(rel) => rel.type_id().clone(),
            Object::Attr(spec) => return Err(Error::CannotPersist(spec.kind.type_id())),
        };
        self.get_encoded(&lookup_type, filter)
    }

    /// Retrieve one object by (any of) its unique attributes.
    ///
    /// Returns `None` for an empty filter and for no match. Multiple
    /// filter keys are OR-joined; all matches must be the same node or
    /// the lookup fails with a unique-constraint error.
    pub fn get(&mut self, type_id: &str, filter: &[(&str, Value)]) -> Result<Option<Object>> {
        let encoded = values_to_db(filter.iter().map(|(key, value)| (*key, value)));
        self.get_encoded(type_id, encoded)
    }

    fn get_encoded(&mut self, type_id: &str, filter: PropertyMap) -> Result<Option<Object>> {
        if filter.is_empty() {
            return Ok(None);
        }

        enum Plan {
            Indexed(IndexKind, String),
            Instance,
        }

        let plan = {
            let resolver = self.resolver();
            let descriptor = resolver.resolve(type_id)?;
            if descriptor.has_ancestor(builtins::PERSISTABLE_META) {
                Plan::Indexed(IndexKind::Node, type_id.to_owned())
            } else if descriptor.has_ancestor(builtins::RELATIONSHIP) {
                Plan::Indexed(IndexKind::Relationship, type_id.to_owned())
            } else {
                Plan::Instance
            }
        };

        let (query, params) = match plan {
            Plan::Indexed(kind, index_name) => {
                self.client.get_or_create_index(kind, &index_name)?;
                let (key, value) = filter
                    .into_iter()
                    .next()
                    .expect("filter was checked to be non-empty");
                let query = indexed_lookup_query(kind, &index_name, &key);
                let mut params = Params::new();
                params.insert("idx_value".into(), Param::Value(value));
                (query, params)
            }
            Plan::Instance => {
                instance_lookup_query(&self.resolver(), &self.type_system, &filter)?
            }
        };

        let rows = self.execute(&query, &params)?;
        let mut found: Vec<CypherValue> = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        if found.is_empty() {
            return Ok(None);
        }

        // all returned values must resolve to the same node
        let first_id = found[0].graph_id();
        if found.iter().any(|value| value.graph_id() != first_id) {
            return Err(Error::UniqueConstraint { type_id: UStr::new(type_id) });
        }

        self.convert_object(found.swap_remove(0)).map(Some)
    }

    /// Traverse relationships of `rel_type_id` away from (or towards)
    /// `obj`, converting each related object lazily.
    pub fn get_related_objects(
        &mut self,
        rel_type_id: &str,
        direction: Direction,
        obj: &Object,
    ) -> Result<impl Iterator<Item = Result<Object>> + '_> {
        let query = traversal_query(&self.resolver(), rel_type_id, direction, obj)?;
        let rows = self.execute(&query, &Params::new())?;
        let this = &*self;
        Ok(rows.into_iter().map(move |row| {
            let value = row
                .into_iter()
                .next()
                .ok_or_else(|| Error::client("traversal returned an empty row"))?;
            this.convert_object(value)
        }))
    }

    /// Resolve an `Outgoing`/`Incoming` attribute of `obj` to its
    /// traversal.
    pub fn follow(
        &mut self,
        obj: &Object,
        attr_name: &str,
    ) -> Result<impl Iterator<Item = Result<Object>> + '_> {
        let (rel_type_id, direction) = {
            let resolver = self.resolver();
            let descriptor = resolver.resolve(&obj.type_id())?;
            let spec = descriptor.attribute(attr_name).ok_or_else(|| {
                Error::Configuration(format!(
                    "{:?} declares no attribute {attr_name:?}",
                    obj.type_id()
                ))
            })?;
            match &spec.kind {
                crate::attribute::AttributeKind::Outgoing(rel) => {
                    (rel.clone(), Direction::Outgoing)
                }
                crate::attribute::AttributeKind::Incoming(rel) => {
                    (rel.clone(), Direction::Incoming)
                }
                _ => {
                    return Err(Error::Configuration(format!(
                        "attribute {attr_name:?} of {:?} is not a traversal",
                        obj.type_id()
                    )))
                }
            }
        };
        self.get_related_objects(&rel_type_id, direction, obj)
    }

    /// Delete an object from the store.
    ///
    /// Stale index entries are left behind, matching the original
    /// implementation; the node or edge itself is gone.
    pub fn delete(&mut self, obj: &Object) -> Result<()> {
        let query = delete_query(&self.resolver(), obj)?;
        self.execute(&query, &Params::new())?;
        Ok(())
    }

    /// Run a raw parameterized Cypher query, converting returned nodes and
    /// edges to objects lazily.
    pub fn query(
        &mut self,
        cypher: &str,
        params: &[(&str, Value)],
    ) -> Result<impl Iterator<Item = Result<Vec<RowValue>>> + '_> {
        let encoded: Params = params
            .iter()
            .map(|(key, value)| ((*key).to_owned(), Param::Value(value.to_db())))
            .collect();
        let rows = self.execute(cypher, &encoded)?;
        let this = &*self;
        Ok(rows.into_iter().map(move |row| {
            row.into_iter().map(|value| this.convert_value(value)).collect()
        }))
    }

    /// Remove every node, every edge and every known index.
    pub fn delete_all_data(&mut self) -> Result<()> {
        self.client.clear()?;
        for kind in [IndexKind::Node, IndexKind::Relationship] {
            for name in self.client.get_indexes(kind)? {
                self.client.delete_index(kind, &name)?;
            }
        }
        Ok(())
    }
}

/// Register a type on a particular store, invisible to other stores.
pub fn register_dynamic_type<C: GraphClient>(
    store: &mut Storage<C>,
    type_id: &str,
    bases: &[&str],
    attrs: Vec<(&str, AttributeDef)>,
) -> Result<Arc<TypeDescriptor>> {
    let mut def = TypeDef::new(UStr::new(type_id));
    for base in bases {
        def = def.base(UStr::new(base));
    }
    for (name, attr) in attrs {
        def = def.attribute(UStr::new(name), attr);
    }
    store.register_dynamic_type(def)
}
