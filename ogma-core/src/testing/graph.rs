//! An in-memory graph client.
//!
//! `MemoryGraph` implements [`GraphClient`] over a plain property graph
//! held in maps, interpreting the fixed query shapes the query builder
//! emits. It exists so the whole storage engine can be exercised without a
//! running database; it is not a Cypher engine.

use indexmap::IndexMap;

use crate::client::{Connect, CypherValue, GraphClient, GraphId, GraphNode, GraphRel, Row};
use crate::error::{Error, Result};
use crate::options::StorageOptions;
use crate::query::{IndexKind, Param, Params};
use crate::value::{PropertyMap, PropertyValue};

#[derive(Debug, Clone)]
struct StoredRel {
    rel_type: String,
    start: u64,
    end: u64,
    properties: PropertyMap,
}

/// Index entries: `(key, canonical value)` to ids, in insertion order.
type IndexEntries = IndexMap<(String, String), Vec<u64>>;

/// The in-memory graph client.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    next_id: u64,
    nodes: IndexMap<u64, PropertyMap>,
    rels: IndexMap<u64, StoredRel>,
    node_indexes: IndexMap<String, IndexEntries>,
    rel_indexes: IndexMap<String, IndexEntries>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        MemoryGraph::default()
    }

    // ---- introspection for tests ----

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.rels.len()
    }

    /// All nodes whose properties satisfy `pred`.
    pub fn find_nodes(&self, pred: impl Fn(&PropertyMap) -> bool) -> Vec<GraphNode> {
        self.nodes
            .iter()
            .filter(|(_, props)| pred(props))
            .map(|(id, props)| GraphNode { id: GraphId(*id), properties: props.clone() })
            .collect()
    }

    /// All `(start, end)` node pairs connected by an edge of `rel_type`.
    pub fn edges_of_type(&self, rel_type: &str) -> Vec<(GraphNode, GraphNode)> {
        self.rels
            .values()
            .filter(|rel| rel.rel_type == rel_type)
            .map(|rel| (self.node_value(rel.start), self.node_value(rel.end)))
            .collect()
    }

    // ---- graph primitives ----

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create_node(&mut self, properties: PropertyMap) -> u64 {
        let id = self.fresh_id();
        self.nodes.insert(id, properties);
        id
    }

    fn create_rel(&mut self, rel_type: &str, start: u64, end: u64, properties: PropertyMap) -> u64 {
        let id = self.fresh_id();
        self.rels.insert(
            id,
            StoredRel { rel_type: rel_type.to_owned(), start, end, properties },
        );
        id
    }

    fn node_value(&self, id: u64) -> GraphNode {
        GraphNode {
            id: GraphId(id),
            properties: self.nodes.get(&id).cloned().unwrap_or_default(),
        }
    }

    fn rel_value(&self, id: u64) -> CypherValue {
        let rel = &self.rels[&id];
        CypherValue::Rel(GraphRel {
            id: GraphId(id),
            rel_type: rel.rel_type.clone(),
            start: self.node_value(rel.start),
            end: self.node_value(rel.end),
            properties: rel.properties.clone(),
        })
    }

    fn find_node_by_props(&self, properties: &PropertyMap) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, props)| *props == properties)
            .map(|(id, _)| *id)
    }

    fn find_rel(&self, rel_type: &str, start: u64, end: u64) -> Option<u64> {
        self.rels
            .iter()
            .find(|(_, rel)| rel.rel_type == rel_type && rel.start == start && rel.end == end)
            .map(|(id, _)| *id)
    }

    fn remove_node(&mut self, id: u64) {
        self.nodes.shift_remove(&id);
        self.rels.retain(|_, rel| rel.start != id && rel.end != id);
    }

    fn indexes(&mut self, kind: IndexKind) -> &mut IndexMap<String, IndexEntries> {
        match kind {
            IndexKind::Node => &mut self.node_indexes,
            IndexKind::Relationship => &mut self.rel_indexes,
        }
    }

    fn index_lookup(&self, kind: IndexKind, name: &str, key: &str, value: &str) -> Vec<u64> {
        let indexes = match kind {
            IndexKind::Node => &self.node_indexes,
            IndexKind::Relationship => &self.rel_indexes,
        };
        let Some(entries) = indexes.get(name) else { return Vec::new() };
        let Some(ids) = entries.get(&(key.to_owned(), value.to_owned())) else {
            return Vec::new();
        };
        // stale entries may point at deleted items
        ids.iter()
            .copied()
            .filter(|id| match kind {
                IndexKind::Node => self.nodes.contains_key(id),
                IndexKind::Relationship => self.rels.contains_key(id),
            })
            .collect()
    }

    // ---- statement execution ----

    fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let lines: Vec<&str> = query
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if lines.len() == 1 {
            return self.run_single_line(lines[0], params);
        }

        let start_clauses = parse_start_line(lines[0])?;
        match lines[1] {
            "CREATE UNIQUE" => {
                let last = lines.len() - 1;
                let patterns = &lines[2..last];
                let return_names = parse_return(lines[last])?;
                self.exec_create_unique(&start_clauses, patterns, &return_names, params)
            }
            line if line.starts_with("SET ") => {
                self.exec_update(&start_clauses, &line["SET ".len()..], params)
            }
            "MATCH n -[:INSTANCEOF]-> () -[:ISA*]-> () <-[:DEFINES]- root" => {
                let where_line = lines
                    .get(2)
                    .filter(|line| line.starts_with("WHERE "))
                    .ok_or_else(|| unsupported(query))?;
                self.exec_instance_lookup(&start_clauses, &where_line["WHERE ".len()..], params)
            }
            "MATCH n1 -[rel]-> n2" => self.exec_delete_rel(&start_clauses, params),
            "MATCH attr -[:DECLAREDON]-> obj" => self.exec_delete_class(&start_clauses, params),
            "MATCH obj -[rel]- ()" => self.exec_delete_node(&start_clauses, params),
            _ => Err(unsupported(query)),
        }
    }

    fn run_single_line(&mut self, line: &str, params: &Params) -> Result<Vec<Row>> {
        if line.starts_with("CREATE (n {props}) RETURN n") {
            let props = param_map(params, "props")?;
            let id = self.create_node(props);
            return Ok(vec![vec![CypherValue::Node(self.node_value(id))]]);
        }

        if !line.starts_with("START ") {
            return Err(unsupported(line));
        }

        if let Some((start, rest)) = split_top_level(line, " CREATE ") {
            let clauses = parse_start_line(start)?;
            if rest.starts_with("(n {props}) -[:INSTANCEOF {rel_props}]-> cls") {
                return self.exec_create_instance(&clauses, params);
            }
            if rest.starts_with("n1 -[r:") {
                return self.exec_create_rel(&clauses, rest, params);
            }
            return Err(unsupported(line));
        }

        if let Some((start, rest)) = split_top_level(line, " MATCH ") {
            let clauses = parse_start_line(start)?;
            return self.exec_traversal(&clauses, rest, params);
        }

        if let Some((start, rest)) = split_top_level(line, " RETURN ") {
            let clauses = parse_start_line(start)?;
            return self.exec_indexed_return(&clauses, rest.trim(), params);
        }

        Err(unsupported(line))
    }

    /// Bind the first hit of every START clause; `None` if any clause has
    /// no hit.
    fn bind_first(
        &self,
        clauses: &[StartClause],
        params: &Params,
    ) -> Result<Option<IndexMap<String, u64>>> {
        let mut bound = IndexMap::new();
        for clause in clauses {
            let value = clause.value.resolve(params)?;
            let ids = self.index_lookup(clause.kind, &clause.index, &clause.key, &value);
            match ids.first() {
                Some(id) => {
                    bound.insert(clause.name.clone(), *id);
                }
                None => return Ok(None),
            }
        }
        Ok(Some(bound))
    }

    fn exec_create_unique(
        &mut self,
        start_clauses: &[StartClause],
        patterns: &[&str],
        return_names: &[String],
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(mut bound) = self.bind_first(start_clauses, params)? else {
            return Ok(Vec::new());
        };

        for pattern in patterns {
            let pattern = pattern.trim_end_matches(',');
            let (lhs, rel, rhs) = parse_pattern(pattern)?;
            let rel_props = param_map(params, &rel.param)?;

            // the destination resolves first so an anonymous source can be
            // matched relative to it
            let end = self.resolve_pattern_node(&rhs, &mut bound, params, None, &rel.rel_type)?;
            let start =
                self.resolve_pattern_node(&lhs, &mut bound, params, Some(end), &rel.rel_type)?;

            if self.find_rel(&rel.rel_type, start, end).is_none() {
                self.create_rel(&rel.rel_type, start, end, rel_props);
            }
        }

        let row = return_names
            .iter()
            .map(|name| {
                bound
                    .get(name)
                    .map(|id| CypherValue::Node(self.node_value(*id)))
                    .ok_or_else(|| Error::client(format!("unbound name {name:?} in RETURN")))
            })
            .collect::<Result<Row>>()?;
        Ok(vec![row])
    }

    /// Resolve one node of a pattern. Anonymous nodes match relative to the
    /// already-resolved destination of their edge, the way `CREATE UNIQUE`
    /// matches a node-and-edge pattern as a whole.
    fn resolve_pattern_node(
        &mut self,
        node: &PatternNode,
        bound: &mut IndexMap<String, u64>,
        params: &Params,
        edge_end: Option<u64>,
        rel_type: &str,
    ) -> Result<u64> {
        match node {
            PatternNode::Bound(name) => bound
                .get(name)
                .copied()
                .ok_or_else(|| Error::client(format!("unbound pattern name {name:?}"))),
            PatternNode::Named { name, param } => {
                if let Some(id) = bound.get(name) {
                    return Ok(*id);
                }
                let props = param_map(params, param)?;
                let id = self
                    .find_node_by_props(&props)
                    .unwrap_or_else(|| self.create_node(props));
                bound.insert(name.clone(), id);
                Ok(id)
            }
            PatternNode::Anonymous { param } => {
                let props = param_map(params, param)?;
                let end = edge_end.ok_or_else(|| {
                    Error::client("anonymous pattern node without a resolved destination")
                })?;
                let existing = self
                    .rels
                    .values()
                    .find(|rel| {
                        rel.rel_type == rel_type
                            && rel.end == end
                            && self.nodes.get(&rel.start) == Some(&props)
                    })
                    .map(|rel| rel.start);
                match existing {
                    Some(id) => Ok(id),
                    None => Ok(self.create_node(props)),
                }
            }
        }
    }

    fn exec_create_instance(
        &mut self,
        clauses: &[StartClause],
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let cls = *bound.get("cls").ok_or_else(|| Error::client("cls is not bound"))?;

        let props = param_map(params, "props")?;
        let rel_props = param_map(params, "rel_props")?;
        let node = self.create_node(props);
        self.create_rel("INSTANCEOF", node, cls, rel_props);
        Ok(vec![vec![CypherValue::Node(self.node_value(node))]])
    }

    fn exec_create_rel(
        &mut self,
        clauses: &[StartClause],
        create_part: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let n1 = *bound.get("n1").ok_or_else(|| Error::client("n1 is not bound"))?;
        let n2 = *bound.get("n2").ok_or_else(|| Error::client("n2 is not bound"))?;

        // "n1 -[r:LIKES {props}]-> n2 RETURN r"
        let rel_type = create_part
            .split_once("-[r:")
            .and_then(|(_, rest)| rest.split_once(' '))
            .map(|(rel_type, _)| rel_type)
            .ok_or_else(|| unsupported(create_part))?;

        let props = param_map(params, "props")?;
        let id = self.create_rel(rel_type, n1, n2, props);
        Ok(vec![vec![self.rel_value(id)]])
    }

    fn exec_update(
        &mut self,
        clauses: &[StartClause],
        set_part: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let id = *bound.get("n").ok_or_else(|| Error::client("n is not bound"))?;

        for assignment in split_quoted(set_part, ',') {
            let assignment = assignment.trim();
            // "n.key={key}"
            let (target, value_ref) = assignment
                .split_once('=')
                .ok_or_else(|| unsupported(assignment))?;
            let key = target
                .trim()
                .strip_prefix("n.")
                .ok_or_else(|| unsupported(assignment))?;
            let value = ValueRef::parse(value_ref.trim())?.resolve_value(params)?;

            let props = self
                .nodes
                .get_mut(&id)
                .ok_or_else(|| Error::client("SET target node is gone"))?;
            if value.is_null() {
                props.shift_remove(key);
            } else {
                props.insert(key.to_owned(), value);
            }
        }

        Ok(vec![vec![CypherValue::Node(self.node_value(id))]])
    }

    fn exec_instance_lookup(
        &mut self,
        clauses: &[StartClause],
        where_part: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let root = *bound.get("root").ok_or_else(|| Error::client("root is not bound"))?;

        let mut filters: Vec<(String, PropertyValue)> = Vec::new();
        for clause in where_part.split(" or ") {
            // "n.key? = {key}"
            let (target, value_ref) =
                clause.split_once('=').ok_or_else(|| unsupported(clause))?;
            let key = target
                .trim()
                .strip_prefix("n.")
                .and_then(|key| key.strip_suffix('?'))
                .ok_or_else(|| unsupported(clause))?;
            let value = ValueRef::parse(value_ref.trim())?.resolve_value(params)?;
            filters.push((key.to_owned(), value));
        }

        let ids: Vec<u64> = self
            .nodes
            .iter()
            .filter(|(id, props)| {
                self.reaches_root(**id, root)
                    && filters
                        .iter()
                        .any(|(key, value)| props.get(key) == Some(value))
            })
            .map(|(id, _)| *id)
            .collect();

        Ok(ids
            .into_iter()
            .map(|id| vec![CypherValue::Node(self.node_value(id))])
            .collect())
    }

    /// `n -[:INSTANCEOF]-> t -[:ISA*0..]-> u <-[:DEFINES]- root`.
    fn reaches_root(&self, node: u64, root: u64) -> bool {
        let types = self
            .rels
            .values()
            .filter(|rel| rel.rel_type == "INSTANCEOF" && rel.start == node)
            .map(|rel| rel.end);

        for start in types {
            let mut stack = vec![start];
            let mut visited = Vec::new();
            while let Some(current) = stack.pop() {
                if visited.contains(&current) {
                    continue;
                }
                visited.push(current);
                let defined = self.rels.values().any(|rel| {
                    rel.rel_type == "DEFINES" && rel.start == root && rel.end == current
                });
                if defined {
                    return true;
                }
                stack.extend(
                    self.rels
                        .values()
                        .filter(|rel| rel.rel_type == "ISA" && rel.start == current)
                        .map(|rel| rel.end),
                );
            }
        }
        false
    }

    fn exec_traversal(
        &mut self,
        clauses: &[StartClause],
        match_part: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let n = *bound.get("n").ok_or_else(|| Error::client("n is not bound"))?;

        // "n -[:REL]-> related RETURN related" or "n <-[:REL]- related …"
        let outgoing = match_part.starts_with("n -[:");
        let rel_type = match_part
            .split_once("[:")
            .and_then(|(_, rest)| rest.split_once(']'))
            .map(|(rel_type, _)| rel_type)
            .ok_or_else(|| unsupported(match_part))?;

        let related: Vec<u64> = self
            .rels
            .values()
            .filter(|rel| rel.rel_type == rel_type)
            .filter_map(|rel| {
                if outgoing && rel.start == n {
                    Some(rel.end)
                } else if !outgoing && rel.end == n {
                    Some(rel.start)
                } else {
                    None
                }
            })
            .collect();

        Ok(related
            .into_iter()
            .map(|id| vec![CypherValue::Node(self.node_value(id))])
            .collect())
    }

    fn exec_indexed_return(
        &mut self,
        clauses: &[StartClause],
        return_part: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        let [clause] = clauses else {
            return Err(unsupported(return_part));
        };
        if return_part != clause.name {
            return Err(unsupported(return_part));
        }

        let value = clause.value.resolve(params)?;
        let ids = self.index_lookup(clause.kind, &clause.index, &clause.key, &value);
        Ok(ids
            .into_iter()
            .map(|id| {
                vec![match clause.kind {
                    IndexKind::Node => CypherValue::Node(self.node_value(id)),
                    IndexKind::Relationship => self.rel_value(id),
                }]
            })
            .collect())
    }

    fn exec_delete_rel(&mut self, clauses: &[StartClause], params: &Params) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let n1 = *bound.get("n1").ok_or_else(|| Error::client("n1 is not bound"))?;
        let n2 = *bound.get("n2").ok_or_else(|| Error::client("n2 is not bound"))?;
        self.rels.retain(|_, rel| !(rel.start == n1 && rel.end == n2));
        Ok(Vec::new())
    }

    fn exec_delete_class(&mut self, clauses: &[StartClause], params: &Params) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let obj = *bound.get("obj").ok_or_else(|| Error::client("obj is not bound"))?;

        let attrs: Vec<u64> = self
            .rels
            .values()
            .filter(|rel| rel.rel_type == "DECLAREDON" && rel.end == obj)
            .map(|rel| rel.start)
            .collect();
        for attr in attrs {
            self.remove_node(attr);
        }
        self.remove_node(obj);
        Ok(Vec::new())
    }

    fn exec_delete_node(&mut self, clauses: &[StartClause], params: &Params) -> Result<Vec<Row>> {
        let Some(bound) = self.bind_first(clauses, params)? else {
            return Ok(Vec::new());
        };
        let obj = *bound.get("obj").ok_or_else(|| Error::client("obj is not bound"))?;
        self.remove_node(obj);
        Ok(Vec::new())
    }
}

impl Connect for MemoryGraph {
    fn connect_with(_options: &StorageOptions) -> Result<Self> {
        Ok(MemoryGraph::new())
    }
}

impl GraphClient for MemoryGraph {
    fn execute(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        self.run(query, params)
    }

    fn get_or_create_index(&mut self, kind: IndexKind, name: &str) -> Result<()> {
        self.indexes(kind).entry(name.to_owned()).or_default();
        Ok(())
    }

    fn add_to_index(
        &mut self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &PropertyValue,
        target: GraphId,
    ) -> Result<()> {
        let entries = self.indexes(kind).entry(name.to_owned()).or_default();
        let ids = entries
            .entry((key.to_owned(), value.index_repr()))
            .or_default();
        if !ids.contains(&target.0) {
            ids.push(target.0);
        }
        Ok(())
    }

    fn get_indexed_node(
        &mut self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Option<GraphNode>> {
        let ids = self.index_lookup(IndexKind::Node, name, key, &value.index_repr());
        Ok(ids.first().map(|id| self.node_value(*id)))
    }

    fn get_indexes(&mut self, kind: IndexKind) -> Result<Vec<String>> {
        Ok(self.indexes(kind).keys().cloned().collect())
    }

    fn delete_index(&mut self, kind: IndexKind, name: &str) -> Result<()> {
        self.indexes(kind).shift_remove(name);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.nodes.clear();
        self.rels.clear();
        Ok(())
    }
}

// ---- query-text parsing ----

fn unsupported(text: &str) -> Error {
    Error::client(format!("the in-memory graph does not understand: {text}"))
}

#[derive(Debug, Clone)]
enum ValueRef {
    Param(String),
    Literal(String),
}

impl ValueRef {
    fn parse(text: &str) -> Result<Self> {
        if let Some(name) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
            return Ok(ValueRef::Param(name.to_owned()));
        }
        if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(ValueRef::Literal(inner.replace("\\\"", "\"").replace("\\\\", "\\")));
        }
        Err(unsupported(text))
    }

    /// Canonical index-lookup form.
    fn resolve(&self, params: &Params) -> Result<String> {
        match self {
            ValueRef::Literal(text) => Ok(text.clone()),
            ValueRef::Param(name) => Ok(param_value(params, name)?.index_repr()),
        }
    }

    fn resolve_value(&self, params: &Params) -> Result<PropertyValue> {
        match self {
            ValueRef::Literal(text) => Ok(PropertyValue::Str(text.clone())),
            ValueRef::Param(name) => param_value(params, name),
        }
    }
}

#[derive(Debug)]
struct StartClause {
    name: String,
    kind: IndexKind,
    index: String,
    key: String,
    value: ValueRef,
}

/// Parse `START a=node:IDX(key={p}), b=node:IDX2(key="v")`.
fn parse_start_line(line: &str) -> Result<Vec<StartClause>> {
    let rest = line
        .strip_prefix("START ")
        .ok_or_else(|| unsupported(line))?;
    split_quoted(rest, ',')
        .into_iter()
        .map(|clause| parse_start_clause(clause.trim()))
        .collect()
}

fn parse_start_clause(clause: &str) -> Result<StartClause> {
    let (name, lookup) = clause.split_once('=').ok_or_else(|| unsupported(clause))?;
    let lookup = lookup.trim();
    let (namespace, rest) = lookup.split_once(':').ok_or_else(|| unsupported(clause))?;
    let kind = match namespace {
        "node" => IndexKind::Node,
        "relationship" => IndexKind::Relationship,
        _ => return Err(unsupported(clause)),
    };
    let (index, inner) = rest.split_once('(').ok_or_else(|| unsupported(clause))?;
    let inner = inner.strip_suffix(')').ok_or_else(|| unsupported(clause))?;
    let (key, value) = inner.split_once('=').ok_or_else(|| unsupported(clause))?;
    Ok(StartClause {
        name: name.trim().to_owned(),
        kind,
        index: index.to_owned(),
        key: key.to_owned(),
        value: ValueRef::parse(value)?,
    })
}

fn parse_return(line: &str) -> Result<Vec<String>> {
    let rest = line
        .strip_prefix("RETURN ")
        .ok_or_else(|| unsupported(line))?;
    Ok(rest.split(", ").map(str::to_owned).collect())
}

#[derive(Debug)]
enum PatternNode {
    Bound(String),
    Named { name: String, param: String },
    Anonymous { param: String },
}

#[derive(Debug)]
struct PatternRel {
    rel_type: String,
    param: String,
}

/// Parse one `CREATE UNIQUE` line: `<node> -[:TYPE {param}]-> <node>`.
fn parse_pattern(line: &str) -> Result<(PatternNode, PatternRel, PatternNode)> {
    let (lhs, rest) = line.split_once(" -[:").ok_or_else(|| unsupported(line))?;
    let (rel, rhs) = rest.split_once("]-> ").ok_or_else(|| unsupported(line))?;
    let (rel_type, rel_param) = rel.split_once(' ').ok_or_else(|| unsupported(line))?;
    let rel_param = rel_param
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| unsupported(line))?;

    Ok((
        parse_pattern_node(lhs.trim())?,
        PatternRel { rel_type: rel_type.to_owned(), param: rel_param.to_owned() },
        parse_pattern_node(rhs.trim())?,
    ))
}

fn parse_pattern_node(text: &str) -> Result<PatternNode> {
    let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        return Ok(PatternNode::Bound(text.to_owned()));
    };
    if let Some(param) = inner.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return Ok(PatternNode::Anonymous { param: param.to_owned() });
    }
    let (name, param) = inner.split_once(' ').ok_or_else(|| unsupported(text))?;
    let param = param
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| unsupported(text))?;
    Ok(PatternNode::Named { name: name.to_owned(), param: param.to_owned() })
}

/// Split on `sep`, ignoring separators inside double-quoted strings.
fn split_quoted(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            c if c == sep && !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Split a single-line statement at a top-level keyword, ignoring any
/// occurrence inside quoted strings.
fn split_top_level<'a>(line: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            _ if !in_quotes && line[i..].starts_with(keyword) => {
                return Some((&line[..i], &line[i + keyword.len()..]));
            }
            _ => {}
        }
    }
    None
}

fn param_map(params: &Params, name: &str) -> Result<PropertyMap> {
    match params.get(name) {
        Some(Param::Map(map)) => Ok(map.clone()),
        Some(Param::Value(_)) => {
            Err(Error::client(format!("parameter {name:?} is not a property map")))
        }
        None => Err(Error::client(format!("missing parameter {name:?}"))),
    }
}

fn param_value(params: &Params, name: &str) -> Result<PropertyValue> {
    match params.get(name) {
        Some(Param::Value(value)) => Ok(value.clone()),
        Some(Param::Map(_)) => {
            Err(Error::client(format!("parameter {name:?} is not a primitive")))
        }
        None => Err(Error::client(format!("missing parameter {name:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_separators_are_preserved() {
        let parts = split_quoted(r#"a=node:X(k="v,w"), b=node:Y(k="z")"#, ',');
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], r#"a=node:X(k="v,w")"#);
    }

    #[test]
    fn start_clause_forms() {
        let clause = parse_start_clause(r#"n=node:Person(id="alice")"#).unwrap();
        assert_eq!(clause.name, "n");
        assert_eq!(clause.index, "Person");
        assert_eq!(clause.key, "id");
        assert!(matches!(clause.value, ValueRef::Literal(ref v) if v == "alice"));

        let clause = parse_start_clause("nr = relationship:Likes(id={idx_value})").unwrap();
        assert_eq!(clause.name, "nr");
        assert_eq!(clause.kind, IndexKind::Relationship);
        assert!(matches!(clause.value, ValueRef::Param(ref p) if p == "idx_value"));
    }

    #[test]
    fn pattern_forms() {
        let (lhs, rel, rhs) =
            parse_pattern("root -[:DEFINES {Defines_props}]-> (Entity {Entity_props})").unwrap();
        assert!(matches!(lhs, PatternNode::Bound(ref n) if n == "root"));
        assert_eq!(rel.rel_type, "DEFINES");
        assert!(matches!(rhs, PatternNode::Named { ref name, .. } if name == "Entity"));

        let (lhs, rel, _) =
            parse_pattern("({Person_id}) -[:DECLAREDON {Person_id_decl_props}]-> Person").unwrap();
        assert!(matches!(lhs, PatternNode::Anonymous { ref param } if param == "Person_id"));
        assert_eq!(rel.rel_type, "DECLAREDON");
    }

    #[test]
    fn create_unique_is_idempotent() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_node(PropertyMap::new());
        graph.get_or_create_index(IndexKind::Node, "TypeSystem").unwrap();
        graph
            .add_to_index(
                IndexKind::Node,
                "TypeSystem",
                "id",
                &PropertyValue::Str("TypeSystem".into()),
                GraphId(root),
            )
            .unwrap();

        let query = "START root=node:TypeSystem(id={root_id})\n\
                     CREATE UNIQUE\n\
                     \x20   root -[:DEFINES {Defines_props}]-> (Entity {Entity_props})\n\
                     RETURN Entity";
        let mut params = Params::new();
        params.insert("root_id".into(), Param::Value(PropertyValue::Str("TypeSystem".into())));
        params.insert("Defines_props".into(), Param::Map(PropertyMap::new()));
        let mut entity_props = PropertyMap::new();
        entity_props.insert("__type__".into(), "PersistableMeta".into());
        entity_props.insert("id".into(), "Entity".into());
        params.insert("Entity_props".into(), Param::Map(entity_props));

        let rows = graph.execute(query, &params).unwrap();
        assert_eq!(rows.len(), 1);
        let nodes = graph.node_count();
        let edges = graph.edge_count();

        graph.execute(query, &params).unwrap();
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(graph.edge_count(), edges);
    }
}
