use petgraph::dot::{Config, Dot};
use petgraph::prelude::*;

use provdb::{PnodeVersion, Scope, Value};

use super::entities::*;
use crate::{Error, Result};

use std::collections::{btree_map, BTreeMap, HashMap};
use std::ops::Index;

pub type IndexType = u32;
pub type NodeIdx = NodeIndex<IndexType>;
pub type EdgeIdx = EdgeIndex<IndexType>;

pub type ProvGraph = DiGraph<Node, Edge, IndexType>;

/// Outcome of [`ProvenanceGraph::ensure_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created(NodeIdx),
    Existing(NodeIdx),
}

impl Ensured {
    pub fn idx(self) -> NodeIdx {
        match self {
            Ensured::Created(idx) | Ensured::Existing(idx) => idx,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, Ensured::Created(_))
    }
}

/// A versioned provenance graph.
///
/// Nodes are identified by `(pnode, version)` and never removed. Entity-scope
/// attributes live on version 0 of an entity, which exists whenever any version does.
/// Edges are unique per `(from, to, kind)`; adding one again records another
/// occurrence on the existing edge.
pub struct ProvenanceGraph {
    flow: ProvGraph,
    nodes: HashMap<PnodeVersion, NodeIdx>,
    entities: BTreeMap<u64, BTreeMap<u32, NodeIdx>>,
    edges: HashMap<(NodeIdx, NodeIdx, EdgeKind), EdgeIdx>,
}

impl Default for ProvenanceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvenanceGraph {
    pub fn new() -> Self {
        Self {
            flow: DiGraph::default(),
            nodes: HashMap::new(),
            entities: BTreeMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn ensure_node(&mut self, key: PnodeVersion) -> Ensured {
        if let Some(idx) = self.nodes.get(&key) {
            return Ensured::Existing(*idx);
        }
        if key.version != 0 {
            self.ensure_node(key.anchor());
        }
        let idx = self.flow.add_node(Node::new(key));
        self.nodes.insert(key, idx);
        self.entities
            .entry(key.pnode)
            .or_default()
            .insert(key.version, idx);
        Ensured::Created(idx)
    }

    /// Sets an attribute on `idx`, or on its version 0 for entity scope.
    pub fn set_attribute<S: Into<String>>(
        &mut self,
        idx: NodeIdx,
        name: S,
        value: Value,
        scope: Scope,
    ) {
        let target = match scope {
            Scope::Version => idx,
            Scope::Entity => {
                let anchor = self.flow[idx].key.anchor();
                // ensure_node always creates the anchor first
                self.nodes.get(&anchor).copied().unwrap_or(idx)
            }
        };
        self.flow[target].attrs.insert(name.into(), value);
    }

    /// Adds an occurrence of `kind` between two existing nodes.
    ///
    /// `time`, when given, is appended to the edge's occurrences; annotations
    /// overwrite earlier ones of the same name.
    pub fn add_edge(
        &mut self,
        from: PnodeVersion,
        to: PnodeVersion,
        kind: EdgeKind,
        time: Option<&str>,
        annotations: &[(&str, &str)],
    ) -> Result<EdgeIdx> {
        let from = self.require(from)?;
        let to = self.require(to)?;

        let flow = &mut self.flow;
        let idx = *self
            .edges
            .entry((from, to, kind))
            .or_insert_with(|| flow.add_edge(from, to, Edge::new(kind)));

        let edge = &mut self.flow[idx];
        if let Some(time) = time {
            edge.times.push(time.to_string());
        }
        for (name, value) in annotations {
            edge.annotations.insert(name.to_string(), value.to_string());
        }
        Ok(idx)
    }

    /// Turns the `old` edge between two nodes into a `new` one.
    ///
    /// Returns `None` when there is no `old` edge. If a `new` edge exists already it
    /// is returned and the `old` one is left alone.
    pub fn reclassify(
        &mut self,
        from: PnodeVersion,
        to: PnodeVersion,
        old: EdgeKind,
        new: EdgeKind,
    ) -> Option<EdgeIdx> {
        let from = *self.nodes.get(&from)?;
        let to = *self.nodes.get(&to)?;
        if let Some(idx) = self.edges.get(&(from, to, new)) {
            return Some(*idx);
        }
        let idx = self.edges.remove(&(from, to, old))?;
        self.flow[idx].kind = new;
        self.edges.insert((from, to, new), idx);
        Some(idx)
    }

    /// The attribute as seen from `key`: its own value, else its entity's.
    pub fn resolve_attribute(&self, key: PnodeVersion, name: &str) -> Option<&Value> {
        let idx = self.nodes.get(&key)?;
        self.flow[*idx].attrs.get(name).or_else(|| {
            self.nodes
                .get(&key.anchor())
                .and_then(|anchor| self.flow[*anchor].attrs.get(name))
        })
    }

    /// Every attribute visible from `idx`, version-scope ones shadowing the entity's.
    pub fn resolved_attributes(&self, idx: NodeIdx) -> BTreeMap<&str, &Value> {
        let node = &self.flow[idx];
        let mut attrs = BTreeMap::new();
        if let Some(anchor) = self.nodes.get(&node.key.anchor()) {
            attrs.extend(
                self.flow[*anchor]
                    .attrs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v)),
            );
        }
        attrs.extend(node.attrs.iter().map(|(k, v)| (k.as_str(), v)));
        attrs
    }

    pub fn node_index(&self, key: PnodeVersion) -> Option<NodeIdx> {
        self.nodes.get(&key).copied()
    }

    pub fn contains(&self, key: PnodeVersion) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn edge(&self, from: PnodeVersion, to: PnodeVersion, kind: EdgeKind) -> Option<&Edge> {
        let from = self.nodes.get(&from)?;
        let to = self.nodes.get(&to)?;
        self.edges
            .get(&(*from, *to, kind))
            .map(|idx| &self.flow[*idx])
    }

    /// Versions of one entity in order.
    pub fn versions(&self, pnode: u64) -> Option<&BTreeMap<u32, NodeIdx>> {
        self.entities.get(&pnode)
    }

    /// The `entity -> {version -> node}` index, in entity order.
    pub fn entities(&self) -> btree_map::Iter<'_, u64, BTreeMap<u32, NodeIdx>> {
        self.entities.iter()
    }

    pub fn node_count(&self) -> usize {
        self.flow.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.flow.edge_count()
    }

    pub fn count_edges(&self, kind: EdgeKind) -> usize {
        self.flow
            .raw_edges()
            .iter()
            .filter(|edge| edge.weight.kind == kind)
            .count()
    }

    /// Edges with their endpoint identities, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (PnodeVersion, PnodeVersion, &Edge)> + '_ {
        self.flow.edge_references().map(move |e| {
            (
                self.flow[e.source()].key,
                self.flow[e.target()].key,
                e.weight(),
            )
        })
    }

    pub fn get_dot_with_config<'a>(&'a self, config: &'a [Config]) -> Dot<&'a ProvGraph> {
        Dot::with_config(&self.flow, config)
    }

    fn require(&self, key: PnodeVersion) -> Result<NodeIdx> {
        self.nodes
            .get(&key)
            .copied()
            .ok_or(Error::MissingNode(key))
    }
}

impl Index<NodeIdx> for ProvenanceGraph {
    type Output = Node;

    fn index(&self, idx: NodeIdx) -> &Self::Output {
        &self.flow[idx]
    }
}
