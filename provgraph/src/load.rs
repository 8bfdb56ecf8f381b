//! Batch loading of a provenance store into a [`ProvenanceGraph`].

#[cfg(test)]
mod tests;

use crate::graph::entities::*;
use crate::graph::{add_version, ProvenanceGraph};
use crate::{Error, Result};

use provdb::{AttrName, AttrRecord, Dataset, PnodeVersion, Store, TokenDict, Value};

use log::{debug, info, warn};

use std::io;
use std::path::Path;

/// Highest version accepted from a store. Every version below an entity's latest
/// one is materialized.
pub const MAX_VERSION: u32 = 1 << 20;

fn load_error<'a>(store: &'a str, key: &'a [u8]) -> impl FnOnce(provdb::Error) -> Error + 'a {
    move |source| Error::Load {
        store: store.to_string(),
        key: key.to_vec(),
        source,
    }
}

fn inconsistent(store: &str, key: &[u8], source: Error) -> Error {
    Error::Inconsistent {
        store: store.to_string(),
        key: key.to_vec(),
        source: Box::new(source),
    }
}

// a node named by a record of `store` under `key`
fn read_node(store: &str, key: &[u8], bytes: &[u8]) -> Result<PnodeVersion> {
    let node = PnodeVersion::from_bytes(bytes).map_err(load_error(store, key))?;
    check_version(store, key, node)
}

fn check_version(store: &str, key: &[u8], node: PnodeVersion) -> Result<PnodeVersion> {
    if node.version > MAX_VERSION {
        return Err(load_error(store, key)(provdb::Error::new(
            provdb::ErrorKind::MalformedRecord,
            format!("version of {} is past {}", node, MAX_VERSION),
        )));
    }
    Ok(node)
}

/// Builds the graph of a whole dataset.
///
/// Any undecodable record aborts the load; nothing partial is returned.
pub fn load<S: Store>(dataset: &Dataset<S>) -> Result<ProvenanceGraph> {
    let tokens = load_tokens(&dataset.tnum2tok)?;
    debug!("{} tokens", tokens.len());

    let mut graph = ProvenanceGraph::new();
    load_parents(&mut graph, &dataset.parent)?;
    check_children(&mut graph, &dataset.child)?;
    load_attributes(&mut graph, &dataset.prov, &tokens)?;
    chain_versions(&mut graph)?;
    check_types(&graph, dataset.prov.name())?;

    let unresolved = graph.count_edges(EdgeKind::Ancestry);
    if unresolved > 0 {
        info!("{} ancestry edges of unknown kind", unresolved);
    }
    info!(
        "loaded {} entities, {} nodes, {} edges",
        graph.entities().len(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Opens the record dumps in `dir` and loads them.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<ProvenanceGraph> {
    let dir = dir.as_ref();
    let dataset = Dataset::open(dir).map_err(|e| match e.kind() {
        provdb::ErrorKind::IO => Error::IO(io::Error::from(e)),
        _ => Error::Load {
            store: dir.display().to_string(),
            key: vec![],
            source: e,
        },
    })?;
    load(&dataset)
}

fn load_tokens<S: Store>(store: &S) -> Result<TokenDict> {
    let mut tokens = TokenDict::new();
    for record in store.records() {
        let (key, value) = record.map_err(load_error(store.name(), &[]))?;
        tokens
            .insert_record(key, value)
            .map_err(load_error(store.name(), key))?;
    }
    Ok(tokens)
}

fn adjacency(store: &str, key: &[u8], value: &[u8]) -> Result<(PnodeVersion, PnodeVersion)> {
    Ok((read_node(store, key, key)?, read_node(store, key, value)?))
}

// child -> parent
fn load_parents<S: Store>(graph: &mut ProvenanceGraph, store: &S) -> Result<()> {
    for record in store.records() {
        let (key, value) = record.map_err(load_error(store.name(), &[]))?;
        let (child, parent) = adjacency(store.name(), key, value)?;
        graph.ensure_node(parent);
        graph.ensure_node(child);
        graph.add_edge(parent, child, EdgeKind::Ancestry, None, &[])?;
    }
    Ok(())
}

// parent -> child, should mirror the parent store
fn check_children<S: Store>(graph: &mut ProvenanceGraph, store: &S) -> Result<()> {
    for record in store.records() {
        let (key, value) = record.map_err(load_error(store.name(), &[]))?;
        let (parent, child) = adjacency(store.name(), key, value)?;
        if graph.edge(parent, child, EdgeKind::Ancestry).is_none() {
            warn!("{} -> {} is only in the {} store", parent, child, store.name());
            graph.ensure_node(parent);
            graph.ensure_node(child);
            graph.add_edge(parent, child, EdgeKind::Ancestry, None, &[])?;
        }
    }
    Ok(())
}

fn load_attributes<S: Store>(
    graph: &mut ProvenanceGraph,
    store: &S,
    tokens: &TokenDict,
) -> Result<()> {
    for record in store.records() {
        let (key, value) = record.map_err(load_error(store.name(), &[]))?;
        let node = read_node(store.name(), key, key)?;
        let attr = AttrRecord::decode(value, tokens).map_err(load_error(store.name(), key))?;
        let idx = graph.ensure_node(node).idx();

        if !attr.flags.is_ancestry() {
            graph.set_attribute(idx, attr.name.as_str(), attr.value, attr.name.scope());
            continue;
        }

        let malformed = |what: String| {
            load_error(store.name(), key)(provdb::Error::new(
                provdb::ErrorKind::MalformedRecord,
                what,
            ))
        };
        let kind = match attr.name {
            AttrName::Input => EdgeKind::Input,
            AttrName::ForkParent => EdgeKind::ForkParent,
            name => return Err(malformed(format!("{} cannot be an ancestry edge", name))),
        };
        let pred = attr
            .value
            .as_pnode_version()
            .ok_or_else(|| malformed(format!("{} does not name a node", attr.name)))?;
        let pred = check_version(store.name(), key, pred)?;
        if !graph.contains(pred) {
            return Err(inconsistent(store.name(), key, Error::MissingNode(pred)));
        }
        if graph
            .reclassify(pred, node, EdgeKind::Ancestry, kind)
            .is_none()
        {
            warn!("{} {} of {} has no adjacency record", kind, pred, node);
        }
        graph.add_edge(
            pred,
            node,
            kind,
            None,
            &[(OPERATION_ANNOTATION, attr.name.as_str())],
        )?;
    }
    Ok(())
}

// fills version gaps so that every entity has 0..=latest, each step linked
fn chain_versions(graph: &mut ProvenanceGraph) -> Result<()> {
    let latest: Vec<(u64, u32)> = graph
        .entities()
        .filter_map(|(pnode, versions)| versions.keys().next_back().map(|v| (*pnode, *v)))
        .collect();

    for (pnode, latest) in latest {
        for version in 0..latest {
            let from = PnodeVersion::new(pnode, version);
            let to = PnodeVersion::new(pnode, version + 1);
            graph.reclassify(from, to, EdgeKind::Ancestry, EdgeKind::Version);
            add_version(graph, from)?;
        }
    }
    Ok(())
}

// TYPE is read from the attribute store, so failures point at the entity's key there
fn check_types(graph: &ProvenanceGraph, store: &str) -> Result<()> {
    for (pnode, _) in graph.entities() {
        let anchor = PnodeVersion::new(*pnode, 0);
        let source = match graph.resolve_attribute(anchor, TYPE_ATTR) {
            None => Error::MissingType(*pnode),
            Some(Value::Str(ty)) if ty.parse::<EntityType>().is_ok() => continue,
            Some(other) => Error::InvalidType(*pnode, other.to_string()),
        };
        return Err(inconsistent(store, &anchor.to_bytes(), source));
    }
    Ok(())
}
