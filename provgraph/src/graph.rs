
pub mod entities;
mod provenance;
pub use provenance::*;

use entities::*;
use provdb::PnodeVersion;

use crate::Result;

/// Creates `to` as the successor of `from` on the same entity and links them.
///
/// Does nothing besides the edge when `to` exists already.
pub fn add_version(graph: &mut ProvenanceGraph, from: PnodeVersion) -> Result<PnodeVersion> {
    let to = PnodeVersion::new(from.pnode, from.version + 1);
    graph.ensure_node(to);
    graph.add_edge(from, to, EdgeKind::Version, None, &[])?;
    Ok(to)
}
