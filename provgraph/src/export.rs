//! Serialized forms of a [`ProvenanceGraph`] for tools downstream.


use crate::graph::entities::EdgeKind;
use crate::graph::ProvenanceGraph;
use crate::Result;

use provdb::Value;

use serde::Serialize;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Dot,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "dot" => Ok(Format::Dot),
            _ => Err(format!("unknown format {:?}, expected json or dot", s)),
        }
    }
}

/// A node-link document: nodes with their resolved attributes, links with their
/// kind and occurrences.
#[derive(Debug, Serialize)]
pub struct NodeLink<'a> {
    pub directed: bool,
    pub multigraph: bool,
    pub nodes: Vec<NodeData<'a>>,
    pub links: Vec<LinkData<'a>>,
}

#[derive(Debug, Serialize)]
pub struct NodeData<'a> {
    pub id: String,
    pub pnode: u64,
    pub version: u32,
    #[serde(flatten)]
    pub attrs: BTreeMap<&'a str, &'a Value>,
}

#[derive(Debug, Serialize)]
pub struct LinkData<'a> {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<&'a str>,
    pub times: &'a [String],
    #[serde(flatten)]
    pub annotations: &'a BTreeMap<String, String>,
}

pub fn node_link(graph: &ProvenanceGraph) -> NodeLink<'_> {
    let nodes = graph
        .entities()
        .flat_map(|(_, versions)| versions.values())
        .map(|idx| {
            let key = graph[*idx].key;
            NodeData {
                id: key.to_string(),
                pnode: key.pnode,
                version: key.version,
                attrs: graph.resolved_attributes(*idx),
            }
        })
        .collect();
    let links = graph
        .edges()
        .map(|(from, to, edge)| LinkData {
            source: from.to_string(),
            target: to.to_string(),
            kind: edge.kind,
            time: edge.time(),
            times: &edge.times,
            annotations: &edge.annotations,
        })
        .collect();
    NodeLink {
        directed: true,
        multigraph: true,
        nodes,
        links,
    }
}

pub fn write<W: Write>(graph: &ProvenanceGraph, format: Format, mut writer: W) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut writer, &node_link(graph)).map_err(io::Error::from)?;
            writeln!(writer)?;
        }
        Format::Dot => write!(writer, "{}", graph.get_dot_with_config(&[]))?,
    }
    writer.flush()?;
    Ok(())
}
