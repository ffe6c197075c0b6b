//! The lineage graph value and snapshot comparison.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::Result;
use super::node::{Edge, EdgeKind, Node};

/// Nodes keyed by id plus a sorted, de-duplicated edge list.
///
/// Rebuilt wholesale per request; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
    pub built_at: DateTime<Utc>,
}

/// Difference between two graph snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDelta {
    pub added_nodes: Vec<String>,
    pub removed_nodes: Vec<String>,
    /// Present in both with different content (status, size, mtime, ...).
    pub changed_nodes: Vec<String>,
    pub added_edges: Vec<Edge>,
    pub removed_edges: Vec<Edge>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[derive(Serialize)]
struct Content<'a> {
    nodes: &'a BTreeMap<String, Node>,
    edges: &'a [Edge],
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node with the given relative path (real nodes only).
    pub fn node_by_path(&self, relative_path: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| !n.synthetic && n.relative_path == relative_path)
    }

    pub fn stage_roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.synthetic)
    }

    /// Ids reachable from `id` over one containment edge.
    pub fn children(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Containment && e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// SHA-256 over the canonical JSON of nodes and edges, excluding
    /// `built_at`. Equal digests mean byte-identical graph content.
    pub fn content_digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&Content {
            nodes: &self.nodes,
            edges: &self.edges,
        })?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// What changed going from `previous` to `self`.
    pub fn delta(&self, previous: &Graph) -> GraphDelta {
        let mut delta = GraphDelta::default();

        for (id, node) in &self.nodes {
            match previous.nodes.get(id) {
                None => delta.added_nodes.push(id.clone()),
                Some(old) if old != node => delta.changed_nodes.push(id.clone()),
                Some(_) => {}
            }
        }
        delta.removed_nodes = previous
            .nodes
            .keys()
            .filter(|id| !self.nodes.contains_key(*id))
            .cloned()
            .collect();

        let current: BTreeSet<&Edge> = self.edges.iter().collect();
        let before: BTreeSet<&Edge> = previous.edges.iter().collect();
        delta.added_edges = current.difference(&before).map(|e| (*e).clone()).collect();
        delta.removed_edges = before.difference(&current).map(|e| (*e).clone()).collect();

        delta
    }
}
