//! Lineage graph assembly.
//!
//! 1. one node per scanned entry, id derived from its relative path;
//! 2. one synthetic root per stage that has at least one mapped entry;
//! 3. stage-flow edges between consecutive present stages;
//! 4. containment edges mirroring directory nesting, with top-level stage
//!    directories absorbed into their stage root and orphaned staged
//!    entries attached to it directly.
//!
//! Output depends only on the input set: nodes live in a `BTreeMap` and the
//! edge list is sorted and de-duplicated.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;

use crate::domain::{Edge, Graph, Node, NodeKind, Stage, TrackingStatus};
use crate::stage::MappedNode;

#[derive(Debug, Clone)]
pub struct GraphBuilder {
    stages: Vec<Stage>,
}

impl GraphBuilder {
    pub fn new(stages: &[Stage]) -> Self {
        let mut stages = stages.to_vec();
        stages.sort_by_key(|s| s.order);
        Self { stages }
    }

    pub fn build(&self, mapped: Vec<MappedNode>) -> Graph {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        let mut edges: Vec<Edge> = Vec::new();

        // Stage roots, keyed by stage name.
        let mut roots: HashMap<String, Node> = HashMap::new();
        // Relative path of an absorbed directory -> its stage root id.
        let mut absorbed: HashMap<String, String> = HashMap::new();

        for entry in &mapped {
            let Some(stage) = &entry.stage else { continue };
            let root = roots
                .entry(stage.name.clone())
                .or_insert_with(|| Node::stage_root(stage));

            let raw = &entry.raw;
            if raw.depth() == 1 && raw.kind == NodeKind::Directory {
                root.tracking_status = merge_status(root, raw.tracking_status, absorbed_count(&absorbed, &root.id));
                root.modified_at = root.modified_at.max(raw.modified_at);
                absorbed.insert(raw.relative_path.clone(), root.id.clone());
            }
        }

        let mut real: HashMap<&str, String> = HashMap::new();
        for entry in &mapped {
            if absorbed.contains_key(&entry.raw.relative_path) {
                continue;
            }
            let node = Node::from_raw(&entry.raw, entry.stage.as_ref());
            real.insert(entry.raw.relative_path.as_str(), node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        for entry in &mapped {
            let raw = &entry.raw;
            let Some(id) = real.get(raw.relative_path.as_str()) else {
                continue;
            };
            let parent = raw.parent_path().and_then(|p| {
                absorbed
                    .get(p)
                    .or_else(|| real.get(p))
                    .cloned()
            });
            let from = parent.or_else(|| {
                entry
                    .stage
                    .as_ref()
                    .and_then(|s| roots.get(&s.name))
                    .map(|r| r.id.clone())
            });
            if let Some(from) = from {
                edges.push(Edge::containment(from, id.clone()));
            }
        }

        let present: Vec<&Node> = self
            .stages
            .iter()
            .filter_map(|s| roots.get(&s.name))
            .collect();
        for pair in present.windows(2) {
            edges.push(Edge::stage_flow(pair[0].id.clone(), pair[1].id.clone()));
        }

        for root in roots.into_values() {
            nodes.insert(root.id.clone(), root);
        }

        edges.sort();
        edges.dedup();

        Graph {
            nodes,
            edges,
            built_at: Utc::now(),
        }
    }
}

fn absorbed_count(absorbed: &HashMap<String, String>, root_id: &str) -> usize {
    absorbed.values().filter(|id| id.as_str() == root_id).count()
}

/// Status of a stage root: that of its single absorbed directory, or
/// `modified` once directories with different statuses share a root.
fn merge_status(root: &Node, incoming: TrackingStatus, already_absorbed: usize) -> TrackingStatus {
    if already_absorbed == 0 || root.tracking_status == incoming {
        incoming
    } else {
        TrackingStatus::Modified
    }
}
