//! Nodes, edges and stages of the lineage graph.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest for node ids.
const NODE_ID_LEN: usize = 16;

/// Reconciled state of a path: version-control record, disk presence and
/// content change combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Tracked,
    Modified,
    Untracked,
    Deleted,
    Ignored,
    /// Scanner failure marker for unreadable subtrees; never produced by
    /// the classifier.
    Unknown,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracked => "tracked",
            Self::Modified => "modified",
            Self::Untracked => "untracked",
            Self::Deleted => "deleted",
            Self::Ignored => "ignored",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// Where a file's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentState {
    /// Ordinary bytes in the working tree.
    Local,
    /// Large-file placeholder; `available` is whether the content behind
    /// it is present locally.
    Annexed { available: bool },
}

impl Default for ContentState {
    fn default() -> Self {
        Self::Local
    }
}

/// One filesystem entry as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    /// `/`-separated path relative to the dataset root.
    pub relative_path: String,
    pub name: String,
    pub kind: NodeKind,
    /// Files only. For annexed placeholders this is the content size.
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub tracking_status: TrackingStatus,
    #[serde(default)]
    pub content: ContentState,
}

impl RawNode {
    /// Parent directory's relative path, `None` for top-level entries.
    pub fn parent_path(&self) -> Option<&str> {
        self.relative_path.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// First path segment (the one stage rules match against).
    pub fn first_segment(&self) -> &str {
        self.relative_path
            .split('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Number of path segments; 1 for top-level entries.
    pub fn depth(&self) -> usize {
        self.relative_path.split('/').count()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// A named, ordered pipeline phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub order: u32,
    /// Glob matched against the first path segment.
    #[serde(rename = "matchRule", alias = "match_rule")]
    pub match_rule: String,
}

impl Stage {
    pub fn new(name: impl Into<String>, order: u32, match_rule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order,
            match_rule: match_rule.into(),
        }
    }
}

/// A graph vertex: either a real path or a synthetic stage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    /// Empty for synthetic stage roots.
    pub relative_path: String,
    pub kind: NodeKind,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub tracking_status: TrackingStatus,
    /// Stage name, when the path maps to one.
    pub stage: Option<String>,
    pub synthetic: bool,
    /// Path segment count; 0 for stage roots.
    pub depth: usize,
    #[serde(default)]
    pub content: ContentState,
}

impl Node {
    pub fn from_raw(raw: &RawNode, stage: Option<&Stage>) -> Self {
        Self {
            id: node_id(&raw.relative_path),
            name: raw.name.clone(),
            relative_path: raw.relative_path.clone(),
            kind: raw.kind,
            size_bytes: raw.size_bytes,
            modified_at: raw.modified_at,
            tracking_status: raw.tracking_status,
            stage: stage.map(|s| s.name.clone()),
            synthetic: false,
            depth: raw.depth(),
            content: raw.content,
        }
    }

    pub fn stage_root(stage: &Stage) -> Self {
        Self {
            id: stage_root_id(&stage.name),
            name: stage.name.clone(),
            relative_path: String::new(),
            kind: NodeKind::Directory,
            size_bytes: None,
            modified_at: None,
            tracking_status: TrackingStatus::Tracked,
            stage: Some(stage.name.clone()),
            synthetic: true,
            depth: 0,
            content: ContentState::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Containment,
    StageFlow,
}

/// Directed edge. Field order gives the (kind, from, to) sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub kind: EdgeKind,
    #[serde(rename = "fromNodeId")]
    pub from: String,
    #[serde(rename = "toNodeId")]
    pub to: String,
}

impl Edge {
    pub fn containment(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: EdgeKind::Containment,
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn stage_flow(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: EdgeKind::StageFlow,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Stable id of a real node: a pure function of its relative path.
pub fn node_id(relative_path: &str) -> String {
    short_digest(relative_path.as_bytes())
}

/// Stable id of a stage's synthetic root.
pub fn stage_root_id(stage_name: &str) -> String {
    short_digest(format!("stage:{stage_name}").as_bytes())
}

fn short_digest(bytes: &[u8]) -> String {
    let mut hex = hex::encode(Sha256::digest(bytes));
    hex.truncate(NODE_ID_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(path: &str) -> RawNode {
        RawNode {
            relative_path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            kind: NodeKind::File,
            size_bytes: Some(1),
            modified_at: None,
            tracking_status: TrackingStatus::Tracked,
            content: ContentState::Local,
        }
    }

    #[test]
    fn test_node_id_is_pure_function_of_path() {
        assert_eq!(node_id("input/a.csv"), node_id("input/a.csv"));
        assert_ne!(node_id("input/a.csv"), node_id("input/b.csv"));
        assert_eq!(node_id("input/a.csv").len(), 16);
    }

    #[test]
    fn test_stage_root_id_does_not_collide_with_directory() {
        assert_ne!(stage_root_id("input"), node_id("input"));
    }

    #[test]
    fn test_raw_node_path_helpers() {
        let node = raw("input/sub/a.csv");
        assert_eq!(node.parent_path(), Some("input/sub"));
        assert_eq!(node.first_segment(), "input");
        assert_eq!(node.depth(), 3);
        assert_eq!(raw("README.md").parent_path(), None);
    }

    #[test]
    fn test_edges_sort_by_kind_then_endpoints() {
        let mut edges = vec![
            Edge::stage_flow("a", "b"),
            Edge::containment("b", "c"),
            Edge::containment("a", "z"),
        ];
        edges.sort();
        assert_eq!(edges[0], Edge::containment("a", "z"));
        assert_eq!(edges[2].kind, EdgeKind::StageFlow);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(Edge::stage_flow("a", "b")).unwrap();
        assert_eq!(json["kind"], "stage-flow");
        assert_eq!(json["fromNodeId"], "a");

        let json = serde_json::to_value(raw("input/a.csv")).unwrap();
        assert_eq!(json["relativePath"], "input/a.csv");
        assert_eq!(json["trackingStatus"], "tracked");
        assert_eq!(json["content"]["type"], "local");
    }
}
