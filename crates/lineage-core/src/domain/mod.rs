//! Domain models for dataset lineage.
//!
//! Canonical definitions for the core entities:
//! - `Node`, `Edge`, `Stage`, `Graph`: the lineage graph
//! - `Commit`, `FileChange`: the commit timeline
//! - `DiffHunk`: parsed per-file diffs
//! - `RestoreRequest`: one file-restore attempt

pub mod commit;
pub mod diff;
pub mod error;
pub mod graph;
pub mod node;
pub mod restore;

// Re-export main types and errors
pub use commit::{ChangeKind, Commit, ComparisonReport, FileChange};
pub use diff::{DiffHunk, DiffLine, LineMarker};
pub use error::{LineageError, ParseError, ProvisionError, RestoreStateError, Result};
pub use graph::{Graph, GraphDelta};
pub use node::{
    node_id, stage_root_id, ContentState, Edge, EdgeKind, Node, NodeKind, RawNode, Stage,
    TrackingStatus,
};
pub use restore::{
    RestoreDiagnostics, RestoreFailure, RestoreRequest, RestoreStatus, Transition,
};
