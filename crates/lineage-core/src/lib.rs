//! Lineage-Core: dataset lineage graph and history engine
//!
//! Re-exports core components for programmatic access to a versioned
//! dataset: the stage graph, the commit timeline, per-file diffs and
//! file restore.
//!
//! ## Layer 2 - Domain & Engines
//!
//! - `status`, `annex`, `scan`: what is on disk and how git sees it
//! - `stage`, `graph`: stage mapping and deterministic graph construction
//! - `history`, `changes`, `diff`: best-effort parsing of tool output
//! - `restore`, `revert`: strict, lock-protected mutations through a
//!   [`Provisioner`]
//! - `dataset`: the [`Dataset`] facade tying the above together
//!
//! Focus: every path passes [`lineage_vcs::PathGuard`] and every tool call
//! carries a timeout.

pub mod annex;
pub mod cache;
pub mod changes;
pub mod config;
pub mod dataset;
pub mod diff;
pub mod domain;
pub mod graph;
pub mod history;
pub mod lock;
pub mod obs;
pub mod provision;
pub mod restore;
pub mod revert;
pub mod scan;
pub mod stage;
pub mod status;
pub mod telemetry;
pub mod tool;

pub use domain::{
    node_id, stage_root_id, ChangeKind, Commit, ComparisonReport, ContentState, DiffHunk,
    DiffLine, Edge, EdgeKind, FileChange, Graph, GraphDelta, LineMarker, LineageError, Node,
    NodeKind, ParseError, ProvisionError, RawNode, RestoreDiagnostics, RestoreFailure,
    RestoreRequest, RestoreStateError, RestoreStatus, Result, Stage, TrackingStatus, Transition,
};

pub use cache::{fingerprint, FingerprintCache};
pub use changes::parse_changes;
pub use config::{default_stages, LineageConfig};
pub use dataset::Dataset;
pub use diff::parse_unified_diff;
pub use graph::GraphBuilder;
pub use history::{parse_log, relative_age};
pub use lock::{DatasetLock, DatasetLocks};
pub use provision::{GitProvisioner, Provisioner, RecordedCommit, RecordingProvisioner};
pub use restore::{parse_tree_entry, RestoreEngine, TreeEntry};
pub use revert::{RevertEngine, RevertOutcome};
pub use scan::{missing_tracked, Scan, ScanOptions};
pub use stage::{summarize, MappedNode, StageHealth, StageMapper, StageSummary};
pub use status::{classify, StatusSnapshot, StatusToken};
pub use tool::Tool;
