//! Stage mapping and per-stage summaries.

use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::domain::{Graph, LineageError, NodeKind, RawNode, Result, Stage, TrackingStatus};

/// A scanned entry paired with the stage its first path segment maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedNode {
    pub raw: RawNode,
    pub stage: Option<Stage>,
}

/// Assigns stages by matching the first path segment against each stage's
/// rule in configured order. First match wins.
#[derive(Debug, Clone)]
pub struct StageMapper {
    stages: Vec<Stage>,
    matchers: Vec<GlobMatcher>,
}

impl StageMapper {
    pub fn new(stages: &[Stage]) -> Result<Self> {
        let mut stages = stages.to_vec();
        stages.sort_by_key(|s| s.order);

        let matchers = stages
            .iter()
            .map(|stage| {
                GlobBuilder::new(&stage.match_rule)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| {
                        LineageError::Config(format!("stage {}: bad match rule: {e}", stage.name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { stages, matchers })
    }

    /// Stages sorted by `order`.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_for(&self, relative_path: &str) -> Option<&Stage> {
        let first = relative_path.split('/').next()?;
        self.matchers
            .iter()
            .position(|m| m.is_match(first))
            .map(|i| &self.stages[i])
    }

    pub fn map_to_stages<I>(&self, nodes: I) -> Vec<MappedNode>
    where
        I: IntoIterator<Item = RawNode>,
    {
        nodes
            .into_iter()
            .map(|raw| {
                let stage = self.stage_for(&raw.relative_path).cloned();
                MappedNode { raw, stage }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageHealth {
    /// Every file is tracked and unchanged.
    Clean,
    /// At least one file is modified, untracked, deleted or unknown.
    Mixed,
    /// No files.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub name: String,
    pub order: u32,
    pub present: bool,
    pub file_count: usize,
    pub directory_count: usize,
    pub tracked: usize,
    pub modified: usize,
    pub untracked: usize,
    pub deleted: usize,
    pub ignored: usize,
    pub unknown: usize,
    pub total_size_bytes: u64,
    pub latest_modified: Option<DateTime<Utc>>,
    pub status: StageHealth,
}

impl StageSummary {
    fn empty(stage: &Stage) -> Self {
        Self {
            name: stage.name.clone(),
            order: stage.order,
            present: false,
            file_count: 0,
            directory_count: 0,
            tracked: 0,
            modified: 0,
            untracked: 0,
            deleted: 0,
            ignored: 0,
            unknown: 0,
            total_size_bytes: 0,
            latest_modified: None,
            status: StageHealth::Empty,
        }
    }
}

/// One summary per configured stage, in stage order.
pub fn summarize(graph: &Graph, stages: &[Stage]) -> Vec<StageSummary> {
    let mut ordered = stages.to_vec();
    ordered.sort_by_key(|s| s.order);

    ordered
        .iter()
        .map(|stage| {
            let mut summary = StageSummary::empty(stage);
            summary.present = graph
                .stage_roots()
                .any(|root| root.stage.as_deref() == Some(stage.name.as_str()));

            for node in graph.nodes.values() {
                if node.synthetic || node.stage.as_deref() != Some(stage.name.as_str()) {
                    continue;
                }
                if node.kind == NodeKind::Directory {
                    summary.directory_count += 1;
                    continue;
                }
                summary.file_count += 1;
                summary.total_size_bytes += node.size_bytes.unwrap_or(0);
                summary.latest_modified = summary.latest_modified.max(node.modified_at);
                match node.tracking_status {
                    TrackingStatus::Tracked => summary.tracked += 1,
                    TrackingStatus::Modified => summary.modified += 1,
                    TrackingStatus::Untracked => summary.untracked += 1,
                    TrackingStatus::Deleted => summary.deleted += 1,
                    TrackingStatus::Ignored => summary.ignored += 1,
                    TrackingStatus::Unknown => summary.unknown += 1,
                }
            }

            summary.status = if summary.file_count == 0 {
                StageHealth::Empty
            } else if summary.tracked + summary.ignored == summary.file_count {
                StageHealth::Clean
            } else {
                StageHealth::Mixed
            };
            summary
        })
        .collect()
}
