//! Commit timeline records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One path touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    /// Source path of a rename.
    pub old_path: Option<String>,
    pub change_kind: ChangeKind,
    pub insertions: u64,
    pub deletions: u64,
    /// Line counts are unavailable for binary content.
    pub binary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    /// In the tool's order; the first parent is the mainline.
    pub parent_hashes: Vec<String>,
    pub author: String,
    pub author_email: String,
    /// `None` when the record carried no parseable date.
    pub timestamp: Option<DateTime<Utc>>,
    /// Subject line.
    pub message: String,
    pub body: String,
    pub changed_files: Vec<FileChange>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        &self.hash[..7.min(self.hash.len())]
    }

    pub fn is_merge(&self) -> bool {
        self.parent_hashes.len() > 1
    }
}

/// A historical commit compared with the current HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub commit: String,
    pub head: String,
    pub is_same: bool,
    pub changes: Vec<FileChange>,
}
