//! Parsed unified-diff hunks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMarker {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub marker: LineMarker,
    /// Line text without the leading marker character.
    pub text: String,
}

/// One `@@ ... @@` block of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub path: String,
    /// Raw header line as emitted by the tool.
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
    /// Header did not parse; `lines` is empty and the counts are zero.
    pub parse_error: bool,
}

impl DiffHunk {
    pub fn malformed(path: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            header: header.into(),
            old_start: 0,
            old_lines: 0,
            new_start: 0,
            new_lines: 0,
            lines: Vec::new(),
            parse_error: true,
        }
    }

    pub fn added(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.marker == LineMarker::Added)
            .count()
    }

    pub fn removed(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.marker == LineMarker::Removed)
            .count()
    }
}
