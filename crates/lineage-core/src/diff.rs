//! Unified-diff hunk parsing.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::domain::{DiffHunk, DiffLine, LineMarker};

const HUNK_HEADER: &str = r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

fn hunk_header() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(HUNK_HEADER).ok()).as_ref()
}

/// A hunk still collecting body lines, with the counts its header promised.
struct OpenHunk {
    hunk: DiffHunk,
    old_left: u32,
    new_left: u32,
}

impl OpenHunk {
    fn new(hunk: DiffHunk) -> Self {
        Self {
            old_left: hunk.old_lines,
            new_left: hunk.new_lines,
            hunk,
        }
    }

    fn is_complete(&self) -> bool {
        self.old_left == 0 && self.new_left == 0
    }

    /// Record one body line; `false` when the header has no room for it.
    fn push(&mut self, marker: LineMarker, text: &str) -> bool {
        let fits = match marker {
            LineMarker::Context => self.old_left > 0 && self.new_left > 0,
            LineMarker::Removed => self.old_left > 0,
            LineMarker::Added => self.new_left > 0,
        };
        if !fits {
            return false;
        }
        if marker != LineMarker::Added {
            self.old_left -= 1;
        }
        if marker != LineMarker::Removed {
            self.new_left -= 1;
        }
        self.hunk.lines.push(DiffLine {
            marker,
            text: text.to_string(),
        });
        true
    }

    /// Close the hunk, flagging it when its body fell short of the header.
    fn finish(mut self) -> DiffHunk {
        if !self.is_complete() {
            warn!(
                path = %self.hunk.path,
                header = %self.hunk.header,
                missing_old = self.old_left,
                missing_new = self.new_left,
                "truncated hunk"
            );
            self.hunk.parse_error = true;
        }
        self.hunk
    }
}

/// Parse unified diff text for `path` into hunks.
///
/// A header that does not match `@@ -a[,b] +c[,d] @@` becomes a hunk with
/// `parse_error` set and no lines; its body is skipped up to the next
/// header. A hunk whose body ends before the line counts in its header
/// keeps the lines it has and is flagged `parse_error`. Binary diffs
/// produce no hunks.
pub fn parse_unified_diff(path: &str, text: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current: Option<OpenHunk> = None;

    for line in text.lines() {
        if line.starts_with("@@") {
            hunks.extend(current.take().map(OpenHunk::finish));
            match parse_header(path, line) {
                Some(hunk) => {
                    let open = OpenHunk::new(hunk);
                    if open.is_complete() {
                        hunks.push(open.finish());
                    } else {
                        current = Some(open);
                    }
                }
                None => {
                    warn!(path = %path, header = %line, "malformed hunk header");
                    hunks.push(DiffHunk::malformed(path, line));
                }
            }
            continue;
        }

        let Some(open) = current.as_mut() else {
            continue;
        };
        let (marker, body) = match line.chars().next() {
            Some(' ') => (LineMarker::Context, &line[1..]),
            Some('+') => (LineMarker::Added, &line[1..]),
            Some('-') => (LineMarker::Removed, &line[1..]),
            // "\ No newline at end of file"
            Some('\\') => continue,
            None => (LineMarker::Context, ""),
            Some(_) => {
                hunks.extend(current.take().map(OpenHunk::finish));
                continue;
            }
        };
        if !open.push(marker, body) {
            hunks.extend(current.take().map(OpenHunk::finish));
            continue;
        }
        if open.is_complete() {
            hunks.extend(current.take().map(OpenHunk::finish));
        }
    }

    hunks.extend(current.map(OpenHunk::finish));
    hunks
}

fn parse_header(path: &str, line: &str) -> Option<DiffHunk> {
    let caps = hunk_header()?.captures(line)?;
    let number = |i: usize, default: u32| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(default),
        }
    };
    Some(DiffHunk {
        path: path.to_string(),
        header: line.to_string(),
        old_start: number(1, 0)?,
        old_lines: number(2, 1)?,
        new_start: number(3, 0)?,
        new_lines: number(4, 1)?,
        lines: Vec::new(),
        parse_error: false,
    })
}
