//! Tracking-status classification.
//!
//! Raw porcelain codes are mapped once, here, into the closed
//! [`StatusToken`] set. Nothing downstream inspects tool output directly.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::domain::TrackingStatus;

/// Closed vocabulary for the tool's per-path status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusToken {
    Clean,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
    Untracked,
    Ignored,
}

impl StatusToken {
    pub const ALL: [StatusToken; 10] = [
        Self::Clean,
        Self::Modified,
        Self::Added,
        Self::Deleted,
        Self::Renamed,
        Self::Copied,
        Self::TypeChanged,
        Self::Unmerged,
        Self::Untracked,
        Self::Ignored,
    ];

    /// Map a porcelain v1 `XY` pair.
    pub fn from_porcelain(x: char, y: char) -> Self {
        match (x, y) {
            ('?', '?') => Self::Untracked,
            ('!', '!') => Self::Ignored,
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => Self::Unmerged,
            _ => {
                // Worktree state wins over index state; it is what is on disk.
                let code = if y != ' ' { y } else { x };
                match code {
                    'M' => Self::Modified,
                    'A' => Self::Added,
                    'D' => Self::Deleted,
                    'R' => Self::Renamed,
                    'C' => Self::Copied,
                    'T' => Self::TypeChanged,
                    _ => Self::Clean,
                }
            }
        }
    }

    /// The recorded content differs from what the tool last committed.
    pub fn indicates_change(&self) -> bool {
        matches!(
            self,
            Self::Modified
                | Self::Added
                | Self::Deleted
                | Self::Renamed
                | Self::Copied
                | Self::TypeChanged
                | Self::Unmerged
        )
    }
}

/// Total mapping from `(token, tracked, exists)` to a tracking status.
///
/// Precedence: ignored, then tracked-but-missing is deleted, then
/// untracked-on-disk is untracked, then untracked-and-missing is deleted,
/// then a change token is modified, otherwise tracked.
pub fn classify(token: StatusToken, is_tracked: bool, exists_on_disk: bool) -> TrackingStatus {
    if token == StatusToken::Ignored {
        return TrackingStatus::Ignored;
    }
    match (is_tracked, exists_on_disk) {
        (true, false) => TrackingStatus::Deleted,
        (false, true) => TrackingStatus::Untracked,
        (false, false) => TrackingStatus::Deleted,
        (true, true) if token.indicates_change() => TrackingStatus::Modified,
        (true, true) => TrackingStatus::Tracked,
    }
}

/// One dataset's index contents and working-tree status, captured once per
/// request.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    tokens: HashMap<String, StatusToken>,
    ignored_dirs: Vec<String>,
    tracked: HashSet<String>,
    tracked_dirs: HashSet<String>,
    changed_dirs: HashSet<String>,
}

impl StatusSnapshot {
    /// Snapshot for a directory with no version-control record at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `status --porcelain=v1 -z` and `ls-files -z --full-name`
    /// output for a dataset at the repository top level.
    pub fn parse(porcelain: &[u8], ls_files: &[u8]) -> Self {
        Self::parse_in(porcelain, ls_files, "")
    }

    /// Like [`StatusSnapshot::parse`] for a dataset rooted at `prefix`
    /// (`rev-parse --show-prefix`, e.g. `data/`) inside a larger repository.
    /// Both listings are repository-relative; entries outside the prefix
    /// are dropped and the rest are re-keyed relative to the dataset root.
    pub fn parse_in(porcelain: &[u8], ls_files: &[u8], prefix: &str) -> Self {
        let mut snapshot = Self::default();
        let local = |path: String| -> Option<String> {
            if prefix.is_empty() {
                return Some(path);
            }
            path.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
        };

        for path in split_nul(ls_files).into_iter().filter_map(&local) {
            for dir in ancestors(&path) {
                snapshot.tracked_dirs.insert(dir.to_string());
            }
            snapshot.tracked.insert(path);
        }

        let mut entries = split_nul(porcelain).into_iter();
        while let Some(entry) = entries.next() {
            let mut chars = entry.chars();
            let (Some(x), Some(y), Some(' ')) = (chars.next(), chars.next(), chars.next()) else {
                warn!(entry = %entry, "skipping malformed status entry");
                continue;
            };
            let token = StatusToken::from_porcelain(x, y);
            let path = chars.as_str().to_string();
            if matches!(x, 'R' | 'C') {
                // The source path follows as its own NUL-terminated field.
                entries.next();
            }
            let Some(path) = local(path) else {
                continue;
            };

            if token == StatusToken::Ignored && path.ends_with('/') {
                snapshot
                    .ignored_dirs
                    .push(path.trim_end_matches('/').to_string());
                continue;
            }
            if token != StatusToken::Ignored {
                for dir in ancestors(&path) {
                    snapshot.changed_dirs.insert(dir.to_string());
                }
            }
            snapshot.tokens.insert(path, token);
        }

        snapshot
    }

    pub fn token_for(&self, path: &str) -> StatusToken {
        if self.is_under_ignored_dir(path) {
            return StatusToken::Ignored;
        }
        self.tokens.get(path).copied().unwrap_or(StatusToken::Clean)
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.tracked.contains(path)
    }

    pub fn tracked_paths(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Status of a file given whether it is present on disk.
    pub fn classify_file(&self, path: &str, exists_on_disk: bool) -> TrackingStatus {
        classify(self.token_for(path), self.is_tracked(path), exists_on_disk)
    }

    /// Status of a directory, aggregated from everything recorded below it.
    pub fn classify_dir(&self, path: &str) -> TrackingStatus {
        if self.token_for(path) == StatusToken::Ignored {
            return TrackingStatus::Ignored;
        }
        let tracked = self.tracked_dirs.contains(path);
        let changed = self.changed_dirs.contains(path);
        match (tracked, changed) {
            (false, _) => TrackingStatus::Untracked,
            (true, true) => TrackingStatus::Modified,
            (true, false) => TrackingStatus::Tracked,
        }
    }

    fn is_under_ignored_dir(&self, path: &str) -> bool {
        self.ignored_dirs.iter().any(|dir| {
            path == dir
                || path
                    .strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

/// Proper ancestors of a relative path, nearest first.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .char_indices()
        .rev()
        .filter(|(_, c)| *c == '/')
        .map(move |(i, _)| &trimmed[..i])
}
