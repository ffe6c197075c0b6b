//! Filesystem scanner.
//!
//! [`Scan`] is a lazy depth-first iterator over the dataset tree. Entries are
//! read and sorted per directory before descending, so no directory handle
//! stays open across recursion, and dropping the iterator early leaks
//! nothing. Ignored directories are pruned before they are entered.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use lineage_vcs::PathGuard;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::annex;
use crate::config::LineageConfig;
use crate::domain::{ContentState, NodeKind, RawNode, TrackingStatus};
use crate::status::StatusSnapshot;

/// Names skipped during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub ignore_dirs: HashSet<String>,
    pub ignore_files: HashSet<String>,
}

impl ScanOptions {
    pub fn from_config(config: &LineageConfig) -> Self {
        Self {
            ignore_dirs: config.ignore_dirs.iter().cloned().collect(),
            ignore_files: config.ignore_files.iter().cloned().collect(),
        }
    }

    /// Whether any segment of `relative_path` is excluded.
    pub fn excludes(&self, relative_path: &str) -> bool {
        let mut segments = relative_path.split('/').peekable();
        while let Some(segment) = segments.next() {
            let last = segments.peek().is_none();
            if self.ignore_dirs.contains(segment) && !last {
                return true;
            }
            if last && self.ignore_files.contains(segment) {
                return true;
            }
        }
        false
    }
}

type Walk<'a> = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>;

/// Lazy scan over one dataset. See the module docs.
pub struct Scan<'a> {
    guard: &'a PathGuard,
    snapshot: &'a StatusSnapshot,
    options: &'a ScanOptions,
    walker: Walk<'a>,
    lookahead: Option<walkdir::Result<DirEntry>>,
    unreadable: usize,
}

/// Start a scan of the dataset guarded by `guard`.
pub fn scan<'a>(
    guard: &'a PathGuard,
    options: &'a ScanOptions,
    snapshot: &'a StatusSnapshot,
) -> Scan<'a> {
    let ignore_dirs = &options.ignore_dirs;
    let walker = WalkDir::new(guard.root())
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(move |entry| {
            !(entry.file_type().is_dir()
                && ignore_dirs.contains(&*entry.file_name().to_string_lossy()))
        })
        .fuse();

    Scan {
        guard,
        snapshot,
        options,
        walker: Box::new(walker),
        lookahead: None,
        unreadable: 0,
    }
}

impl<'a> Scan<'a> {
    /// Subtrees that could not be read so far.
    pub fn unreadable(&self) -> usize {
        self.unreadable
    }

    fn pull(&mut self) -> Option<walkdir::Result<DirEntry>> {
        self.lookahead.take().or_else(|| self.walker.next())
    }

    fn node_for(&self, entry: &DirEntry) -> Option<RawNode> {
        let relative = relative_path(self.guard.root(), entry.path())?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type();

        if !file_type.is_dir() && self.options.ignore_files.contains(&name) {
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(path = %relative, error = %e, "cannot stat entry");
                None
            }
        };
        let modified_at = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        if file_type.is_dir() {
            return Some(RawNode {
                tracking_status: self.snapshot.classify_dir(&relative),
                relative_path: relative,
                name,
                kind: NodeKind::Directory,
                size_bytes: None,
                modified_at,
                content: ContentState::Local,
            });
        }

        let (size_bytes, content) = if file_type.is_symlink() {
            self.symlink_details(entry.path(), &relative)
        } else {
            let len = metadata.as_ref().map(|m| m.len());
            match len.and_then(|len| annex::read_pointer_file(entry.path(), len)) {
                Some(info) => (info.size_bytes, info.content),
                None => (len, ContentState::Local),
            }
        };

        Some(RawNode {
            tracking_status: self.snapshot.classify_file(&relative, true),
            relative_path: relative,
            name,
            kind: NodeKind::File,
            size_bytes,
            modified_at,
            content,
        })
    }

    fn symlink_details(&self, path: &Path, relative: &str) -> (Option<u64>, ContentState) {
        // Annex keys carry their size; the object store may sit above a
        // nested dataset root.
        if let Some(info) = annex::read_symlink(path) {
            return (info.size_bytes, info.content);
        }
        if let Err(e) = self.guard.resolve(relative) {
            warn!(path = %relative, error = %e, "symlink leaves the dataset; size withheld");
            return (None, ContentState::Local);
        }
        (fs::metadata(path).ok().map(|m| m.len()), ContentState::Local)
    }

    fn unreadable_node(&mut self, path: &Path, error: &walkdir::Error) -> Option<RawNode> {
        let relative = relative_path(self.guard.root(), path)?;
        warn!(path = %relative, error = %error, "unreadable subtree");
        self.unreadable += 1;
        Some(RawNode {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            relative_path: relative,
            kind: NodeKind::Directory,
            size_bytes: None,
            modified_at: None,
            tracking_status: TrackingStatus::Unknown,
            content: ContentState::Local,
        })
    }
}

impl<'a> Iterator for Scan<'a> {
    type Item = RawNode;

    fn next(&mut self) -> Option<RawNode> {
        loop {
            match self.pull()? {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        // A directory that cannot be listed is reported by
                        // the walker immediately after the directory itself.
                        match self.walker.next() {
                            Some(Err(err)) if err.path() == Some(entry.path()) => {
                                if let Some(node) = self.unreadable_node(entry.path(), &err) {
                                    return Some(node);
                                }
                                continue;
                            }
                            other => self.lookahead = other,
                        }
                    }
                    if let Some(node) = self.node_for(&entry) {
                        return Some(node);
                    }
                }
                Err(err) => {
                    let dir = err
                        .path()
                        .filter(|p| p.is_dir())
                        .map(Path::to_path_buf);
                    match dir {
                        Some(dir) => {
                            if let Some(node) = self.unreadable_node(&dir, &err) {
                                return Some(node);
                            }
                        }
                        None => warn!(error = %err, "skipping unreadable entry"),
                    }
                }
            }
        }
    }
}

/// Tracked paths the scanner cannot see because they are gone from disk,
/// as `deleted` file nodes plus any vanished parent directories.
pub fn missing_tracked(
    guard: &PathGuard,
    options: &ScanOptions,
    snapshot: &StatusSnapshot,
    seen: &HashSet<String>,
) -> Vec<RawNode> {
    let mut files = BTreeSet::new();
    let mut dirs = BTreeSet::new();

    for path in snapshot.tracked_paths() {
        if seen.contains(path) || options.excludes(path) {
            continue;
        }
        if fs::symlink_metadata(guard.root().join(path)).is_ok() {
            continue;
        }
        files.insert(path.to_string());

        let mut parent = path;
        while let Some((dir, _)) = parent.rsplit_once('/') {
            if seen.contains(dir) || guard.root().join(dir).exists() {
                break;
            }
            dirs.insert(dir.to_string());
            parent = dir;
        }
    }

    let deleted = |path: String, kind: NodeKind| RawNode {
        name: path.rsplit('/').next().unwrap_or(&path).to_string(),
        relative_path: path,
        kind,
        size_bytes: None,
        modified_at: None,
        tracking_status: TrackingStatus::Deleted,
        content: ContentState::Local,
    };

    dirs.into_iter()
        .map(|d| deleted(d, NodeKind::Directory))
        .chain(files.into_iter().map(|f| deleted(f, NodeKind::File)))
        .collect()
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let joined = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    (!joined.is_empty()).then_some(joined)
}
