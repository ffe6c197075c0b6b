//! File-level change lists from `--raw --numstat -z` output.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::{ChangeKind, FileChange};

#[derive(Debug)]
struct RawEntry {
    status: char,
    path: String,
    old_path: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    insertions: u64,
    deletions: u64,
    binary: bool,
}

/// Parse the NUL-separated raw + numstat output of one commit (or commit
/// pair) into file changes, in the tool's order.
pub fn parse_changes(output: &[u8]) -> Vec<FileChange> {
    let text = String::from_utf8_lossy(output);
    let mut tokens = text
        .split('\0')
        .map(|t| t.trim_start_matches('\n'))
        .filter(|t| !t.is_empty());

    let mut entries: Vec<RawEntry> = Vec::new();
    let mut counts: HashMap<String, Counts> = HashMap::new();
    let mut numstat_order: Vec<String> = Vec::new();

    while let Some(token) = tokens.next() {
        if let Some(meta) = token.strip_prefix(':') {
            let Some(status) = meta
                .split_whitespace()
                .last()
                .and_then(|s| s.chars().next())
            else {
                warn!(entry = %token, "skipping malformed raw diff entry");
                continue;
            };
            let entry = if matches!(status, 'R' | 'C') {
                let (Some(old), Some(new)) = (tokens.next(), tokens.next()) else {
                    warn!(entry = %token, "rename entry is missing its paths");
                    break;
                };
                RawEntry {
                    status,
                    path: new.to_string(),
                    old_path: Some(old.to_string()),
                }
            } else {
                let Some(path) = tokens.next() else {
                    warn!(entry = %token, "raw diff entry is missing its path");
                    break;
                };
                RawEntry {
                    status,
                    path: path.to_string(),
                    old_path: None,
                }
            };
            entries.push(entry);
            continue;
        }

        let mut fields = token.splitn(3, '\t');
        let (Some(added), Some(removed), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            warn!(entry = %token, "skipping unrecognised change entry");
            continue;
        };
        let path = if path.is_empty() {
            // Rename: source and destination follow as separate fields.
            let (Some(_old), Some(new)) = (tokens.next(), tokens.next()) else {
                warn!(entry = %token, "numstat rename is missing its paths");
                break;
            };
            new.to_string()
        } else {
            path.to_string()
        };
        let binary = added == "-" || removed == "-";
        let parsed = Counts {
            insertions: added.parse().unwrap_or(0),
            deletions: removed.parse().unwrap_or(0),
            binary,
        };
        if !counts.contains_key(&path) {
            numstat_order.push(path.clone());
        }
        counts.insert(path, parsed);
    }

    let mut changes: Vec<FileChange> = entries
        .into_iter()
        .map(|entry| {
            let stats = counts.remove(&entry.path);
            FileChange {
                change_kind: change_kind(entry.status, &entry.path),
                insertions: stats.map_or(0, |c| c.insertions),
                deletions: stats.map_or(0, |c| c.deletions),
                binary: stats.is_some_and(|c| c.binary),
                path: entry.path,
                old_path: entry.old_path,
            }
        })
        .collect();

    // Paths reported only by numstat still count as modifications.
    for path in numstat_order {
        if let Some(stats) = counts.remove(&path) {
            changes.push(FileChange {
                path,
                old_path: None,
                change_kind: ChangeKind::Modified,
                insertions: stats.insertions,
                deletions: stats.deletions,
                binary: stats.binary,
            });
        }
    }

    changes
}

fn change_kind(status: char, path: &str) -> ChangeKind {
    match status {
        'A' | 'C' => ChangeKind::Added,
        'M' | 'T' => ChangeKind::Modified,
        'D' => ChangeKind::Deleted,
        'R' => ChangeKind::Renamed,
        other => {
            warn!(path = %path, status = %other, "unexpected change status, treating as modified");
            ChangeKind::Modified
        }
    }
}
