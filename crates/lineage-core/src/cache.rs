//! Optional fingerprinted cache for built graphs.
//!
//! Entries are keyed by dataset id and stamped with a content fingerprint.
//! A lookup with a different fingerprint drops the entry; nothing is ever
//! patched in place.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::obs;
use crate::scan::ScanOptions;

/// Explicit cache value owned by the service layer.
#[derive(Debug)]
pub struct FingerprintCache<T> {
    entries: Mutex<HashMap<String, (String, Arc<T>)>>,
}

impl<T> Default for FingerprintCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> FingerprintCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `dataset` if it was stored under `fingerprint`.
    ///
    /// A stale entry is removed on the way out.
    pub fn get(&self, dataset: &str, fingerprint: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(dataset) {
            Some((stored, value)) if stored == fingerprint => {
                obs::emit_cache_hit(dataset);
                Some(Arc::clone(value))
            }
            Some(_) => {
                entries.remove(dataset);
                obs::emit_cache_miss(dataset, true);
                None
            }
            None => {
                obs::emit_cache_miss(dataset, false);
                None
            }
        }
    }

    /// Store `value`, replacing whatever `dataset` had before.
    pub fn insert(&self, dataset: &str, fingerprint: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                dataset.to_string(),
                (fingerprint.to_string(), Arc::clone(&value)),
            );
        value
    }

    pub fn invalidate(&self, dataset: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(dataset);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SHA-256 over every directory's mtime (sorted by path, ignored
/// directories pruned) followed by the HEAD commit hash.
pub fn fingerprint(root: &Path, options: &ScanOptions, head: Option<&str>) -> String {
    let mut dirs: Vec<(String, u128)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && options
                    .ignore_dirs
                    .contains(&*entry.file_name().to_string_lossy()))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| {
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            let relative = entry
                .path()
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            (relative, mtime)
        })
        .collect();
    dirs.sort();

    let mut hasher = Sha256::new();
    for (path, mtime) in &dirs {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(mtime.to_le_bytes());
    }
    hasher.update(b"HEAD:");
    hasher.update(head.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}
