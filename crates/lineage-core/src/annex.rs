//! Large-file placeholder probing.
//!
//! Annexed files appear in the working tree either as a symlink into
//! `.git/annex/objects/` (locked) or as a small pointer file whose body is
//! `/annex/objects/<key>` (unlocked). In both cases the placeholder's own
//! size is meaningless; the real size comes from the content when present
//! and from the key's `-s<bytes>` field otherwise.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::domain::ContentState;

const OBJECTS_MARKER: &str = "annex/objects/";

/// Pointer files are tiny; anything larger is ordinary content.
const MAX_POINTER_LEN: u64 = 1024;

/// Content state and effective size of one placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnexInfo {
    pub content: ContentState,
    pub size_bytes: Option<u64>,
}

/// Inspect a symlink. `None` when the link is not an annex placeholder.
pub fn read_symlink(path: &Path) -> Option<AnnexInfo> {
    let target = fs::read_link(path).ok()?;
    let target = target.to_string_lossy();
    if !target.contains(OBJECTS_MARKER) {
        return None;
    }

    // `metadata` follows the link: it succeeds only if the content is here.
    let resolved = fs::metadata(path).ok().filter(|m| m.is_file());
    let available = resolved.is_some();
    let size_bytes = resolved
        .map(|m| m.len())
        .or_else(|| key_size(key_from_target(&target)));

    Some(AnnexInfo {
        content: ContentState::Annexed { available },
        size_bytes,
    })
}

/// Inspect a regular file that may be an unlocked pointer file.
pub fn read_pointer_file(path: &Path, len: u64) -> Option<AnnexInfo> {
    if len > MAX_POINTER_LEN {
        return None;
    }
    let mut body = String::new();
    fs::File::open(path)
        .ok()?
        .take(MAX_POINTER_LEN)
        .read_to_string(&mut body)
        .ok()?;
    let line = body.lines().next()?.trim();
    if !line.starts_with('/') || !line.contains(OBJECTS_MARKER) {
        return None;
    }
    Some(AnnexInfo {
        content: ContentState::Annexed { available: false },
        size_bytes: key_size(key_from_target(line)),
    })
}

fn key_from_target(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

/// Size field of an annex key such as `SHA256E-s1048576--9f86d0.csv`.
pub fn key_size(key: &str) -> Option<u64> {
    let fields = key.split("--").next()?;
    fields
        .split('-')
        .skip(1)
        .find_map(|field| field.strip_prefix('s')?.parse().ok())
}
