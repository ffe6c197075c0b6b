//! Path containment for everything that touches a dataset.
//!
//! [`PathGuard::resolve`] is the only way to obtain a [`ResolvedPath`], and
//! every git invocation that names a path takes a `&ResolvedPath`. A crafted
//! filename therefore cannot reach the filesystem or an argument list without
//! passing through here first.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::PathEscapeError;

/// Symlink hops followed before a path is treated as escaping.
const MAX_LINK_HOPS: usize = 40;

/// A path proven to live inside the dataset root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ResolvedPath {
    /// Location under the root (symlinks in the final component are not followed).
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// `/`-separated path relative to the root; empty for the root itself.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Last path segment (empty for the root).
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.relative)
        }
    }
}

/// Bounds-checks user paths against one dataset root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Canonical root (symlinks resolved).
    root: PathBuf,
    /// Root as declared by the caller, lexically normalised.
    declared: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathEscapeError> {
        let root = root.as_ref();
        let invalid = |reason: String| PathEscapeError::InvalidRoot {
            root: root.display().to_string(),
            reason,
        };

        let canonical = fs::canonicalize(root).map_err(|e| invalid(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }

        let declared = if root.is_absolute() {
            lexical_normalize(root)
        } else {
            let cwd = std::env::current_dir().map_err(|e| invalid(e.to_string()))?;
            lexical_normalize(&cwd.join(root))
        };

        Ok(Self {
            root: canonical,
            declared,
        })
    }

    /// Canonical dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` (relative to the root, or absolute) and verify it
    /// stays inside the root, including through symbolic links.
    pub fn resolve(&self, user_path: impl AsRef<Path>) -> Result<ResolvedPath, PathEscapeError> {
        let user_path = user_path.as_ref();
        let raw = user_path.as_os_str();
        if raw.is_empty() {
            return Err(PathEscapeError::Empty);
        }
        if raw.to_string_lossy().contains('\0') {
            return Err(PathEscapeError::NulByte);
        }

        let relative = self.lexical_relative(user_path)?;
        self.check_links(&relative, user_path)?;

        let mut absolute = self.root.clone();
        absolute.extend(&relative);
        let relative = relative
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(ResolvedPath { absolute, relative })
    }

    /// Resolve a path that must name an entry below the root (not the root).
    pub fn resolve_entry(
        &self,
        user_path: impl AsRef<Path>,
    ) -> Result<ResolvedPath, PathEscapeError> {
        let resolved = self.resolve(user_path)?;
        if resolved.is_root() {
            return Err(PathEscapeError::Empty);
        }
        Ok(resolved)
    }

    /// Strip the root prefix and fold `.`/`..` without touching the disk.
    fn lexical_relative(&self, user_path: &Path) -> Result<Vec<std::ffi::OsString>, PathEscapeError> {
        let joined = if user_path.is_absolute() {
            let normalized = lexical_normalize(user_path);
            if let Ok(rest) = normalized.strip_prefix(&self.root) {
                return Ok(segments(rest));
            }
            if let Ok(rest) = normalized.strip_prefix(&self.declared) {
                return Ok(segments(rest));
            }
            return Err(self.escape(user_path));
        } else {
            user_path.to_path_buf()
        };

        let mut stack: Vec<std::ffi::OsString> = Vec::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(self.escape(user_path));
                    }
                }
                Component::Normal(part) => stack.push(part.to_os_string()),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(self.escape(user_path));
                }
            }
        }
        Ok(stack)
    }

    /// Walk the path one segment at a time and make sure no symbolic link
    /// hops outside the root. Missing segments are accepted as-is.
    fn check_links(&self, relative: &[std::ffi::OsString], original: &Path) -> Result<(), PathEscapeError> {
        let mut current = self.root.clone();
        for part in relative {
            let next = current.join(part);
            current = self.follow(next, original, 0)?;
        }
        Ok(())
    }

    fn follow(&self, path: PathBuf, original: &Path, hops: usize) -> Result<PathBuf, PathEscapeError> {
        if hops > MAX_LINK_HOPS {
            return Err(self.escape(original));
        }
        let is_link = fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return Ok(path);
        }

        let target = fs::read_link(&path).map_err(|_| self.escape(original))?;
        let parent = path.parent().unwrap_or(&self.root);
        let joined = if target.is_absolute() {
            lexical_normalize(&target)
        } else {
            lexical_normalize(&parent.join(target))
        };
        if !joined.starts_with(&self.root) && !joined.starts_with(&self.declared) {
            return Err(self.escape(original));
        }
        // Dangling links (e.g. large-file placeholders whose content was
        // dropped) stay lexical; live ones continue through the chain.
        self.follow(joined, original, hops + 1)
    }

    fn escape(&self, path: &Path) -> PathEscapeError {
        PathEscapeError::Escapes {
            root: self.root.display().to_string(),
            path: path.display().to_string(),
        }
    }
}

fn segments(path: &Path) -> Vec<std::ffi::OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            _ => None,
        })
        .collect()
}

/// Fold `.` and `..` components without consulting the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
