//! Error types for lineage-vcs

use thiserror::Error;

/// A path failed containment checks against the dataset root.
///
/// Raised before any filesystem access or argument-list construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathEscapeError {
    /// Empty path supplied
    #[error("path is empty")]
    Empty,

    /// Path contains an interior NUL byte
    #[error("path contains a NUL byte")]
    NulByte,

    /// Path resolves outside the dataset root
    #[error("path {path} escapes dataset root {root}")]
    Escapes { root: String, path: String },

    /// Dataset root itself is unusable
    #[error("invalid dataset root {root}: {reason}")]
    InvalidRoot { root: String, reason: String },
}

/// A revision argument was rejected before reaching the tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid revision {value:?}: {reason}")]
pub struct RevisionError {
    pub value: String,
    pub reason: &'static str,
}

/// Errors produced by the tool boundary
#[derive(Error, Debug)]
pub enum VcsError {
    /// Working directory or argument path failed the guard
    #[error(transparent)]
    PathEscape(#[from] PathEscapeError),

    /// Revision argument failed validation
    #[error(transparent)]
    Revision(#[from] RevisionError),

    /// The process could not be started at all
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error while waiting on the child
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tool-boundary operations
pub type VcsResult<T> = std::result::Result<T, VcsError>;
