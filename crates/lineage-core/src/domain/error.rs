//! Domain-level error taxonomy for dataset lineage.

use lineage_vcs::{PathEscapeError, RevisionError, VcsError};

use super::restore::RestoreStatus;

/// A single record, hunk or file could not be parsed.
///
/// Callers log and skip the affected item rather than abort.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error in {context}: {detail}")]
pub struct ParseError {
    pub context: &'static str,
    pub detail: String,
}

impl ParseError {
    pub fn new(context: &'static str, detail: impl Into<String>) -> Self {
        Self {
            context,
            detail: detail.into(),
        }
    }
}

/// Attempted restore transition from a terminal or mismatched state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid restore transition: {from} -> {to}")]
pub struct RestoreStateError {
    pub from: RestoreStatus,
    pub to: RestoreStatus,
}

/// The provisioning collaborator refused to record a change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provisioner failed: {message}")]
pub struct ProvisionError {
    pub message: String,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
}

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            stderr: None,
        }
    }
}

/// Lineage domain errors.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    #[error(transparent)]
    PathEscape(#[from] PathEscapeError),

    #[error(transparent)]
    InvalidRevision(#[from] RevisionError),

    #[error("{operation} timed out after {timeout_ms}ms: {command}")]
    CommandTimeout {
        operation: &'static str,
        command: String,
        timeout_ms: u64,
    },

    #[error("{operation} failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        operation: &'static str,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{path} does not exist in commit {commit}")]
    PathNotInCommit { path: String, commit: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    RestoreState(#[from] RestoreStateError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("tool error: {0}")]
    Tool(VcsError),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VcsError> for LineageError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::PathEscape(e) => Self::PathEscape(e),
            VcsError::Revision(e) => Self::InvalidRevision(e),
            other => Self::Tool(other),
        }
    }
}

impl LineageError {
    /// Name of the failing tool operation, when the error came from one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::CommandTimeout { operation, .. } | Self::CommandFailed { operation, .. } => {
                Some(*operation)
            }
            _ => None,
        }
    }

    /// Exit code of the failing tool invocation, when there was one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            Self::Provision(e) => e.exit_code,
            _ => None,
        }
    }

    /// Captured stderr of the failing tool invocation, when there was one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            Self::Provision(e) => e.stderr.as_deref(),
            _ => None,
        }
    }
}

/// Result type for lineage domain operations.
pub type Result<T> = std::result::Result<T, LineageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display_carries_operation_and_stderr() {
        let err = LineageError::CommandFailed {
            operation: "ls_tree",
            command: "git ls-tree -z abc -- a.csv".to_string(),
            exit_code: Some(128),
            stderr: "fatal: not a tree object".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ls_tree"));
        assert!(msg.contains("128"));
        assert!(msg.contains("not a tree object"));
        assert_eq!(err.operation(), Some("ls_tree"));
        assert_eq!(err.exit_code(), Some(128));
    }

    #[test]
    fn test_path_escape_keeps_its_kind_through_vcs_error() {
        let vcs = VcsError::PathEscape(PathEscapeError::Empty);
        let err: LineageError = vcs.into();
        assert!(matches!(err, LineageError::PathEscape(PathEscapeError::Empty)));
    }

    #[test]
    fn test_restore_state_error_display() {
        let err = RestoreStateError {
            from: RestoreStatus::Committed,
            to: RestoreStatus::Written,
        };
        assert_eq!(err.to_string(), "invalid restore transition: committed -> written");
    }
}
