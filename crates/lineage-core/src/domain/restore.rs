//! Restore requests and their forward-only lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RestoreStateError;

/// Status of a restore request.
///
/// `Pending → Retrieved → Written → Committed`, with `Failed` reachable from
/// any non-terminal state. `Committed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStatus {
    Pending,
    Retrieved,
    Written,
    Committed,
    Failed,
}

impl RestoreStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// The only forward step out of this state, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Retrieved),
            Self::Retrieved => Some(Self::Written),
            Self::Written => Some(Self::Committed),
            Self::Committed | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrieved => "retrieved",
            Self::Written => "written",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: RestoreStatus,
    pub at: DateTime<Utc>,
}

/// Why and where a restore stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFailure {
    /// Last state reached before failing. `Written` means the file is on
    /// disk but no commit was recorded.
    pub reached: RestoreStatus,
    pub operation: String,
    pub message: String,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
}

/// One restore attempt. Never reused: retry with a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub id: Uuid,
    pub path: String,
    pub source_commit_hash: String,
    pub status: RestoreStatus,
    pub created_at: DateTime<Utc>,
    pub transitions: Vec<Transition>,
    pub failure: Option<RestoreFailure>,
    /// Commit recorded by the provisioner once `Committed`.
    pub commit_hash: Option<String>,
}

impl RestoreRequest {
    pub fn new(path: impl Into<String>, source_commit_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            source_commit_hash: source_commit_hash.into(),
            status: RestoreStatus::Pending,
            created_at: now,
            transitions: vec![Transition {
                status: RestoreStatus::Pending,
                at: now,
            }],
            failure: None,
            commit_hash: None,
        }
    }

    /// A fresh request that only repeats the commit step of `failed`.
    ///
    /// Allowed only when `failed` stopped after its write landed.
    pub fn for_commit_retry(failed: &RestoreRequest) -> Result<Self, RestoreStateError> {
        let reached = failed.failure.as_ref().map(|f| f.reached);
        if failed.status != RestoreStatus::Failed || reached != Some(RestoreStatus::Written) {
            return Err(RestoreStateError {
                from: reached.unwrap_or(failed.status),
                to: RestoreStatus::Written,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            path: failed.path.clone(),
            source_commit_hash: failed.source_commit_hash.clone(),
            status: RestoreStatus::Written,
            created_at: now,
            transitions: vec![Transition {
                status: RestoreStatus::Written,
                at: now,
            }],
            failure: None,
            commit_hash: None,
        })
    }

    /// Step forward to `next`, which must be the current state's successor.
    pub fn advance(&mut self, next: RestoreStatus) -> Result<(), RestoreStateError> {
        if next == RestoreStatus::Failed || !self.status.can_transition_to(next) {
            return Err(RestoreStateError {
                from: self.status,
                to: next,
            });
        }
        self.set(next);
        Ok(())
    }

    /// Record a successful commit and finish.
    pub fn commit(&mut self, commit_hash: impl Into<String>) -> Result<(), RestoreStateError> {
        self.advance(RestoreStatus::Committed)?;
        self.commit_hash = Some(commit_hash.into());
        Ok(())
    }

    /// Stop in `Failed`, remembering the state reached.
    pub fn fail(
        &mut self,
        operation: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: Option<String>,
    ) -> Result<(), RestoreStateError> {
        if self.status.is_terminal() {
            return Err(RestoreStateError {
                from: self.status,
                to: RestoreStatus::Failed,
            });
        }
        self.failure = Some(RestoreFailure {
            reached: self.status,
            operation: operation.into(),
            message: message.into(),
            exit_code,
            stderr,
        });
        self.set(RestoreStatus::Failed);
        Ok(())
    }

    /// Last non-failed state this request reached.
    pub fn reached(&self) -> RestoreStatus {
        match &self.failure {
            Some(f) => f.reached,
            None => self.status,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == RestoreStatus::Committed
    }

    fn set(&mut self, status: RestoreStatus) {
        self.status = status;
        self.transitions.push(Transition {
            status,
            at: Utc::now(),
        });
    }
}

/// Pre-flight checks for a restore, reported without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDiagnostics {
    pub path: String,
    pub commit: String,
    pub commit_exists: bool,
    pub exists_in_commit: bool,
    pub exists_on_disk: bool,
    pub tracked: bool,
    /// `user.name` and `user.email` are both set, so a commit can be made.
    pub identity_configured: bool,
    pub problems: Vec<String>,
}

impl RestoreDiagnostics {
    pub fn can_restore(&self) -> bool {
        self.problems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_strictly_forward() {
        let mut req = RestoreRequest::new("input/a.csv", "abc123");
        req.advance(RestoreStatus::Retrieved).unwrap();
        req.advance(RestoreStatus::Written).unwrap();
        req.commit("def456").unwrap();

        assert!(req.is_committed());
        assert_eq!(req.commit_hash.as_deref(), Some("def456"));
        let seen: Vec<_> = req.transitions.iter().map(|t| t.status).collect();
        assert_eq!(
            seen,
            vec![
                RestoreStatus::Pending,
                RestoreStatus::Retrieved,
                RestoreStatus::Written,
                RestoreStatus::Committed
            ]
        );
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut req = RestoreRequest::new("a", "abc123");
        let err = req.advance(RestoreStatus::Written).unwrap_err();
        assert_eq!(err.from, RestoreStatus::Pending);
        assert_eq!(req.status, RestoreStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut req = RestoreRequest::new("a", "abc123");
        req.fail("ls_tree", "missing", Some(0), None).unwrap();
        assert!(req.advance(RestoreStatus::Retrieved).is_err());
        assert!(req.commit("x").is_err());
        assert!(req.fail("again", "x", None, None).is_err());
        assert_eq!(req.commit_hash, None);
    }

    #[test]
    fn test_failure_records_reached_state() {
        let mut req = RestoreRequest::new("a", "abc123");
        req.advance(RestoreStatus::Retrieved).unwrap();
        req.advance(RestoreStatus::Written).unwrap();
        req.fail("commit", "hook rejected", Some(1), Some("nope".into()))
            .unwrap();
        assert_eq!(req.status, RestoreStatus::Failed);
        assert_eq!(req.reached(), RestoreStatus::Written);
    }

    #[test]
    fn test_commit_retry_only_after_written() {
        let mut written = RestoreRequest::new("a", "abc123");
        written.advance(RestoreStatus::Retrieved).unwrap();
        written.advance(RestoreStatus::Written).unwrap();
        written.fail("commit", "boom", None, None).unwrap();

        let retry = RestoreRequest::for_commit_retry(&written).unwrap();
        assert_ne!(retry.id, written.id);
        assert_eq!(retry.status, RestoreStatus::Written);
        assert_eq!(retry.source_commit_hash, "abc123");

        let mut early = RestoreRequest::new("a", "abc123");
        early.fail("ls_tree", "missing", None, None).unwrap();
        assert!(RestoreRequest::for_commit_retry(&early).is_err());

        let fresh = RestoreRequest::new("a", "abc123");
        assert!(RestoreRequest::for_commit_retry(&fresh).is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RestoreStatus::Committed).unwrap();
        assert_eq!(json, "\"committed\"");
    }
}
