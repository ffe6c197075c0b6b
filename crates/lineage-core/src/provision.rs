//! The "record a change" collaborator.
//!
//! The core never commits on its own. Restore and revert hand their paths to
//! a [`Provisioner`], which owns the actual commit (and whatever hooks,
//! annexing or signing the deployment wants around it).

use std::sync::Mutex;

use async_trait::async_trait;
use lineage_vcs::ResolvedPath;
use tracing::debug;

use crate::domain::{LineageError, ProvisionError};
use crate::tool::Tool;

/// Records changes to a dataset as new commits.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Commit `paths` with `message` and return the new commit hash.
    ///
    /// An empty `paths` slice means "commit whatever is already staged".
    async fn commit(&self, paths: &[ResolvedPath], message: &str) -> Result<String, ProvisionError>;
}

/// Provisioner backed by plain `git add` + `git commit`.
#[derive(Clone)]
pub struct GitProvisioner {
    tool: Tool,
}

impl GitProvisioner {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    async fn step(&self, invocation: &lineage_vcs::Invocation) -> Result<String, ProvisionError> {
        let output = self
            .tool
            .run_checked(invocation)
            .await
            .map_err(provision_error)?;
        Ok(output.stdout_text())
    }
}

#[async_trait]
impl Provisioner for GitProvisioner {
    async fn commit(&self, paths: &[ResolvedPath], message: &str) -> Result<String, ProvisionError> {
        let git = self.tool.git();
        if paths.is_empty() {
            self.step(&git.commit_staged(message)).await?;
        } else {
            self.step(&git.add(paths)).await?;
            self.step(&git.commit(paths, message)).await?;
        }
        let hash = self.step(&git.rev_parse_head()).await?.trim().to_string();
        debug!(commit = %hash, paths = paths.len(), "provisioner recorded commit");
        Ok(hash)
    }
}

fn provision_error(err: LineageError) -> ProvisionError {
    ProvisionError {
        message: err.to_string(),
        exit_code: err.exit_code(),
        stderr: err.stderr().map(str::to_string),
    }
}

/// One call received by [`RecordingProvisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub paths: Vec<String>,
    pub message: String,
}

/// In-memory provisioner (testing only).
///
/// Records every request and answers with a fixed hash, or with the
/// configured error when set to fail.
#[derive(Debug)]
pub struct RecordingProvisioner {
    hash: String,
    failure: Mutex<Option<ProvisionError>>,
    calls: Mutex<Vec<RecordedCommit>>,
}

impl Default for RecordingProvisioner {
    fn default() -> Self {
        Self::new("0123456789abcdef0123456789abcdef01234567")
    }
}

impl RecordingProvisioner {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every subsequent commit with `error`.
    pub fn failing(self, error: ProvisionError) -> Self {
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    /// Stop failing.
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<RecordedCommit> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn commit(&self, paths: &[ResolvedPath], message: &str) -> Result<String, ProvisionError> {
        self.calls.lock().unwrap().push(RecordedCommit {
            paths: paths.iter().map(|p| p.relative().to_string()).collect(),
            message: message.to_string(),
        });
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(self.hash.clone()),
        }
    }
}
