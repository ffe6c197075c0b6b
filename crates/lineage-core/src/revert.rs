//! Undo a prior commit with a new one.
//!
//! The inverse change is staged with `revert --no-commit`; recording it is
//! left to the [`Provisioner`]. If either step fails the in-progress revert
//! is aborted so the working tree returns to HEAD.

use std::sync::Arc;

use lineage_vcs::Revision;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{LineageError, Result};
use crate::lock::DatasetLock;
use crate::provision::Provisioner;
use crate::tool::Tool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertOutcome {
    pub reverted: String,
    pub commit_hash: String,
    pub message: String,
}

pub struct RevertEngine {
    tool: Tool,
    provisioner: Arc<dyn Provisioner>,
    lock: DatasetLock,
}

impl RevertEngine {
    pub fn new(tool: Tool, provisioner: Arc<dyn Provisioner>, lock: DatasetLock) -> Self {
        Self {
            tool,
            provisioner,
            lock,
        }
    }

    pub async fn revert(&self, commit: &Revision, message: Option<&str>) -> Result<RevertOutcome> {
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Revert commit {}", commit.short()));

        let _write = self.lock.write().await;

        if let Err(e) = self.tool.run_checked(&self.tool.git().revert_no_commit(commit)).await {
            self.abort().await;
            return Err(e);
        }

        match self.provisioner.commit(&[], &message).await {
            Ok(commit_hash) => {
                info!(event = "revert.committed", reverted = %commit, commit = %commit_hash);
                Ok(RevertOutcome {
                    reverted: commit.to_string(),
                    commit_hash,
                    message,
                })
            }
            Err(e) => {
                self.abort().await;
                Err(LineageError::Provision(e))
            }
        }
    }

    async fn abort(&self) {
        let abort = self.tool.git().revert_abort();
        match self.tool.run(&abort).await {
            Ok(out) if out.success() => {}
            // Nothing in progress when the revert never started.
            Ok(out) => warn!(exit_code = ?out.exit_code, stderr = %out.stderr.trim(), "revert abort reported failure"),
            Err(e) => warn!(error = %e, "revert abort failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProvisionError;
    use crate::provision::RecordingProvisioner;
    use lineage_vcs::{CommandOutput, GitCommands, ScriptedRunner};
    use std::time::Duration;

    fn engine(
        runner: Arc<ScriptedRunner>,
        provisioner: Arc<RecordingProvisioner>,
    ) -> RevertEngine {
        let git = GitCommands::new("git", "/tmp/ds", Duration::from_secs(5));
        RevertEngine::new(Tool::new(runner, git), provisioner, DatasetLock::default())
    }

    fn rev() -> Revision {
        Revision::parse("abc1234").unwrap()
    }

    #[tokio::test]
    async fn test_revert_stages_then_asks_provisioner() {
        let runner = Arc::new(ScriptedRunner::new().on(&["revert", "--no-commit"], CommandOutput::ok("")));
        let provisioner = Arc::new(RecordingProvisioner::default());
        let outcome = engine(runner.clone(), provisioner.clone())
            .revert(&rev(), None)
            .await
            .unwrap();

        assert_eq!(outcome.reverted, "abc1234");
        assert_eq!(outcome.message, "Revert commit abc1234");
        let calls = provisioner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].paths.is_empty());
        assert_eq!(runner.call_count(&["revert", "--abort"]), 0);
    }

    #[tokio::test]
    async fn test_conflicting_revert_is_aborted() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(
                    &["revert", "--no-commit"],
                    CommandOutput::exited(1, "", "error: could not revert abc1234\n"),
                )
                .on(&["revert", "--abort"], CommandOutput::ok("")),
        );
        let provisioner = Arc::new(RecordingProvisioner::default());
        let err = engine(runner.clone(), provisioner.clone())
            .revert(&rev(), Some("undo"))
            .await
            .unwrap_err();

        assert_eq!(err.operation(), Some("revert"));
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(runner.call_count(&["revert", "--abort"]), 1);
        assert!(provisioner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provisioner_failure_aborts_staged_revert() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&["revert", "--no-commit"], CommandOutput::ok(""))
                .on(&["revert", "--abort"], CommandOutput::ok("")),
        );
        let provisioner =
            Arc::new(RecordingProvisioner::default().failing(ProvisionError::new("locked")));
        let err = engine(runner.clone(), provisioner)
            .revert(&rev(), Some("undo"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::Provision(_)));
        assert_eq!(runner.call_count(&["revert", "--abort"]), 1);
    }
}
