//! Restore engine: bring one file back from a historical commit.
//!
//! Each run drives a fresh [`RestoreRequest`] through
//! `pending → retrieved → written → committed` and stops at the first
//! failing step. A commit failure leaves the restored file on disk; use
//! [`RestoreEngine::retry_commit`] to repeat only that step.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use lineage_vcs::{lexical_normalize, PathGuard, ResolvedPath, Revision};
use tracing::{debug, warn};

use crate::domain::{LineageError, RestoreRequest, RestoreStatus, Result};
use crate::lock::DatasetLock;
use crate::obs;
use crate::provision::Provisioner;
use crate::tool::Tool;

const MODE_SYMLINK: &str = "120000";
const MODE_EXECUTABLE: &str = "100755";
const MODE_GITLINK: &str = "160000";

/// One `ls-tree` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: String,
    pub object: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Parse the first record of `ls-tree -z` output.
pub fn parse_tree_entry(stdout: &[u8]) -> Option<TreeEntry> {
    let text = String::from_utf8_lossy(stdout);
    let record = text.split('\0').find(|r| !r.trim().is_empty())?;
    let (meta, _path) = record.split_once('\t')?;
    let mut parts = meta.split_whitespace();
    Some(TreeEntry {
        mode: parts.next()?.to_string(),
        kind: parts.next()?.to_string(),
        object: parts.next()?.to_string(),
    })
}

/// Tree entry of `path` at `commit`, or `None` when the path is absent there.
pub(crate) async fn lookup_entry(
    tool: &Tool,
    commit: &Revision,
    path: &ResolvedPath,
) -> Result<Option<TreeEntry>> {
    let output = tool.run_checked(&tool.git().ls_tree(commit, path)).await?;
    Ok(parse_tree_entry(&output.stdout))
}

/// Raw bytes of a blob object.
pub(crate) async fn read_blob(tool: &Tool, entry: &TreeEntry) -> Result<Vec<u8>> {
    let object = Revision::parse(entry.object.as_str())?;
    let output = tool.run_checked(&tool.git().cat_file_blob(&object)).await?;
    Ok(output.stdout)
}

/// Where and why a step stopped.
#[derive(Debug)]
struct StepFailure {
    operation: String,
    message: String,
    exit_code: Option<i32>,
    stderr: Option<String>,
}

impl StepFailure {
    fn new(operation: &str, message: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            message: message.into(),
            exit_code: None,
            stderr: None,
        }
    }

    fn from_error(fallback_operation: &str, err: &LineageError) -> Self {
        Self {
            operation: err.operation().unwrap_or(fallback_operation).to_string(),
            message: err.to_string(),
            exit_code: err.exit_code(),
            stderr: err.stderr().map(str::to_string),
        }
    }
}

/// Content fetched from history, ready to write.
struct Retrieved {
    entry: TreeEntry,
    bytes: Vec<u8>,
}

pub struct RestoreEngine {
    tool: Tool,
    guard: PathGuard,
    provisioner: Arc<dyn Provisioner>,
    lock: DatasetLock,
}

impl RestoreEngine {
    pub fn new(
        tool: Tool,
        guard: PathGuard,
        provisioner: Arc<dyn Provisioner>,
        lock: DatasetLock,
    ) -> Self {
        Self {
            tool,
            guard,
            provisioner,
            lock,
        }
    }

    /// Restore `path` as it was at `commit`.
    ///
    /// Invalid paths and revisions are rejected up front with an error and
    /// no request. Anything that goes wrong later is recorded on the
    /// returned request, which ends `committed` or `failed`.
    pub async fn restore(&self, path: &str, commit: &Revision) -> Result<RestoreRequest> {
        let target = self.guard.resolve_entry(path)?;
        let mut request = RestoreRequest::new(target.relative(), commit.as_str());
        let request_id = request.id.to_string();
        obs::emit_restore_transition(&request_id, &request.path, request.status);

        let _write = self.lock.write().await;

        let retrieved = match self.retrieve(commit, &target).await {
            Ok(r) => r,
            Err(failure) => return self.finish_failed(request, failure),
        };
        self.step(&mut request, RestoreStatus::Retrieved)?;

        if let Err(failure) = write_entry(&self.guard, &target, &retrieved) {
            return self.finish_failed(request, failure);
        }
        self.step(&mut request, RestoreStatus::Written)?;

        self.record(request, &target, commit).await
    }

    /// Repeat only the commit step of a request that failed after writing.
    pub async fn retry_commit(&self, failed: &RestoreRequest) -> Result<RestoreRequest> {
        let request = RestoreRequest::for_commit_retry(failed)?;
        let target = self.guard.resolve_entry(&request.path)?;
        let commit = Revision::parse(request.source_commit_hash.as_str())?;
        obs::emit_restore_transition(&request.id.to_string(), &request.path, request.status);

        let _write = self.lock.write().await;
        self.record(request, &target, &commit).await
    }

    async fn retrieve(
        &self,
        commit: &Revision,
        target: &ResolvedPath,
    ) -> std::result::Result<Retrieved, StepFailure> {
        let entry = lookup_entry(&self.tool, commit, target)
            .await
            .map_err(|e| StepFailure::from_error("ls_tree", &e))?
            .ok_or_else(|| {
                StepFailure::new(
                    "ls_tree",
                    format!("path {} did not exist at commit {commit}", target.relative()),
                )
            })?;

        if entry.mode == MODE_GITLINK {
            return Err(StepFailure::new(
                "ls_tree",
                format!("{} is a submodule at commit {commit}", target.relative()),
            ));
        }
        if !entry.is_blob() {
            return Err(StepFailure::new(
                "ls_tree",
                format!("{} is a directory at commit {commit}", target.relative()),
            ));
        }

        let bytes = read_blob(&self.tool, &entry)
            .await
            .map_err(|e| StepFailure::from_error("cat_file_blob", &e))?;
        debug!(path = %target, bytes = bytes.len(), mode = %entry.mode, "retrieved historical content");
        Ok(Retrieved { entry, bytes })
    }

    async fn record(
        &self,
        mut request: RestoreRequest,
        target: &ResolvedPath,
        commit: &Revision,
    ) -> Result<RestoreRequest> {
        let message = format!("Restore {} from commit {}", target.relative(), commit.short());
        match self
            .provisioner
            .commit(std::slice::from_ref(target), &message)
            .await
        {
            Ok(hash) => {
                request.commit(hash)?;
                obs::emit_restore_transition(
                    &request.id.to_string(),
                    &request.path,
                    request.status,
                );
                Ok(request)
            }
            Err(e) => self.finish_failed(
                request,
                StepFailure {
                    operation: "commit".to_string(),
                    message: e.message,
                    exit_code: e.exit_code,
                    stderr: e.stderr,
                },
            ),
        }
    }

    fn step(&self, request: &mut RestoreRequest, next: RestoreStatus) -> Result<()> {
        request.advance(next)?;
        obs::emit_restore_transition(&request.id.to_string(), &request.path, request.status);
        Ok(())
    }

    fn finish_failed(
        &self,
        mut request: RestoreRequest,
        failure: StepFailure,
    ) -> Result<RestoreRequest> {
        request.fail(
            failure.operation,
            failure.message,
            failure.exit_code,
            failure.stderr,
        )?;
        if let Some(recorded) = &request.failure {
            obs::emit_restore_failed(&request.id.to_string(), &request.path, recorded);
        }
        Ok(request)
    }
}

fn write_entry(
    guard: &PathGuard,
    target: &ResolvedPath,
    retrieved: &Retrieved,
) -> std::result::Result<(), StepFailure> {
    let io_failure =
        |what: &str, e: std::io::Error| StepFailure::new("write", format!("{what}: {e}"));

    let live = target.absolute();
    let parent = live
        .parent()
        .ok_or_else(|| StepFailure::new("write", "target has no parent directory"))?;
    fs::create_dir_all(parent).map_err(|e| io_failure("cannot create parent directory", e))?;

    if let Ok(meta) = fs::symlink_metadata(live) {
        if meta.is_dir() {
            return Err(StepFailure::new(
                "write",
                format!("{} is a directory on disk", target.relative()),
            ));
        }
    }

    if retrieved.entry.mode == MODE_SYMLINK {
        return write_symlink(guard, live, parent, &retrieved.bytes);
    }

    let mut staged = staging_builder(&retrieved.entry.mode)
        .tempfile_in(parent)
        .map_err(|e| io_failure("cannot create temporary file", e))?;
    staged
        .write_all(&retrieved.bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| io_failure("write rejected", e))?;

    staged
        .persist(live)
        .map_err(|e| io_failure("cannot move restored file into place", e.error))?;
    Ok(())
}

/// Temporary-file builder for a restored blob. The mode is passed to
/// `open(2)`, so the process umask applies the same way it does for a
/// checkout: 0666 for regular blobs, 0777 for executable ones.
fn staging_builder(mode: &str) -> tempfile::Builder<'static, 'static> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".lineage-restore");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let bits = if mode == MODE_EXECUTABLE { 0o777 } else { 0o666 };
        builder.permissions(fs::Permissions::from_mode(bits));
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder
}

#[cfg(unix)]
fn write_symlink(
    guard: &PathGuard,
    live: &Path,
    parent: &Path,
    link_bytes: &[u8],
) -> std::result::Result<(), StepFailure> {
    use std::os::unix::ffi::OsStrExt;

    let link_target = Path::new(std::ffi::OsStr::from_bytes(link_bytes));
    let landing = if link_target.is_absolute() {
        lexical_normalize(link_target)
    } else {
        lexical_normalize(&parent.join(link_target))
    };
    if !landing.starts_with(guard.root()) {
        return Err(StepFailure::new(
            "write",
            format!("symlink target {} leaves the dataset", link_target.display()),
        ));
    }

    if fs::symlink_metadata(live).is_ok() {
        fs::remove_file(live)
            .map_err(|e| StepFailure::new("write", format!("cannot replace existing entry: {e}")))?;
    }
    std::os::unix::fs::symlink(link_target, live)
        .map_err(|e| StepFailure::new("write", format!("cannot create symlink: {e}")))?;
    if fs::metadata(live).is_err() {
        warn!(path = %live.display(), "restored placeholder has no local content");
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(
    _guard: &PathGuard,
    _live: &Path,
    _parent: &Path,
    _link_bytes: &[u8],
) -> std::result::Result<(), StepFailure> {
    Err(StepFailure::new(
        "write",
        "symlink entries cannot be restored on this platform",
    ))
}
