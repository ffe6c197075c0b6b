//! Dataset service facade.
//!
//! A [`Dataset`] binds one guarded root to its configuration, tool runner,
//! lock and provisioner, and exposes every lineage operation as an async
//! method. Read operations hold the dataset's read lock; restore and revert
//! hold the write lock.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use lineage_vcs::{CommandRunner, GitCommands, PathGuard, ResolvedPath, Revision};
use tracing::{debug, warn};

use crate::cache::{self, FingerprintCache};
use crate::changes::parse_changes;
use crate::config::LineageConfig;
use crate::diff::parse_unified_diff;
use crate::domain::{
    Commit, ComparisonReport, DiffHunk, FileChange, Graph, LineageError, ParseError, RawNode,
    RestoreDiagnostics, RestoreRequest, Result,
};
use crate::graph::GraphBuilder;
use crate::history::parse_log;
use crate::lock::DatasetLock;
use crate::obs::{self, DatasetSpan};
use crate::provision::{GitProvisioner, Provisioner};
use crate::restore::{lookup_entry, read_blob, RestoreEngine};
use crate::revert::{RevertEngine, RevertOutcome};
use crate::scan::{self, missing_tracked, Scan, ScanOptions};
use crate::stage::{summarize, StageMapper, StageSummary};
use crate::status::StatusSnapshot;
use crate::tool::{self, Tool};

pub struct Dataset {
    id: String,
    guard: PathGuard,
    config: LineageConfig,
    tool: Tool,
    mapper: StageMapper,
    options: ScanOptions,
    lock: DatasetLock,
    provisioner: Arc<dyn Provisioner>,
    graph_cache: Option<Arc<FingerprintCache<Graph>>>,
}

impl Dataset {
    /// Open the dataset rooted at `root`.
    ///
    /// Commits go through a [`GitProvisioner`] and a private lock is used
    /// unless replaced with [`Dataset::with_provisioner`] and
    /// [`Dataset::with_lock`].
    pub fn open(
        root: impl AsRef<Path>,
        config: LineageConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let guard = PathGuard::new(root)?;
        let git = GitCommands::new(
            config.git_binary.clone(),
            guard.root(),
            config.command_timeout(),
        );
        let tool = Tool::new(runner, git);
        let mapper = StageMapper::new(&config.stages)?;
        let options = ScanOptions::from_config(&config);
        let graph_cache = config
            .cache_enabled
            .then(|| Arc::new(FingerprintCache::new()));

        Ok(Self {
            id: guard.root().display().to_string(),
            provisioner: Arc::new(GitProvisioner::new(tool.clone())),
            guard,
            config,
            tool,
            mapper,
            options,
            lock: DatasetLock::default(),
            graph_cache,
        })
    }

    /// Share a lock handed out by a [`crate::DatasetLocks`] registry.
    pub fn with_lock(mut self, lock: DatasetLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Use a cache shared with other datasets (only when caching is enabled).
    pub fn with_cache(mut self, cache: Arc<FingerprintCache<Graph>>) -> Self {
        if self.config.cache_enabled {
            self.graph_cache = Some(cache);
        }
        self
    }

    /// Canonical root, also used as the dataset id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    pub fn mapper(&self) -> &StageMapper {
        &self.mapper
    }

    /// Status and tracked set as one snapshot.
    ///
    /// A root that is not a repository yields an empty snapshot, so every
    /// entry scans as untracked. Timeouts still fail.
    pub async fn status_snapshot(&self) -> Result<StatusSnapshot> {
        let git = self.tool.git();
        let status = self.tool.run(&git.status(None)).await?;
        if !status.success() {
            let invocation = git.status(None);
            warn!(
                dataset = %self.id,
                error = %tool::failed(&invocation, &status),
                "status unavailable, treating dataset as untracked"
            );
            return Ok(StatusSnapshot::empty());
        }
        let prefix = self.repo_prefix().await?;
        let tracked = self.tool.run_checked(&git.ls_files()).await?;
        Ok(StatusSnapshot::parse_in(&status.stdout, &tracked.stdout, &prefix))
    }

    /// Dataset root relative to the repository top level (`data/`), empty
    /// when the root is the top level.
    async fn repo_prefix(&self) -> Result<String> {
        let output = self.tool.run_checked(&self.tool.git().show_prefix()).await?;
        Ok(output.stdout_text().trim().to_string())
    }

    /// Lazy scan over the live tree. Does not include deleted paths.
    pub fn scan<'a>(&'a self, snapshot: &'a StatusSnapshot) -> Scan<'a> {
        scan::scan(&self.guard, &self.options, snapshot)
    }

    /// Full scan plus `deleted` nodes for tracked paths missing from disk.
    pub fn collect_nodes(&self, snapshot: &StatusSnapshot) -> Vec<RawNode> {
        let mut walk = self.scan(snapshot);
        let mut nodes: Vec<RawNode> = walk.by_ref().collect();
        let unreadable = walk.unreadable();

        let seen: HashSet<String> = nodes.iter().map(|n| n.relative_path.clone()).collect();
        let deleted = missing_tracked(&self.guard, &self.options, snapshot, &seen);
        let injected = deleted.len();
        nodes.extend(deleted);

        obs::emit_scan_finished(&self.id, nodes.len(), unreadable, injected);
        nodes
    }

    /// Build the lineage graph for the current state of the dataset.
    pub async fn build_graph(&self) -> Result<Arc<Graph>> {
        let _span = DatasetSpan::enter(&self.id, "graph");
        let _read = self.lock.read().await;

        let Some(cache) = &self.graph_cache else {
            return Ok(Arc::new(self.build_uncached().await?));
        };

        let head = self.head().await;
        let fingerprint = cache::fingerprint(self.guard.root(), &self.options, head.as_deref());
        if let Some(graph) = cache.get(&self.id, &fingerprint) {
            return Ok(graph);
        }
        let graph = self.build_uncached().await?;
        Ok(cache.insert(&self.id, &fingerprint, graph))
    }

    async fn build_uncached(&self) -> Result<Graph> {
        let snapshot = self.status_snapshot().await?;
        let nodes = self.collect_nodes(&snapshot);
        let mapped = self.mapper.map_to_stages(nodes);
        let graph = GraphBuilder::new(self.mapper.stages()).build(mapped);
        obs::emit_graph_built(
            &self.id,
            graph.nodes.len(),
            graph.edges.len(),
            graph.stage_roots().count(),
        );
        Ok(graph)
    }

    /// Per-stage counts derived from a freshly built graph.
    pub async fn stage_summaries(&self) -> Result<Vec<StageSummary>> {
        let graph = self.build_graph().await?;
        Ok(summarize(&graph, self.mapper.stages()))
    }

    /// Newest-first commit timeline with each commit's changed files.
    ///
    /// A repository without commits has an empty timeline. A change list
    /// that cannot be read leaves that commit's `changed_files` empty.
    pub async fn timeline(&self, limit: Option<usize>) -> Result<Vec<Commit>> {
        let _span = DatasetSpan::enter(&self.id, "timeline");
        let _read = self.lock.read().await;

        let limit = limit.unwrap_or(self.config.history_limit);
        let invocation = self.tool.git().log(limit, None);
        let output = self.tool.run(&invocation).await?;
        if !output.success() {
            if output.stderr.contains("does not have any commits") {
                debug!(dataset = %self.id, "no commits yet");
                return Ok(Vec::new());
            }
            return Err(tool::failed(&invocation, &output));
        }

        let mut commits = parse_log(&output.stdout_text());
        for commit in &mut commits {
            let Ok(rev) = Revision::parse(commit.hash.as_str()) else {
                continue;
            };
            match self.changes_of(&rev).await {
                Ok(changes) => commit.changed_files = changes,
                Err(e) => warn!(commit = %commit.hash, error = %e, "change list unavailable"),
            }
        }
        obs::emit_history_loaded(&self.id, commits.len(), limit);
        Ok(commits)
    }

    /// Commits touching `path`, following renames when possible.
    pub async fn file_history(&self, path: &str, limit: Option<usize>) -> Result<Vec<Commit>> {
        let target = self.guard.resolve_entry(path)?;
        let _read = self.lock.read().await;

        let limit = limit.unwrap_or(self.config.history_limit);
        let git = self.tool.git();
        let followed = self.tool.run_checked(&git.file_log(&target, limit, true)).await?;
        let mut commits = parse_log(&followed.stdout_text());
        if commits.is_empty() {
            let plain = self.tool.run_checked(&git.file_log(&target, limit, false)).await?;
            commits = parse_log(&plain.stdout_text());
        }
        Ok(commits)
    }

    /// File-level changes of one commit against its first parent.
    pub async fn extract_changes(&self, commit: &str) -> Result<Vec<FileChange>> {
        let rev = Revision::parse(commit)?;
        let _read = self.lock.read().await;
        self.changes_of(&rev).await
    }

    async fn changes_of(&self, rev: &Revision) -> Result<Vec<FileChange>> {
        let output = self
            .tool
            .run_checked(&self.tool.git().show_changes(rev))
            .await?;
        Ok(parse_changes(&output.stdout))
    }

    /// Parsed hunks for one file in one commit. Only ever called for a
    /// single user-selected file.
    pub async fn extract_diff(&self, commit: &str, path: &str) -> Result<Vec<DiffHunk>> {
        let rev = Revision::parse(commit)?;
        let target = self.guard.resolve_entry(path)?;
        let _read = self.lock.read().await;

        let output = self
            .tool
            .run_checked(&self.tool.git().show_file_diff(&rev, &target))
            .await?;
        Ok(parse_unified_diff(target.relative(), &output.stdout_text()))
    }

    /// Raw content of `path` as stored at `commit`.
    pub async fn file_at(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let rev = Revision::parse(commit)?;
        let target = self.guard.resolve_entry(path)?;
        let _read = self.lock.read().await;

        let entry = lookup_entry(&self.tool, &rev, &target)
            .await?
            .ok_or_else(|| LineageError::PathNotInCommit {
                path: target.relative().to_string(),
                commit: rev.to_string(),
            })?;
        if !entry.is_blob() {
            return Err(ParseError::new(
                "tree entry",
                format!("{} is a {} at {rev}, not a file", target.relative(), entry.kind),
            )
            .into());
        }
        read_blob(&self.tool, &entry).await
    }

    /// Bring `path` back from `commit` and record it through the provisioner.
    pub async fn restore(&self, path: &str, commit: &str) -> Result<RestoreRequest> {
        let rev = Revision::parse(commit)?;
        let _span = DatasetSpan::enter(&self.id, "restore");
        let request = self.restore_engine().restore(path, &rev).await?;
        self.invalidate_cache();
        Ok(request)
    }

    /// Repeat only the commit step of a restore that failed after writing.
    pub async fn retry_restore_commit(&self, failed: &RestoreRequest) -> Result<RestoreRequest> {
        let _span = DatasetSpan::enter(&self.id, "restore");
        let request = self.restore_engine().retry_commit(failed).await?;
        self.invalidate_cache();
        Ok(request)
    }

    fn restore_engine(&self) -> RestoreEngine {
        RestoreEngine::new(
            self.tool.clone(),
            self.guard.clone(),
            Arc::clone(&self.provisioner),
            self.lock.clone(),
        )
    }

    /// Side-effect-free checks answering "would a restore work?".
    pub async fn restore_diagnostics(&self, path: &str, commit: &str) -> Result<RestoreDiagnostics> {
        let rev = Revision::parse(commit)?;
        let target = self.guard.resolve_entry(path)?;
        let _read = self.lock.read().await;

        let mut problems = Vec::new();
        let commit_exists = self
            .tool
            .run(&self.tool.git().commit_exists(&rev))
            .await?
            .success();
        if !commit_exists {
            problems.push(format!("commit {rev} does not exist"));
        }

        let exists_in_commit = if commit_exists {
            match lookup_entry(&self.tool, &rev, &target).await {
                Ok(Some(entry)) if entry.is_blob() => true,
                Ok(Some(entry)) => {
                    problems.push(format!("{} is a {} at {rev}", target.relative(), entry.kind));
                    false
                }
                Ok(None) => {
                    problems.push(format!("{} does not exist at {rev}", target.relative()));
                    false
                }
                Err(e) => {
                    problems.push(format!("cannot inspect {rev}: {e}"));
                    false
                }
            }
        } else {
            false
        };

        let exists_on_disk = fs::symlink_metadata(target.absolute()).is_ok();
        let tracked = self.is_tracked(&target).await;

        let mut identity_configured = true;
        for key in ["user.name", "user.email"] {
            if self.config_value(key).await.is_none() {
                identity_configured = false;
                problems.push(format!("git {key} is not configured; the restore commit would fail"));
            }
        }

        Ok(RestoreDiagnostics {
            path: target.relative().to_string(),
            commit: rev.to_string(),
            commit_exists,
            exists_in_commit,
            exists_on_disk,
            tracked,
            identity_configured,
            problems,
        })
    }

    async fn is_tracked(&self, target: &ResolvedPath) -> bool {
        let listing = async {
            let prefix = self.repo_prefix().await?;
            let out = self.tool.run_checked(&self.tool.git().ls_files()).await?;
            Ok::<_, LineageError>((prefix, out))
        };
        match listing.await {
            Ok((prefix, out)) => {
                let wanted = format!("{prefix}{}", target.relative());
                out.stdout
                    .split(|b| *b == 0)
                    .any(|p| p == wanted.as_bytes())
            }
            Err(e) => {
                warn!(path = %target, error = %e, "cannot read tracked set");
                false
            }
        }
    }

    /// Non-empty value of a git configuration key.
    async fn config_value(&self, key: &'static str) -> Option<String> {
        let output = self.tool.run(&self.tool.git().config_value(key)).await.ok()?;
        let value = output.stdout_text().trim().to_string();
        (output.success() && !value.is_empty()).then_some(value)
    }

    /// Undo `commit` with a new commit recorded by the provisioner.
    pub async fn revert(&self, commit: &str, message: Option<&str>) -> Result<RevertOutcome> {
        let rev = Revision::parse(commit)?;
        let _span = DatasetSpan::enter(&self.id, "revert");
        let engine = RevertEngine::new(
            self.tool.clone(),
            Arc::clone(&self.provisioner),
            self.lock.clone(),
        );
        let outcome = engine.revert(&rev, message).await?;
        self.invalidate_cache();
        Ok(outcome)
    }

    /// Changes between `commit` and HEAD. `commit` may be any commit-ish
    /// (`HEAD`, a branch, an abbreviated hash); it is resolved first.
    pub async fn compare_to_head(&self, commit: &str) -> Result<ComparisonReport> {
        let rev = Revision::parse(commit)?;
        let _read = self.lock.read().await;
        let git = self.tool.git();

        let resolved = self
            .tool
            .run_checked(&git.resolve_commit(&rev))
            .await?
            .stdout_text()
            .trim()
            .to_string();
        let head = self
            .tool
            .run_checked(&git.rev_parse_head())
            .await?
            .stdout_text()
            .trim()
            .to_string();
        let changes = parse_changes(&self.tool.run_checked(&git.diff_to_head(&rev)).await?.stdout);
        let is_same = head == resolved;

        Ok(ComparisonReport {
            commit: rev.to_string(),
            head,
            is_same,
            changes,
        })
    }

    /// Checked-out branch name, or `HEAD (<short hash>)` when detached.
    pub async fn current_branch(&self) -> Result<String> {
        let _read = self.lock.read().await;
        let git = self.tool.git();
        let branch = self.tool.run_checked(&git.current_branch()).await?;
        let name = branch.stdout_text().trim().to_string();
        if !name.is_empty() {
            return Ok(name);
        }
        let head = self.tool.run_checked(&git.rev_parse_head()).await?;
        let head = head.stdout_text();
        let short: String = head.trim().chars().take(8).collect();
        Ok(format!("HEAD ({short})"))
    }

    async fn head(&self) -> Option<String> {
        match self.tool.run_checked(&self.tool.git().rev_parse_head()).await {
            Ok(out) => Some(out.stdout_text().trim().to_string()),
            Err(e) => {
                debug!(dataset = %self.id, error = %e, "no HEAD");
                None
            }
        }
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.graph_cache {
            cache.invalidate(&self.id);
        }
    }
}
