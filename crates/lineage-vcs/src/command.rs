//! Fixed argument shapes for every git invocation the lineage engine makes.
//!
//! Nothing here is configurable by end users: paths arrive as
//! [`ResolvedPath`]s (already bounds-checked) and always follow a `--`
//! separator, and revisions arrive as validated [`Revision`]s. Every call
//! runs with `--literal-pathspecs`, so a path names exactly one entry even
//! when it contains `*`, `?`, `[` or a leading `:(`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RevisionError;
use crate::path_guard::ResolvedPath;
use crate::runner::Invocation;

/// Field separator inside one log record (ASCII unit separator).
pub const LOG_FIELD_SEP: char = '\u{1f}';

/// Terminator of one log record (ASCII record separator).
pub const LOG_RECORD_SEP: char = '\u{1e}';

/// Machine-parseable log format: hash, parents, author, email, strict ISO
/// author date, subject, body.
pub const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%an%x1f%ae%x1f%aI%x1f%s%x1f%b%x1e";

/// Maximum accepted revision length.
const MAX_REVISION_LEN: usize = 255;

/// A commit-ish argument safe to hand to git.
///
/// Accepts hashes, `HEAD`, `HEAD~2`, branch names and similar; rejects
/// anything that could be read as an option or a pathspec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn parse(value: impl Into<String>) -> Result<Self, RevisionError> {
        let value = value.into();
        let reject = |reason: &'static str| RevisionError {
            value: value.clone(),
            reason,
        };

        if value.is_empty() {
            return Err(reject("empty"));
        }
        if value.len() > MAX_REVISION_LEN {
            return Err(reject("too long"));
        }
        if value.starts_with('-') {
            return Err(reject("must not start with '-'"));
        }
        if value.contains("..") {
            return Err(reject("ranges are not accepted"));
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || "._/~^@{}-".contains(c);
        if !value.chars().all(allowed) {
            return Err(reject("unexpected character"));
        }
        Ok(Self(value))
    }

    pub fn head() -> Self {
        Self("HEAD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for messages.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds [`Invocation`]s for one dataset.
#[derive(Debug, Clone)]
pub struct GitCommands {
    binary: String,
    root: PathBuf,
    timeout: Duration,
}

impl GitCommands {
    pub fn new(binary: impl Into<String>, root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn invocation(&self, operation: &'static str, args: Vec<String>) -> Invocation {
        let mut full = vec![
            "--no-pager".to_string(),
            "--literal-pathspecs".to_string(),
            "-c".to_string(),
            "core.quotepath=off".to_string(),
        ];
        full.extend(args);
        Invocation {
            operation,
            program: self.binary.clone(),
            args: full,
            working_dir: self.root.clone(),
            timeout: self.timeout,
        }
    }

    /// Commit log in the fixed record format, newest first.
    pub fn log(&self, limit: usize, rev: Option<&Revision>) -> Invocation {
        let mut args = strings(&["log", "--no-color", LOG_FORMAT]);
        args.push("-n".to_string());
        args.push(limit.to_string());
        if let Some(rev) = rev {
            args.push(rev.to_string());
        }
        self.invocation("log", args)
    }

    /// Commit log restricted to one path.
    pub fn file_log(&self, path: &ResolvedPath, limit: usize, follow: bool) -> Invocation {
        let mut args = strings(&["log", "--no-color", LOG_FORMAT]);
        args.push("-n".to_string());
        args.push(limit.to_string());
        if follow {
            args.push("--follow".to_string());
        }
        args.push("--".to_string());
        args.push(path.relative().to_string());
        self.invocation("file_log", args)
    }

    /// Every path recorded in the index, NUL-separated and relative to the
    /// repository top level (the same base `status --porcelain` uses).
    pub fn ls_files(&self) -> Invocation {
        self.invocation("ls_files", strings(&["ls-files", "-z", "--full-name"]))
    }

    /// Location of the dataset root inside its repository, e.g. `data/`;
    /// empty at the top level.
    pub fn show_prefix(&self) -> Invocation {
        self.invocation("show_prefix", strings(&["rev-parse", "--show-prefix"]))
    }

    /// Porcelain v1 status with untracked and ignored entries, NUL-separated.
    pub fn status(&self, path: Option<&ResolvedPath>) -> Invocation {
        let mut args = strings(&[
            "status",
            "--porcelain=v1",
            "-z",
            "--untracked-files=all",
            "--ignored=matching",
        ]);
        if let Some(path) = path.filter(|p| !p.is_root()) {
            args.push("--".to_string());
            args.push(path.relative().to_string());
        }
        self.invocation("status", args)
    }

    /// Raw + numstat change list of one commit against its first parent.
    pub fn show_changes(&self, rev: &Revision) -> Invocation {
        let mut args = strings(&[
            "show",
            "--format=",
            "--no-color",
            "-M",
            "--raw",
            "--numstat",
            "-z",
            "--diff-merges=first-parent",
        ]);
        args.push(rev.to_string());
        self.invocation("show_changes", args)
    }

    /// Unified diff of one path in one commit.
    pub fn show_file_diff(&self, rev: &Revision, path: &ResolvedPath) -> Invocation {
        let mut args = strings(&[
            "show",
            "--format=",
            "--no-color",
            "--no-ext-diff",
            "-M",
            "--diff-merges=first-parent",
        ]);
        args.push(rev.to_string());
        args.push("--".to_string());
        args.push(path.relative().to_string());
        self.invocation("show_file_diff", args)
    }

    /// Tree entry (mode, type, object) of a path at a commit.
    pub fn ls_tree(&self, rev: &Revision, path: &ResolvedPath) -> Invocation {
        let mut args = strings(&["ls-tree", "-z"]);
        args.push(rev.to_string());
        args.push("--".to_string());
        args.push(path.relative().to_string());
        self.invocation("ls_tree", args)
    }

    /// Raw bytes of a blob object.
    pub fn cat_file_blob(&self, object: &Revision) -> Invocation {
        let mut args = strings(&["cat-file", "blob"]);
        args.push(object.to_string());
        self.invocation("cat_file_blob", args)
    }

    /// Exit 0 iff `rev` names a commit.
    pub fn commit_exists(&self, rev: &Revision) -> Invocation {
        let mut args = strings(&["cat-file", "-e"]);
        args.push(format!("{rev}^{{commit}}"));
        self.invocation("commit_exists", args)
    }

    /// Stage the inverse of `rev` without committing.
    pub fn revert_no_commit(&self, rev: &Revision) -> Invocation {
        let mut args = strings(&["revert", "--no-commit", "--no-edit"]);
        args.push(rev.to_string());
        self.invocation("revert", args)
    }

    pub fn revert_abort(&self) -> Invocation {
        self.invocation("revert_abort", strings(&["revert", "--abort"]))
    }

    /// Full hash of the commit `rev` names (branch, tag, `HEAD~1`, prefix).
    pub fn resolve_commit(&self, rev: &Revision) -> Invocation {
        let mut args = strings(&["rev-parse", "--verify", "--quiet"]);
        args.push(format!("{rev}^{{commit}}"));
        self.invocation("resolve_commit", args)
    }

    /// One configuration value; exit 1 when unset.
    pub fn config_value(&self, key: &'static str) -> Invocation {
        let mut args = strings(&["config", "--get"]);
        args.push(key.to_string());
        self.invocation("config_value", args)
    }

    pub fn rev_parse_head(&self) -> Invocation {
        self.invocation("rev_parse_head", strings(&["rev-parse", "--verify", "HEAD"]))
    }

    pub fn current_branch(&self) -> Invocation {
        self.invocation("current_branch", strings(&["branch", "--show-current"]))
    }

    /// Changes between `rev` and HEAD, in the same raw + numstat shape as
    /// [`GitCommands::show_changes`].
    pub fn diff_to_head(&self, rev: &Revision) -> Invocation {
        let mut args = strings(&["diff", "--no-color", "-M", "--raw", "--numstat", "-z"]);
        args.push(rev.to_string());
        args.push("HEAD".to_string());
        self.invocation("diff_to_head", args)
    }

    /// Stage the given paths (used by the git-backed provisioner).
    pub fn add(&self, paths: &[ResolvedPath]) -> Invocation {
        let mut args = strings(&["add", "-A", "--"]);
        args.extend(paths.iter().map(|p| p.relative().to_string()));
        self.invocation("add", args)
    }

    /// Commit exactly the given paths.
    pub fn commit(&self, paths: &[ResolvedPath], message: &str) -> Invocation {
        let mut args = strings(&["commit", "--no-verify", "-m"]);
        args.push(message.to_string());
        args.push("--".to_string());
        args.extend(paths.iter().map(|p| p.relative().to_string()));
        self.invocation("commit", args)
    }

    /// Commit whatever is staged (used after a no-commit revert).
    pub fn commit_staged(&self, message: &str) -> Invocation {
        let mut args = strings(&["commit", "--no-verify", "-m"]);
        args.push(message.to_string());
        self.invocation("commit", args)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
