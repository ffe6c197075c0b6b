//! Lineage - dataset lineage CLI
//!
//! The `lineage` command exposes the lineage engine over one dataset root.
//! Every command prints JSON to stdout; logs go to stderr.
//!
//! ## Commands
//!
//! - `graph`: Build the stage graph (optionally diffed against a saved one)
//! - `stages`: Per-stage summaries
//! - `log` / `file-log`: Commit timeline, for the dataset or one file
//! - `changes` / `diff` / `show`: Inspect one commit
//! - `restore` / `diagnose`: Bring a file back from history
//! - `revert`: Undo a commit
//! - `compare` / `branch`: Relation to HEAD

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lineage_core::{relative_age, Dataset, Graph, LineageConfig, RestoreStatus};
use lineage_vcs::{PathGuard, ProcessRunner};
use serde_json::{json, Value};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "lineage")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lineage graph, history and restore for versioned datasets", long_about = None)]
struct Cli {
    /// Dataset root
    #[arg(long, global = true, env = "LINEAGE_DATASET_ROOT", default_value = ".")]
    root: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true, env = "LINEAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Per-command timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the lineage graph of the working tree
    Graph {
        /// Previously saved graph JSON to diff against
        #[arg(long)]
        delta_against: Option<PathBuf>,
    },

    /// Summarise every configured stage
    Stages,

    /// Show the commit timeline with changed files
    Log {
        /// Maximum number of commits (default: history_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show commits touching one file
    FileLog {
        path: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List files changed by a commit
    Changes { commit: String },

    /// Show parsed hunks for one file in one commit
    Diff { commit: String, path: String },

    /// Write a file's historical content to stdout
    Show { commit: String, path: String },

    /// Restore a file from a previous commit
    Restore {
        path: String,

        /// Commit to restore from
        #[arg(long = "from")]
        from: String,
    },

    /// Check whether a restore would succeed, without changing anything
    Diagnose {
        path: String,

        #[arg(long = "from")]
        from: String,
    },

    /// Undo a commit with a new commit
    Revert {
        commit: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Compare a commit with HEAD
    Compare { commit: String },

    /// Show the current branch
    Branch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    lineage_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.timeout_secs)?;
    let dataset = open_dataset(&cli.root, config)?;

    let output = match cli.command {
        Commands::Graph { delta_against } => cmd_graph(&dataset, delta_against.as_deref()).await,
        Commands::Stages => cmd_stages(&dataset).await,
        Commands::Log { limit } => cmd_log(&dataset, limit).await,
        Commands::FileLog { path, limit } => cmd_file_log(&dataset, &path, limit).await,
        Commands::Changes { commit } => cmd_changes(&dataset, &commit).await,
        Commands::Diff { commit, path } => cmd_diff(&dataset, &commit, &path).await,
        Commands::Show { commit, path } => return cmd_show(&dataset, &commit, &path).await,
        Commands::Restore { path, from } => cmd_restore(&dataset, &path, &from).await,
        Commands::Diagnose { path, from } => cmd_diagnose(&dataset, &path, &from).await,
        Commands::Revert { commit, message } => {
            cmd_revert(&dataset, &commit, message.as_deref()).await
        }
        Commands::Compare { commit } => cmd_compare(&dataset, &commit).await,
        Commands::Branch => cmd_branch(&dataset).await,
    };

    let (value, status) = output?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    if let Some(problem) = status {
        bail!(problem);
    }
    Ok(())
}

/// A command's JSON output plus an optional failure to report after printing.
type CmdOutput = (Value, Option<String>);

fn load_config(path: Option<&Path>, timeout_secs: Option<u64>) -> Result<LineageConfig> {
    let mut config = match path {
        Some(path) => LineageConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LineageConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid LINEAGE_* environment override")?;
    if let Some(secs) = timeout_secs {
        config.command_timeout_secs = secs;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_dataset(root: &Path, config: LineageConfig) -> Result<Dataset> {
    let guard = PathGuard::new(root)
        .with_context(|| format!("Failed to open dataset root {}", root.display()))?;
    let runner = Arc::new(ProcessRunner::new(guard));
    let dataset = Dataset::open(root, config, runner).context("Failed to open dataset")?;
    debug!(dataset = %dataset.id(), "dataset opened");
    Ok(dataset)
}

/// Build the graph, or its delta against a saved graph
async fn cmd_graph(dataset: &Dataset, delta_against: Option<&Path>) -> Result<CmdOutput> {
    let graph = dataset.build_graph().await.context("Failed to build graph")?;
    let digest = graph.content_digest()?;

    let Some(previous_path) = delta_against else {
        let mut value = serde_json::to_value(&*graph)?;
        value["digest"] = json!(digest);
        return Ok((value, None));
    };

    let text = std::fs::read_to_string(previous_path)
        .with_context(|| format!("Failed to read {}", previous_path.display()))?;
    let previous: Graph =
        serde_json::from_str(&text).context("Failed to parse saved graph as JSON")?;
    let delta = graph.delta(&previous);
    Ok((
        json!({
            "digest": digest,
            "previousDigest": previous.content_digest()?,
            "unchanged": delta.is_empty(),
            "delta": delta,
        }),
        None,
    ))
}

async fn cmd_stages(dataset: &Dataset) -> Result<CmdOutput> {
    let summaries = dataset.stage_summaries().await?;
    Ok((serde_json::to_value(summaries)?, None))
}

/// Timeline with a human-friendly age per commit
async fn cmd_log(dataset: &Dataset, limit: Option<usize>) -> Result<CmdOutput> {
    let commits = dataset.timeline(limit).await.context("Failed to read history")?;
    let now = Utc::now();
    let mut entries = Vec::with_capacity(commits.len());
    for commit in &commits {
        let mut value = serde_json::to_value(commit)?;
        value["relativeAge"] = json!(commit.timestamp.map(|ts| relative_age(ts, now)));
        value["shortHash"] = json!(commit.short_hash());
        entries.push(value);
    }
    Ok((Value::Array(entries), None))
}

async fn cmd_file_log(dataset: &Dataset, path: &str, limit: Option<usize>) -> Result<CmdOutput> {
    let commits = dataset.file_history(path, limit).await?;
    Ok((serde_json::to_value(commits)?, None))
}

async fn cmd_changes(dataset: &Dataset, commit: &str) -> Result<CmdOutput> {
    let changes = dataset.extract_changes(commit).await?;
    Ok((serde_json::to_value(changes)?, None))
}

async fn cmd_diff(dataset: &Dataset, commit: &str, path: &str) -> Result<CmdOutput> {
    let hunks = dataset.extract_diff(commit, path).await?;
    Ok((serde_json::to_value(hunks)?, None))
}

/// Raw bytes to stdout, no JSON wrapping
async fn cmd_show(dataset: &Dataset, commit: &str, path: &str) -> Result<()> {
    let bytes = dataset.file_at(commit, path).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

/// Run a restore; a request that did not commit is printed and then reported
async fn cmd_restore(dataset: &Dataset, path: &str, from: &str) -> Result<CmdOutput> {
    let request = dataset.restore(path, from).await?;
    let problem = match (&request.status, &request.failure) {
        (RestoreStatus::Committed, _) => None,
        (_, Some(failure)) => Some(format!(
            "restore of {} stopped after {} ({}): {}",
            request.path, failure.reached, failure.operation, failure.message
        )),
        (status, None) => Some(format!("restore of {} ended in {status}", request.path)),
    };
    Ok((serde_json::to_value(&request)?, problem))
}

async fn cmd_diagnose(dataset: &Dataset, path: &str, from: &str) -> Result<CmdOutput> {
    let diagnostics = dataset.restore_diagnostics(path, from).await?;
    let mut value = serde_json::to_value(&diagnostics)?;
    value["canRestore"] = json!(diagnostics.can_restore());
    Ok((value, None))
}

async fn cmd_revert(dataset: &Dataset, commit: &str, message: Option<&str>) -> Result<CmdOutput> {
    let outcome = dataset
        .revert(commit, message)
        .await
        .with_context(|| format!("Failed to revert {commit}"))?;
    Ok((serde_json::to_value(outcome)?, None))
}

async fn cmd_compare(dataset: &Dataset, commit: &str) -> Result<CmdOutput> {
    let report = dataset.compare_to_head(commit).await?;
    Ok((serde_json::to_value(report)?, None))
}

async fn cmd_branch(dataset: &Dataset) -> Result<CmdOutput> {
    let branch = dataset.current_branch().await?;
    Ok((json!({ "branch": branch }), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        fs::create_dir_all(dir.path().join("input")).unwrap();
        fs::create_dir_all(dir.path().join("results")).unwrap();
        fs::write(dir.path().join("input/a.csv"), "x,y\n1,2\n").unwrap();
        fs::write(dir.path().join("results/r.csv"), "r\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "add data"]);
        dir
    }

    fn dataset(repo: &Path) -> Dataset {
        open_dataset(repo, LineageConfig::default()).unwrap()
    }

    #[test]
    fn test_cli_parses_restore_from() {
        let cli = Cli::try_parse_from(["lineage", "--root", "/data", "restore", "input/a.csv", "--from", "abc123"])
            .unwrap();
        match cli.command {
            Commands::Restore { path, from } => {
                assert_eq!(path, "input/a.csv");
                assert_eq!(from, "abc123");
            }
            _ => panic!("expected restore"),
        }
        assert_eq!(cli.root, PathBuf::from("/data"));
    }

    #[test]
    fn test_timeout_flag_overrides_config() {
        let config = load_config(None, Some(5)).unwrap();
        assert_eq!(config.command_timeout_secs, 5);
        assert!(load_config(None, Some(0)).is_err());
    }

    #[tokio::test]
    async fn test_graph_json_and_delta_against_itself() {
        let repo = make_git_repo();
        let ds = dataset(repo.path());

        let (value, problem) = cmd_graph(&ds, None).await.unwrap();
        assert!(problem.is_none());
        assert!(value["nodes"].as_object().unwrap().len() >= 4);
        assert!(value["edges"].as_array().unwrap().iter().any(|e| e["kind"] == "stage-flow"));

        let saved_dir = tempfile::tempdir().unwrap();
        let saved = saved_dir.path().join("graph.json");
        fs::write(&saved, serde_json::to_string(&value).unwrap()).unwrap();
        let (delta, _) = cmd_graph(&ds, Some(&saved)).await.unwrap();
        assert_eq!(delta["unchanged"], true);
        assert_eq!(delta["digest"], value["digest"]);
    }

    #[tokio::test]
    async fn test_log_includes_relative_age() {
        let repo = make_git_repo();
        let ds = dataset(repo.path());
        let (value, _) = cmd_log(&ds, Some(5)).await.unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0]["relativeAge"].as_str().unwrap().ends_with("ago"));
        assert_eq!(entries[0]["shortHash"].as_str().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_failed_restore_is_printed_and_reported() {
        let repo = make_git_repo();
        let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let ds = dataset(repo.path());

        let (value, problem) = cmd_restore(&ds, "input/never.csv", &head).await.unwrap();
        assert_eq!(value["status"], "failed");
        assert!(problem.unwrap().contains("stopped after pending"));
    }

    #[tokio::test]
    async fn test_diagnose_reports_can_restore() {
        let repo = make_git_repo();
        let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let ds = dataset(repo.path());
        let (value, _) = cmd_diagnose(&ds, "input/a.csv", &head).await.unwrap();
        assert_eq!(value["canRestore"], true);
        assert_eq!(value["existsOnDisk"], true);
    }
}
