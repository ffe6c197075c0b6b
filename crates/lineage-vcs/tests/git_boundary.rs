//! Drives the fixed invocations against a real repository.

use std::path::Path;
use std::process::Command as StdCommand;
use std::time::Duration;

use lineage_vcs::{CommandRunner, GitCommands, PathGuard, ProcessRunner, Revision};

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
    std::fs::create_dir_all(dir.path().join("input")).unwrap();
    std::fs::write(dir.path().join("input/a.csv"), "x,y\n1,2\n").unwrap();
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-q", "-m", "add input"]);
    dir
}

fn boundary(repo: &Path) -> (PathGuard, ProcessRunner, GitCommands) {
    let guard = PathGuard::new(repo).unwrap();
    let runner = ProcessRunner::new(guard.clone());
    let git = GitCommands::new("git", guard.root(), Duration::from_secs(30));
    (guard, runner, git)
}

#[tokio::test]
async fn log_emits_record_separated_fields() {
    let repo = make_git_repo();
    let (_guard, runner, git) = boundary(repo.path());

    let out = runner.run(&git.log(10, None)).await.unwrap();
    assert!(out.success(), "stderr: {}", out.stderr);

    let text = out.stdout_text();
    let records: Vec<&str> = text
        .split(lineage_vcs::LOG_RECORD_SEP)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect();
    assert_eq!(records.len(), 1);
    let fields: Vec<&str> = records[0].split(lineage_vcs::LOG_FIELD_SEP).collect();
    assert_eq!(fields.len(), 7);
    assert_eq!(fields[2], "test-user");
    assert_eq!(fields[5], "add input");
}

#[tokio::test]
async fn blob_lookup_returns_committed_bytes() {
    let repo = make_git_repo();
    let (guard, runner, git) = boundary(repo.path());
    let head = Revision::parse(run_git(repo.path(), &["rev-parse", "HEAD"])).unwrap();
    let path = guard.resolve("input/a.csv").unwrap();

    let tree = runner.run(&git.ls_tree(&head, &path)).await.unwrap();
    assert!(tree.success());
    let entry = tree.stdout_text();
    let (meta, name) = entry.trim_end_matches('\0').split_once('\t').unwrap();
    assert_eq!(name, "input/a.csv");
    let object = meta.split_whitespace().nth(2).unwrap();

    let blob = runner
        .run(&git.cat_file_blob(&Revision::parse(object).unwrap()))
        .await
        .unwrap();
    assert_eq!(blob.stdout, b"x,y\n1,2\n");
}

#[tokio::test]
async fn unknown_commit_is_a_nonzero_exit() {
    let repo = make_git_repo();
    let (_guard, runner, git) = boundary(repo.path());
    let missing = Revision::parse("0123456789abcdef0123456789abcdef01234567").unwrap();

    let out = runner.run(&git.commit_exists(&missing)).await.unwrap();
    assert!(!out.success());
    assert!(!out.timed_out);
}

#[tokio::test]
async fn branch_and_head_queries() {
    let repo = make_git_repo();
    let (_guard, runner, git) = boundary(repo.path());

    let head = runner.run(&git.rev_parse_head()).await.unwrap();
    assert_eq!(head.stdout_text().trim().len(), 40);

    let branch = runner.run(&git.current_branch()).await.unwrap();
    assert!(branch.success());
    assert!(!branch.stdout_text().trim().is_empty());
}
