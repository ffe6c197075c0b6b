//! End-to-end graph and history behaviour against real repositories.

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;
use std::sync::Arc;

use lineage_core::{
    stage_root_id, ChangeKind, ContentState, Dataset, EdgeKind, LineMarker, LineageConfig, LineageError,
    NodeKind, TrackingStatus,
};
use lineage_vcs::{CommandOutput, PathGuard, ProcessRunner, ScriptedRunner};

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
    dir
}

fn open(repo: &Path) -> Dataset {
    let runner = ProcessRunner::new(PathGuard::new(repo).unwrap());
    Dataset::open(repo, LineageConfig::default(), Arc::new(runner)).unwrap()
}

/// `input/a.csv` (100 bytes, committed) and an empty `output/`.
fn scenario_a() -> tempfile::TempDir {
    let repo = make_git_repo();
    fs::create_dir_all(repo.path().join("input")).unwrap();
    fs::create_dir_all(repo.path().join("output")).unwrap();
    fs::write(repo.path().join("input/a.csv"), vec![b'x'; 100]).unwrap();
    run_git(repo.path(), &["add", "."]);
    run_git(repo.path(), &["commit", "-q", "-m", "add input"]);
    repo
}

#[tokio::test]
async fn graph_for_input_file_and_empty_output_stage() {
    let repo = scenario_a();
    let ds = open(repo.path());

    let graph = ds.build_graph().await.unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.stage_roots().count(), 2);

    let file = graph.node_by_path("input/a.csv").unwrap();
    assert_eq!(file.kind, NodeKind::File);
    assert_eq!(file.size_bytes, Some(100));
    assert_eq!(file.tracking_status, TrackingStatus::Tracked);

    let input_root = stage_root_id("input");
    let output_root = stage_root_id("output");
    let flow: Vec<_> = graph.edges_of_kind(EdgeKind::StageFlow).collect();
    assert_eq!(flow.len(), 1);
    assert_eq!((flow[0].from.as_str(), flow[0].to.as_str()), (input_root.as_str(), output_root.as_str()));

    let containment: Vec<_> = graph.edges_of_kind(EdgeKind::Containment).collect();
    assert_eq!(containment.len(), 1);
    assert_eq!(containment[0].from, input_root);
    assert_eq!(containment[0].to, file.id);
}

#[tokio::test]
async fn rebuilding_an_unchanged_tree_is_identical() {
    let repo = scenario_a();
    fs::create_dir_all(repo.path().join("scripts/lib")).unwrap();
    fs::write(repo.path().join("scripts/lib/run.py"), "print(1)\n").unwrap();
    fs::write(repo.path().join("notes.txt"), "loose\n").unwrap();
    let ds = open(repo.path());

    let first = ds.build_graph().await.unwrap();
    let second = ds.build_graph().await.unwrap();
    assert_eq!(first.nodes.keys().collect::<Vec<_>>(), second.nodes.keys().collect::<Vec<_>>());
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.content_digest().unwrap(), second.content_digest().unwrap());
    assert!(second.delta(&first).is_empty());
}

#[tokio::test]
async fn statuses_reflect_worktree_changes() {
    let repo = scenario_a();
    fs::write(repo.path().join("input/a.csv"), "changed\n").unwrap();
    fs::write(repo.path().join("input/new.csv"), "1\n").unwrap();
    fs::write(repo.path().join(".gitignore"), "*.tmp\n").unwrap();
    fs::write(repo.path().join("input/scratch.tmp"), "tmp\n").unwrap();
    fs::create_dir_all(repo.path().join("output/run1")).unwrap();
    fs::write(repo.path().join("output/run1/r.csv"), "r\n").unwrap();
    run_git(repo.path(), &["add", "output/run1/r.csv"]);
    run_git(repo.path(), &["commit", "-q", "-m", "add result"]);
    fs::remove_file(repo.path().join("output/run1/r.csv")).unwrap();
    fs::remove_dir(repo.path().join("output/run1")).unwrap();

    let ds = open(repo.path());
    let graph = ds.build_graph().await.unwrap();
    let status = |p: &str| graph.node_by_path(p).map(|n| n.tracking_status);

    assert_eq!(status("input/a.csv"), Some(TrackingStatus::Modified));
    assert_eq!(status("input/new.csv"), Some(TrackingStatus::Untracked));
    assert_eq!(status("input/scratch.tmp"), Some(TrackingStatus::Ignored));
    assert_eq!(status("output/run1/r.csv"), Some(TrackingStatus::Deleted));
    assert_eq!(status("output/run1"), Some(TrackingStatus::Deleted));

    let summaries = ds.stage_summaries().await.unwrap();
    let input = summaries.iter().find(|s| s.name == "input").unwrap();
    assert_eq!(input.modified, 1);
    assert_eq!(input.untracked, 1);
    let output = summaries.iter().find(|s| s.name == "output").unwrap();
    assert_eq!(output.deleted, 1);
}

#[tokio::test]
async fn timeline_is_newest_first_and_keeps_merge_parents() {
    let repo = make_git_repo();
    let root = repo.path();
    fs::create_dir_all(root.join("input")).unwrap();
    fs::write(root.join("input/a.csv"), "1\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "first"]);

    run_git(root, &["branch", "feature"]);
    fs::write(root.join("input/b.csv"), "2\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "main work"]);

    run_git(root, &["checkout", "-q", "feature"]);
    fs::create_dir_all(root.join("scripts")).unwrap();
    fs::write(root.join("scripts/run.py"), "print(2)\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "feature work"]);
    run_git(root, &["checkout", "-q", "-"]);
    run_git(root, &["merge", "-q", "--no-ff", "--no-edit", "feature"]);

    let ds = open(root);
    let commits = ds.timeline(Some(10)).await.unwrap();
    assert_eq!(commits.len(), 4);
    assert_eq!(commits[0].parent_hashes.len(), 2);
    assert!(commits[0].is_merge());
    assert_eq!(commits[0].hash, run_git(root, &["rev-parse", "HEAD"]));
    assert_eq!(commits.last().unwrap().message, "first");
    assert!(commits.last().unwrap().parent_hashes.is_empty());
    for pair in commits.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }

    let first = commits.last().unwrap();
    assert_eq!(first.changed_files.len(), 1);
    assert_eq!(first.changed_files[0].path, "input/a.csv");
    assert_eq!(first.changed_files[0].change_kind, ChangeKind::Added);
}

#[tokio::test]
async fn log_record_without_timestamp_does_not_stop_parsing() {
    let h1 = "1".repeat(40);
    let h2 = "2".repeat(40);
    let log = format!(
        "{h1}\x1f{h2}\x1fAda\x1fada@example.com\x1f\x1fundated\x1f\x1e\n\
         {h2}\x1f\x1fAda\x1fada@example.com\x1f2024-01-01T10:00:00Z\x1fdated\x1f\x1e\n"
    );
    let runner = ScriptedRunner::new()
        .on(&["log"], CommandOutput::ok(log))
        .on(&["show"], CommandOutput::ok(""));
    let dir = tempfile::tempdir().unwrap();
    let ds = Dataset::open(dir.path(), LineageConfig::default(), Arc::new(runner)).unwrap();

    let commits = ds.timeline(None).await.unwrap();
    assert_eq!(commits.len(), 2);
    assert!(commits[0].timestamp.is_none());
    assert!(commits[1].timestamp.is_some());
}

#[tokio::test]
async fn changes_and_lazy_diff_for_one_commit() {
    let repo = scenario_a();
    let root = repo.path();
    fs::write(root.join("input/b.csv"), "a\nb\nc\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "add b"]);
    fs::write(root.join("input/b.csv"), "a\nB\nc\nd\n").unwrap();
    run_git(root, &["mv", "input/a.csv", "input/renamed.csv"]);
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "edit b, rename a"]);
    let head = run_git(root, &["rev-parse", "HEAD"]);

    let ds = open(root);
    let changes = ds.extract_changes(&head).await.unwrap();
    let b = changes.iter().find(|c| c.path == "input/b.csv").unwrap();
    assert_eq!(b.change_kind, ChangeKind::Modified);
    assert_eq!((b.insertions, b.deletions), (2, 1));
    let renamed = changes.iter().find(|c| c.path == "input/renamed.csv").unwrap();
    assert_eq!(renamed.change_kind, ChangeKind::Renamed);
    assert_eq!(renamed.old_path.as_deref(), Some("input/a.csv"));

    let hunks = ds.extract_diff(&head, "input/b.csv").await.unwrap();
    assert_eq!(hunks.len(), 1);
    assert!(!hunks[0].parse_error);
    assert_eq!(hunks[0].added(), 2);
    assert!(hunks[0].lines.iter().any(|l| l.marker == LineMarker::Removed && l.text == "b"));
    assert_eq!(hunks, ds.extract_diff(&head, "input/b.csv").await.unwrap());
}

#[tokio::test]
async fn file_history_follows_renames_and_reads_old_content() {
    let repo = scenario_a();
    let root = repo.path();
    let original = run_git(root, &["rev-parse", "HEAD"]);
    run_git(root, &["mv", "input/a.csv", "input/moved.csv"]);
    run_git(root, &["commit", "-q", "-m", "move a"]);

    let ds = open(root);
    let history = ds.file_history("input/moved.csv", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].hash, original);

    let bytes = ds.file_at(&original, "input/a.csv").await.unwrap();
    assert_eq!(bytes, vec![b'x'; 100]);
    let missing = ds.file_at(&original, "input/moved.csv").await.unwrap_err();
    assert!(matches!(missing, LineageError::PathNotInCommit { .. }));
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected() {
    let repo = scenario_a();
    let ds = open(repo.path());
    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);

    for bad in ["../etc/passwd", "/etc/passwd", "input/../../x"] {
        let err = ds.extract_diff(&head, bad).await.unwrap_err();
        assert!(matches!(err, LineageError::PathEscape(_)), "{bad}: {err}");
    }
}

#[tokio::test]
async fn branch_and_comparison_with_head() {
    let repo = scenario_a();
    let root = repo.path();
    let first = run_git(root, &["rev-parse", "HEAD"]);
    fs::write(root.join("input/b.csv"), "b\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "add b"]);
    let branch = run_git(root, &["rev-parse", "--abbrev-ref", "HEAD"]);

    let ds = open(root);
    assert_eq!(ds.current_branch().await.unwrap(), branch);

    let report = ds.compare_to_head(&first).await.unwrap();
    assert!(!report.is_same);
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].path, "input/b.csv");

    let head = run_git(root, &["rev-parse", "HEAD"]);
    assert!(ds.compare_to_head(&head).await.unwrap().is_same);

    for name in ["HEAD", branch.as_str(), &head[..10]] {
        let report = ds.compare_to_head(name).await.unwrap();
        assert!(report.is_same, "{name} should resolve to HEAD");
        assert!(report.changes.is_empty());
    }
    assert!(!ds.compare_to_head("HEAD~1").await.unwrap().is_same);

    run_git(root, &["checkout", "-q", "--detach", &first]);
    let detached = ds.current_branch().await.unwrap();
    assert_eq!(detached, format!("HEAD ({})", &first[..8]));
}

#[cfg(unix)]
#[tokio::test]
async fn dropped_annex_placeholder_keeps_key_size_and_tracked_status() {
    let repo = make_git_repo();
    let root = repo.path();
    fs::create_dir_all(root.join("input")).unwrap();
    std::os::unix::fs::symlink(
        "../.git/annex/objects/Pk/3W/SHA256E-s1234--abc.bin/SHA256E-s1234--abc.bin",
        root.join("input/big.bin"),
    )
    .unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-q", "-m", "add placeholder"]);

    let graph = open(root).build_graph().await.unwrap();
    let node = graph.node_by_path("input/big.bin").unwrap();
    assert_eq!(node.kind, NodeKind::File);
    assert_eq!(node.content, ContentState::Annexed { available: false });
    assert_eq!(node.size_bytes, Some(1234));
    assert_eq!(node.tracking_status, TrackingStatus::Tracked);
}

#[tokio::test]
async fn dataset_in_a_repository_subdirectory_classifies_by_dataset_path() {
    let repo = make_git_repo();
    let top = repo.path();
    fs::create_dir_all(top.join("data/input")).unwrap();
    fs::write(top.join("data/input/a.csv"), "a\n").unwrap();
    fs::write(top.join("data/input/b.csv"), "b\n").unwrap();
    fs::write(top.join("notes.txt"), "n\n").unwrap();
    run_git(top, &["add", "."]);
    run_git(top, &["commit", "-q", "-m", "nested dataset"]);
    fs::write(top.join("data/input/b.csv"), "changed\n").unwrap();
    fs::write(top.join("data/input/new.csv"), "new\n").unwrap();

    let graph = open(&top.join("data")).build_graph().await.unwrap();
    let status = |path: &str| graph.node_by_path(path).unwrap().tracking_status;
    assert_eq!(status("input/a.csv"), TrackingStatus::Tracked);
    assert_eq!(status("input/b.csv"), TrackingStatus::Modified);
    assert_eq!(status("input/new.csv"), TrackingStatus::Untracked);
    assert!(graph.node_by_path("notes.txt").is_none());
}
