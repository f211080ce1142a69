//! Integration tests for the strata CLI.
//!
//! Each test builds a real repository in a temp directory and drives the
//! binary end-to-end.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;
use tempfile::TempDir;

/// Create a git repository on branch `main` with an initial commit.
fn setup_git_repo() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");

    git(&temp, &["init", "--initial-branch=main"]);
    git(&temp, &["config", "user.email", "test@example.com"]);
    git(&temp, &["config", "user.name", "Test User"]);
    git(&temp, &["config", "core.editor", "true"]);

    fs::write(temp.path().join("README.md"), "# Test Repo\n").expect("Failed to write README");
    git(&temp, &["add", "."]);
    git(&temp, &["commit", "-m", "initial commit"]);

    temp
}

fn git(dir: &TempDir, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(dir: &TempDir, file: &str, content: &str, msg: &str) {
    fs::write(dir.path().join(file), content).expect("Failed to write file");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", msg]);
}

fn strata(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_strata"));
    cmd.current_dir(dir);
    // Keep the provider out of these tests.
    cmd.env_remove("GITHUB_TOKEN");
    cmd.env_remove("STRATA_GITHUB_TOKEN");
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn version_and_help() {
    let temp = setup_git_repo();
    strata(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata"));

    strata(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("restack"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("reorder"))
        .stdout(predicate::str::contains("adopt"));
}

#[test]
fn init_creates_database() {
    let temp = setup_git_repo();

    strata(&temp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized strata"));

    assert!(temp.path().join(".git/strata/strata.db").exists());

    // Idempotent.
    strata(&temp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn commands_require_init() {
    let temp = setup_git_repo();
    strata(&temp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("strata init"));
}

#[test]
fn branch_records_parent() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    strata(&temp)
        .args(["branch", "feature-one"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created 'feature-one' on 'main'"));
    commit_file(&temp, "one.txt", "1\n", "one: work");

    strata(&temp)
        .args(["branch", "feature-two"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "created 'feature-two' on 'feature-one'",
        ));

    let db = fs::read_to_string(temp.path().join(".git/strata/strata.db")).unwrap();
    assert!(db.contains("\"feature-one\""));
    assert!(db.contains("\"feature-two\""));
}

#[test]
fn adopt_infers_stack_shape() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    // Branches created with plain git.
    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: a");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "b.txt", "b\n", "two: b");

    strata(&temp)
        .args(["adopt", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'one' stacks on 'main'"))
        .stdout(predicate::str::contains("'two' stacks on 'one'"))
        .stdout(predicate::str::contains("adopted 2 branch(es)"));

    // Re-running adopts nothing.
    strata(&temp)
        .args(["adopt", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to adopt"));
}

#[test]
#[serial]
fn restack_moves_child_after_parent_amend() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: a");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "b.txt", "b\n", "two: b");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    // Parent grows a commit; child must be replayed on top.
    git(&temp, &["checkout", "one"]);
    commit_file(&temp, "a.txt", "a2\n", "one: more");
    git(&temp, &["checkout", "two"]);

    strata(&temp)
        .arg("restack")
        .assert()
        .success()
        .stdout(predicate::str::contains("restacked 1 branch(es)"));

    // two now descends from one's tip, carrying exactly one commit.
    let one_tip = git(&temp, &["rev-parse", "one"]);
    let merge_base = git(&temp, &["merge-base", "one", "two"]);
    assert_eq!(one_tip, merge_base);
    let own = git(&temp, &["rev-list", "--count", "one..two"]);
    assert_eq!(own, "1");

    // Second restack is a no-op.
    strata(&temp)
        .arg("restack")
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
}

#[test]
#[serial]
fn restack_conflict_suspends_and_continues() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "shared.txt", "from one\n", "one: shared");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "shared.txt", "from two\n", "two: shared");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    git(&temp, &["checkout", "one"]);
    commit_file(&temp, "shared.txt", "one again\n", "one: conflicting");

    strata(&temp)
        .arg("restack")
        .assert()
        .failure()
        .stdout(predicate::str::contains("strata restack --continue"));

    assert!(temp.path().join(".git/strata/restack.state.json").exists());

    // Starting another operation is refused while suspended.
    strata(&temp)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in progress"));

    // Resolve and continue.
    fs::write(temp.path().join("shared.txt"), "resolved\n").unwrap();
    git(&temp, &["add", "-A"]);
    strata(&temp)
        .args(["restack", "--continue"])
        .assert()
        .success();

    assert!(!temp.path().join(".git/strata/restack.state.json").exists());
    let own = git(&temp, &["rev-list", "--count", "one..two"]);
    assert_eq!(own, "1");
}

#[test]
#[serial]
fn restack_abort_restores_everything() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "shared.txt", "from one\n", "one: shared");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "shared.txt", "from two\n", "two: shared");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    git(&temp, &["checkout", "one"]);
    commit_file(&temp, "shared.txt", "one again\n", "one: conflicting");
    let two_before = git(&temp, &["rev-parse", "two"]);

    strata(&temp).arg("restack").assert().failure();
    strata(&temp)
        .args(["restack", "--abort"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aborted"));

    assert_eq!(git(&temp, &["rev-parse", "two"]), two_before);
    assert_eq!(git(&temp, &["branch", "--show-current"]), "one");
    assert!(!temp.path().join(".git/strata/restack.state.json").exists());
}

#[test]
#[serial]
fn sync_without_remote_restacks_locally() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: a");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    strata(&temp)
        .args(["sync", "--no-fetch", "--push", "no", "--prune", "no"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn tidy_drops_deleted_branch_records() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: a");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "b.txt", "b\n", "two: b");
    git(&temp, &["checkout", "-b", "three"]);
    commit_file(&temp, "c.txt", "c\n", "three: c");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    git(&temp, &["checkout", "one"]);
    git(&temp, &["branch", "-D", "two"]);

    strata(&temp)
        .arg("tidy")
        .assert()
        .success()
        .stdout(predicate::str::contains("removed 1 stale record"))
        .stdout(predicate::str::contains("'three' now stacks on 'one'"));

    let db = fs::read_to_string(temp.path().join(".git/strata/strata.db")).unwrap();
    assert!(!db.contains("\"two\""));
}

#[test]
fn status_renders_tree_and_json() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: a");
    git(&temp, &["checkout", "-b", "two"]);
    commit_file(&temp, "b.txt", "b\n", "two: b");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    strata(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("main (trunk)"))
        .stdout(predicate::str::contains("one"))
        .stdout(predicate::str::contains("two"));

    let output = strata(&temp)
        .args(["status", "--json"])
        .output()
        .expect("failed to run status --json");
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "one");
    assert_eq!(rows[0]["parent"], "main");
    assert_eq!(rows[1]["name"], "two");
}

#[test]
#[serial]
fn reorder_drops_a_commit_via_fake_editor() {
    let temp = setup_git_repo();
    strata(&temp).arg("init").assert().success();

    git(&temp, &["checkout", "-b", "one"]);
    commit_file(&temp, "a.txt", "a\n", "one: keep");
    commit_file(&temp, "b.txt", "b\n", "one: drop");
    strata(&temp).args(["adopt", "--yes"]).assert().success();

    // An "editor" that deletes the plan line containing "drop"'s commit.
    let drop_oid = git(&temp, &["rev-parse", "HEAD"]);
    let editor = temp.path().join("fake-editor.sh");
    fs::write(
        &editor,
        format!("#!/bin/sh\ngrep -v \"{}\" \"$1\" > \"$1.tmp\" && mv \"$1.tmp\" \"$1\"\n",
            &drop_oid[..12]),
    )
    .unwrap();
    make_executable(&editor);

    strata(&temp)
        .arg("reorder")
        .env("GIT_EDITOR", editor.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("reorder complete"));

    let count = git(&temp, &["rev-list", "--count", "main..one"]);
    assert_eq!(count, "1");
    let log = git(&temp, &["log", "--format=%s", "main..one"]);
    assert!(log.contains("one: keep"));
    assert!(!log.contains("one: drop"));
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
