//! Shared fixtures for the integration tests: a deterministic git
//! environment (fixed author/committer identities, no system/global config
//! leaking in) and small helpers for building throwaway repos.
#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::HashMap;
use std::path::Path;

/// Environment variables that pin git's author/committer identity and
/// isolate it from the host's global/system config, so commit shas and
/// `.gitrepo` contents are reproducible across runs and machines.
pub fn deterministic_env() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("GIT_AUTHOR_NAME", "Test Author"),
        ("GIT_AUTHOR_EMAIL", "author@no.example"),
        ("GIT_AUTHOR_DATE", "2023-01-02T03:04:05Z"),
        ("GIT_COMMITTER_NAME", "Test Committer"),
        ("GIT_COMMITTER_EMAIL", "committer@no.example"),
        ("GIT_COMMITTER_DATE", "2023-01-02T03:04:05Z"),
        ("GIT_CONFIG_NOSYSTEM", "1"),
        ("GIT_CONFIG_GLOBAL", "/dev/null"),
        ("GIT_TERMINAL_PROMPT", "0"),
        ("HOME", "/dev/null"),
    ])
}

pub fn git(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir);
    cmd.envs(deterministic_env());
    cmd
}

pub fn subrepo(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("git-subrepo").unwrap();
    cmd.current_dir(dir);
    cmd.envs(deterministic_env());
    cmd
}

/// Initializes a git repository at `dir` with an initial commit on `main`,
/// returning the sha of that commit.
pub fn init_repo(dir: &Path) -> String {
    std::fs::create_dir_all(dir).unwrap();
    git(dir)
        .args(["init", "--quiet", "--initial-branch", "main"])
        .assert()
        .success();
    git(dir)
        .args(["commit", "--allow-empty", "--quiet", "-m", "Initial commit"])
        .assert()
        .success();
    rev_parse(dir, "HEAD")
}

/// Writes `path` (relative to `dir`) with `contents`, `git add`s it and
/// commits with `message`, returning the new commit's sha.
pub fn commit_file(dir: &Path, path: &str, contents: &str, message: &str) -> String {
    let full_path = dir.join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full_path, contents).unwrap();
    git(dir).args(["add", path]).assert().success();
    git(dir)
        .args(["commit", "--quiet", "-m", message])
        .assert()
        .success();
    rev_parse(dir, "HEAD")
}

pub fn rev_parse(dir: &Path, revision: &str) -> String {
    let output = git(dir)
        .args(["rev-parse", "--verify", revision])
        .output()
        .unwrap();
    assert!(output.status.success(), "rev-parse {revision} failed");
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

/// Creates a bare repository at `bare_dir` seeded from a scratch working
/// clone, so it can be pushed to (a non-bare repo with `main` checked out
/// refuses a push that updates the checked-out branch).
pub fn init_bare_upstream(bare_dir: &Path, scratch_dir: &Path) -> String {
    git(bare_dir.parent().unwrap())
        .args([
            "init",
            "--quiet",
            "--bare",
            "--initial-branch",
            "main",
            bare_dir.to_str().unwrap(),
        ])
        .assert()
        .success();
    std::fs::create_dir_all(scratch_dir).unwrap();
    git(scratch_dir)
        .args(["clone", "--quiet", bare_dir.to_str().unwrap(), "."])
        .assert()
        .success();
    let _ = git(scratch_dir)
        .args(["checkout", "--quiet", "-b", "main"])
        .ok();
    commit_file(scratch_dir, "a.txt", "a\n", "Add a");
    git(scratch_dir)
        .args(["push", "--quiet", "origin", "main"])
        .assert()
        .success();
    rev_parse(scratch_dir, "HEAD")
}

pub fn read_gitrepo_field(dir: &Path, subdir: &str, field: &str) -> String {
    let gitrepo_path = dir.join(subdir).join(".gitrepo");
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "config",
            "--file",
            gitrepo_path.to_str().unwrap(),
            "--get",
            field,
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "reading {field} from {subdir}/.gitrepo failed");
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}
