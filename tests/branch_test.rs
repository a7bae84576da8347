mod common;

use common::commit_file;
use common::init_repo;
use common::subrepo;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn branch_exists(dir: &std::path::Path, branch: &str) -> bool {
    Command::new("git")
        .current_dir(dir)
        .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .status()
        .unwrap()
        .success()
}

#[test]
fn branch_synthesises_the_upstream_equivalent_branch() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    init_repo(&upstream);
    commit_file(&upstream, "a.txt", "a\n", "Add a");

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    commit_file(&upstream, "b.txt", "b\n", "Add b");
    subrepo(&host).args(["fetch", "vendor"]).assert().success();

    subrepo(&host).args(["branch", "vendor"]).assert().success();
    assert!(branch_exists(&host, "subrepo/vendor"));
}

#[test]
fn branch_is_a_noop_without_new_upstream_commits() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    init_repo(&upstream);
    commit_file(&upstream, "a.txt", "a\n", "Add a");

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();
    subrepo(&host).args(["fetch", "vendor"]).assert().success();

    subrepo(&host)
        .args(["branch", "vendor"])
        .assert()
        .stderr(predicate::str::contains("no new commits"));
}
