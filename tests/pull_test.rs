mod common;

use common::commit_file;
use common::init_repo;
use common::read_gitrepo_field;
use common::rev_parse;
use common::subrepo;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn pull_fetches_branches_and_commits_in_one_step() {
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

    let new_upstream_head = commit_file(&upstream, "b.txt", "b\n", "Add b");

    subrepo(&host).args(["pull", "vendor"]).assert().success();

    assert_eq!(
        std::fs::read_to_string(host.join("vendor/b.txt")).unwrap(),
        "b\n"
    );
    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.commit"),
        new_upstream_head
    );
}

#[test]
fn pull_is_a_noop_when_already_up_to_date() {
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

    subrepo(&host)
        .args(["pull", "vendor"])
        .assert()
        .success()
        .stderr(predicate::str::contains("up to date"));
}

#[test]
fn pull_with_remote_override_does_not_persist_without_update() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    init_repo(&upstream);
    commit_file(&upstream, "a.txt", "a\n", "Add a");

    let other_upstream = tmp.path().join("other-upstream");
    init_repo(&other_upstream);
    let other_head = commit_file(&other_upstream, "a.txt", "a\nfrom other\n", "Diverge");

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    subrepo(&host)
        .args(["pull", "vendor", "--remote", other_upstream.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.commit"),
        other_head
    );
    // The override affected this pull's fetch target but was not persisted.
    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.remote"),
        upstream.to_str().unwrap()
    );
}

#[test]
fn pull_with_update_persists_the_remote_override() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    init_repo(&upstream);
    commit_file(&upstream, "a.txt", "a\n", "Add a");

    let other_upstream = tmp.path().join("other-upstream");
    init_repo(&other_upstream);
    commit_file(&other_upstream, "a.txt", "a\nfrom other\n", "Diverge");

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    subrepo(&host)
        .args([
            "pull",
            "vendor",
            "--remote",
            other_upstream.to_str().unwrap(),
            "--update",
        ])
        .assert()
        .success();

    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.remote"),
        other_upstream.to_str().unwrap()
    );
}

#[test]
fn update_without_branch_or_remote_is_rejected() {
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

    subrepo(&host)
        .args(["pull", "vendor", "--update"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--update requires"));
}
