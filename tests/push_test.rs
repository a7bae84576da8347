mod common;

use common::commit_file;
use common::git;
use common::init_bare_upstream;
use common::init_repo;
use common::read_gitrepo_field;
use common::rev_parse;
use common::subrepo;
use tempfile::TempDir;

#[test]
fn push_sends_local_subdir_commits_upstream() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream.git");
    let scratch = tmp.path().join("scratch");
    init_bare_upstream(&upstream, &scratch);

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    commit_file(&host, "vendor/a.txt", "a\nedited locally\n", "Edit vendor/a.txt");

    subrepo(&host).args(["push", "vendor"]).assert().success();

    let pushed_head = rev_parse(&host, "refs/subrepo/vendor/push");
    let scratch_fetch = std::process::Command::new("git")
        .current_dir(&scratch)
        .args(["fetch", "--quiet", "origin", "main"])
        .status()
        .unwrap();
    assert!(scratch_fetch.success());
    let upstream_head = rev_parse(&scratch, "FETCH_HEAD");
    assert_eq!(upstream_head, pushed_head);

    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.commit"),
        upstream_head
    );
}

#[test]
fn push_rejects_a_non_fast_forward_candidate_without_force() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream.git");
    let scratch = tmp.path().join("scratch");
    init_bare_upstream(&upstream, &scratch);

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    // Upstream gains a commit the host never fetched.
    commit_file(&scratch, "b.txt", "b\n", "Add b upstream");
    std::process::Command::new("git")
        .current_dir(&scratch)
        .args(["push", "--quiet", "origin", "main"])
        .status()
        .unwrap();

    commit_file(&host, "vendor/a.txt", "a\nedited locally\n", "Edit vendor/a.txt");

    subrepo(&host).args(["push", "vendor"]).assert().failure();
}

#[test]
fn push_with_remote_override_targets_the_override_without_persisting_it() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream.git");
    let scratch = tmp.path().join("scratch");
    init_bare_upstream(&upstream, &scratch);

    let other_upstream = tmp.path().join("other-upstream.git");
    let other_scratch = tmp.path().join("other-scratch");
    init_bare_upstream(&other_upstream, &other_scratch);

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();

    commit_file(&host, "vendor/a.txt", "a\nedited locally\n", "Edit vendor/a.txt");

    subrepo(&host)
        .args([
            "push",
            "vendor",
            "--remote",
            other_upstream.to_str().unwrap(),
        ])
        .assert()
        .success();

    let pushed_head = rev_parse(&host, "refs/subrepo/vendor/push");
    let other_fetch = std::process::Command::new("git")
        .current_dir(&other_scratch)
        .args(["fetch", "--quiet", "origin", "main"])
        .status()
        .unwrap();
    assert!(other_fetch.success());
    assert_eq!(rev_parse(&other_scratch, "FETCH_HEAD"), pushed_head);

    // The override redirected this push but was not persisted into .gitrepo.
    assert_eq!(
        read_gitrepo_field(&host, "vendor", "subrepo.remote"),
        upstream.to_str().unwrap()
    );
}

#[test]
fn push_right_after_cloning_into_an_unborn_repo_has_no_parent_to_exclude() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream.git");
    let scratch = tmp.path().join("scratch");
    init_bare_upstream(&upstream, &scratch);

    // A repository with no commits yet: `clone`'s squash commit becomes
    // HEAD's root, and `.gitrepo`'s `parent` is recorded as the "none"
    // sentinel (empty string), not a resolvable commit id.
    let host = tmp.path().join("host");
    std::fs::create_dir_all(&host).unwrap();
    git(&host)
        .args(["init", "--quiet", "--initial-branch", "main"])
        .assert()
        .success();

    subrepo(&host)
        .args(["clone", upstream.to_str().unwrap(), "vendor"])
        .assert()
        .success();
    assert_eq!(read_gitrepo_field(&host, "vendor", "subrepo.parent"), "");

    commit_file(&host, "vendor/a.txt", "a\nedited locally\n", "Edit vendor/a.txt");

    subrepo(&host).args(["push", "vendor"]).assert().success();
}
