mod common;

use common::commit_file;
use common::init_repo;
use common::subrepo;
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

fn ref_exists(dir: &std::path::Path, reference: &str) -> bool {
    Command::new("git")
        .current_dir(dir)
        .args(["show-ref", "--verify", "--quiet", reference])
        .status()
        .unwrap()
        .success()
}

#[test]
fn clean_removes_synthesised_branches_and_remote() {
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
    subrepo(&host).args(["branch", "vendor"]).assert().success();
    assert!(branch_exists(&host, "subrepo/vendor"));

    subrepo(&host).args(["clean", "vendor"]).assert().success();
    assert!(!branch_exists(&host, "subrepo/vendor"));
    assert!(ref_exists(&host, "refs/subrepo/vendor/fetch"));
}

#[test]
fn clean_with_force_also_deletes_the_ref_subtree() {
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
        .args(["clean", "vendor", "--force"])
        .assert()
        .success();
    assert!(!ref_exists(&host, "refs/subrepo/vendor/fetch"));
}
