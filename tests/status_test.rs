mod common;

use common::commit_file;
use common::git;
use common::init_repo;
use common::read_gitrepo_field;
use common::subrepo;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn status_reports_the_recorded_metadata() {
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
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor"))
        .stdout(predicate::str::contains(upstream.to_str().unwrap()))
        .stdout(predicate::str::contains("main"));
}

#[test]
fn status_discovers_every_subrepo_when_none_named() {
    let tmp = TempDir::new().unwrap();
    let upstream_a = tmp.path().join("upstream-a");
    init_repo(&upstream_a);
    commit_file(&upstream_a, "a.txt", "a\n", "Add a");
    let upstream_b = tmp.path().join("upstream-b");
    init_repo(&upstream_b);
    commit_file(&upstream_b, "b.txt", "b\n", "Add b");

    let host = tmp.path().join("host");
    init_repo(&host);
    subrepo(&host)
        .args(["clone", upstream_a.to_str().unwrap(), "alpha"])
        .assert()
        .success();
    subrepo(&host)
        .args(["clone", upstream_b.to_str().unwrap(), "beta"])
        .assert()
        .success();

    subrepo(&host)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("beta"));
}

#[test]
fn quiet_status_prints_only_subdir_paths() {
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
        .args(["-q", "status"])
        .assert()
        .success()
        .stdout(predicate::eq("vendor\n"));
}

#[test]
fn status_flags_the_legacy_former_key_as_deprecated() {
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

    let parent = read_gitrepo_field(&host, "vendor", "subrepo.parent");
    let gitrepo = host.join("vendor").join(".gitrepo");
    git(&host)
        .args(["config", "--file"])
        .arg(&gitrepo)
        .args(["subrepo.former", &parent])
        .assert()
        .success();
    git(&host)
        .args(["config", "--file"])
        .arg(&gitrepo)
        .args(["--unset", "subrepo.parent"])
        .assert()
        .success();

    subrepo(&host)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deprecated"));
}
