use anyhow::Result;
use anyhow::bail;

use crate::git::GitDriver;
use crate::refs::is_synthesised_branch;

/// The host repository's state as it must be for any subrepo command to
/// run: top-level, on a real branch, clean worktree. Captured once so the
/// rest of the engine does not need to keep re-deriving "the branch we
/// started on".
pub struct PreflightState {
    pub original_branch: String,
    pub original_head_commit: crate::git::CommitId,
}

/// Minimum Git version the rewrite algorithm depends on (§4.1: "Requires Git
/// >= 1.7, detected by string-comparing the version banner").
const MIN_GIT_VERSION: (u32, u32) = (1, 7);

fn check_git_version(git: &GitDriver) -> Result<()> {
    let banner = git.version()?;
    let version = banner
        .strip_prefix("git version ")
        .unwrap_or(&banner)
        .split_whitespace()
        .next()
        .unwrap_or(&banner);
    let mut parts = version.split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if (major, minor) < MIN_GIT_VERSION {
        bail!("git-subrepo requires Git >= 1.7, found {banner}");
    }
    Ok(())
}

/// Checks that apply to every command except the initial `clone` into an
/// empty repository, which is allowed to have no HEAD yet.
pub fn check(git: &GitDriver, require_clean: bool) -> Result<PreflightState> {
    check_git_version(git)?;
    if !git.is_top_level()? {
        bail!("git-subrepo must be run from the top level of the working tree");
    }
    if require_clean && !git.is_clean_worktree()? {
        bail!("worktree has uncommitted changes; commit or stash them first");
    }
    let Some(branch) = git.current_branch()? else {
        bail!("HEAD is detached; check out a branch first");
    };
    if is_synthesised_branch(&branch) {
        bail!("refusing to run on synthesised branch '{branch}'; check out the original branch first");
    }
    let original_head_commit = git.current_commit()?;
    Ok(PreflightState {
        original_branch: branch,
        original_head_commit,
    })
}

/// Used by `clone` into a repository that may not have any commits yet.
pub fn check_allow_unborn(git: &GitDriver) -> Result<Option<PreflightState>> {
    check_git_version(git)?;
    if !git.is_top_level()? {
        bail!("git-subrepo must be run from the top level of the working tree");
    }
    if !git.is_clean_worktree()? {
        bail!("worktree has uncommitted changes; commit or stash them first");
    }
    let Some(branch) = git.current_branch()? else {
        bail!("HEAD is detached; check out a branch first");
    };
    if is_synthesised_branch(&branch) {
        bail!("refusing to run on synthesised branch '{branch}'; check out the original branch first");
    }
    if !git.revision_exists("HEAD")? {
        return Ok(None);
    }
    let original_head_commit = git.current_commit()?;
    Ok(Some(PreflightState {
        original_branch: branch,
        original_head_commit,
    }))
}
