/// Error indicating that the current directory is not inside a git worktree
/// configured for `git-subrepo`, or that the requested `<subdir>` has no
/// `.gitrepo` file.
#[derive(thiserror::Error, Debug, Default)]
#[error("not a configured subrepo")]
pub struct NotASubrepo {
    #[source]
    pub source: Option<anyhow::Error>,
}

impl NotASubrepo {
    pub fn new(source: anyhow::Error) -> Self {
        Self {
            source: Some(source),
        }
    }
}

/// `clone` without `--force` onto a subdir that already has a `.gitrepo`.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("subrepo already exists")]
pub struct SubrepoAlreadyExists;

/// Exit codes for a `pull`/`push` whose rebase stopped with unresolved
/// conflicts (§7), signaled by `SubrepoOutcome::PullConflict`/`PushConflict`
/// rather than by an `Err`, since the dispatcher still needs to finish the
/// rest of an `--all` run.
pub const PULL_CONFLICT_CODE: i32 = 1;
pub const PUSH_CONFLICT_CODE: i32 = 2;
