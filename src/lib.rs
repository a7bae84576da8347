pub mod commit_message;
pub mod engine;
pub mod error;
pub mod git;
pub mod gitrepo_file;
pub mod history;
pub mod log;
pub mod preflight;
pub mod refs;
pub mod util;

/// Whether `path`'s top-level `<subdir>` already has a configured
/// `.gitrepo`, the canonical "is this a subrepo" check used throughout the
/// CLI.
pub fn is_subrepo(path: &std::path::Path, subdir: &str) -> anyhow::Result<bool> {
    Ok(gitrepo_file::GitRepoFile::read(&path.join(subdir).join(".gitrepo"))?.is_some())
}
