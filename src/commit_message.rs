/// Every piece of information the canonical commit message (§4.3) needs.
/// Building it is a pure function of this struct; nothing here shells out.
pub struct CommitMessageFields {
    pub command: String,
    pub original_args: Vec<String>,
    pub subdir: String,
    pub merged_short_sha: String,
    pub upstream_origin: String,
    pub upstream_branch: String,
    pub upstream_commit_short_sha: String,
    pub tool_version: String,
    pub tool_origin: Option<String>,
    pub tool_commit: Option<String>,
}

/// Renders the deterministic, machine-parseable commit message every
/// mainline commit produced by `commit`/`pull`/`clone` carries.
///
/// ```
/// use git_subrepo::commit_message::{build, CommitMessageFields};
///
/// let msg = build(&CommitMessageFields {
///     command: "clone".to_owned(),
///     original_args: vec!["https://example.com/foo.git".to_owned()],
///     subdir: "foo".to_owned(),
///     merged_short_sha: "abc1234".to_owned(),
///     upstream_origin: "https://example.com/foo.git".to_owned(),
///     upstream_branch: "main".to_owned(),
///     upstream_commit_short_sha: "abc1234".to_owned(),
///     tool_version: "0.1.0".to_owned(),
///     tool_origin: None,
///     tool_commit: None,
/// });
/// assert!(msg.starts_with("git subrepo clone https://example.com/foo.git\n"));
/// assert!(msg.contains("subdir:   \"foo\""));
/// assert!(msg.contains("origin:   \"https://example.com/foo.git\""));
/// ```
pub fn build(fields: &CommitMessageFields) -> String {
    let args_line = fields.original_args.join(" ");
    let summary = if args_line.is_empty() {
        format!("git subrepo {}", fields.command)
    } else {
        format!("git subrepo {} {args_line}", fields.command)
    };
    let tool_origin = fields.tool_origin.as_deref().unwrap_or("");
    let tool_commit = fields.tool_commit.as_deref().unwrap_or("");
    format!(
        "{summary}\n\
         \n\
         subrepo:\n\
         \x20 subdir:   \"{subdir}\"\n\
         \x20 merged:   \"{merged}\"\n\
         upstream:\n\
         \x20 origin:   \"{origin}\"\n\
         \x20 branch:   \"{branch}\"\n\
         \x20 commit:   \"{commit}\"\n\
         git-subrepo:\n\
         \x20 version:  \"{version}\"\n\
         \x20 origin:   \"{tool_origin}\"\n\
         \x20 commit:   \"{tool_commit}\"\n",
        subdir = fields.subdir,
        merged = fields.merged_short_sha,
        origin = fields.upstream_origin,
        branch = fields.upstream_branch,
        commit = fields.upstream_commit_short_sha,
        version = fields.tool_version,
    )
}

/// Best-effort provenance of the running binary: its own remote and commit,
/// if the crate it was built from happens to itself be a git worktree.
/// Absent when packaged or installed; never fatal, mirroring how the
/// teacher codebase treats this kind of metadata.
pub fn resolve_tool_provenance() -> (Option<String>, Option<String>) {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let git = crate::git::GitDriver::open(manifest_dir);
    if !matches!(git.is_top_level(), Ok(true)) {
        return (None, None);
    }
    let origin = git.remote_get_url("origin").ok().flatten();
    let commit = git
        .current_commit()
        .ok()
        .map(|commit| commit.as_str().to_owned());
    (origin, commit)
}
