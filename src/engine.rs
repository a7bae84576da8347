use anyhow::Context as _;
use anyhow::Result;
use anyhow::bail;
use std::path::Path;
use std::path::PathBuf;

use crate::commit_message::CommitMessageFields;
use crate::commit_message::build as build_commit_message;
use crate::error::NotASubrepo;
use crate::error::SubrepoAlreadyExists;
use crate::git::CommitId;
use crate::git::GitDriver;
use crate::git::RebaseOutcome;
use crate::gitrepo_file::GitRepoFile;
use crate::history::rewrite_subrepo_history;
use crate::log;
use crate::preflight;
use crate::refs::RefNamespace;

/// What a subcommand produced, so the CLI dispatcher can map it to an exit
/// code and message template without the engine calling `process::exit`
/// itself (§4.4).
pub enum SubrepoOutcome {
    Ok,
    NoOp(String),
    PullConflict,
    PushConflict,
}

pub struct Engine {
    git: GitDriver,
    tool_version: &'static str,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Engine {
            git: GitDriver::open(root),
            tool_version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn git(&self) -> &GitDriver {
        &self.git
    }

    fn gitrepo_path(&self, subdir: &str) -> PathBuf {
        self.git.root().join(subdir).join(".gitrepo")
    }

    fn read_gitrepo(&self, subdir: &str) -> Result<GitRepoFile> {
        GitRepoFile::read(&self.gitrepo_path(subdir))?
            .ok_or_else(|| NotASubrepo::new(anyhow::anyhow!("{subdir}/.gitrepo not found")).into())
    }

    fn commit_message_fields(
        &self,
        command: &str,
        original_args: Vec<String>,
        subdir: &str,
        source_ref: &CommitId,
        gitrepo: &GitRepoFile,
    ) -> Result<CommitMessageFields> {
        let (tool_origin, tool_commit) = crate::commit_message::resolve_tool_provenance();
        Ok(CommitMessageFields {
            command: command.to_owned(),
            original_args,
            subdir: subdir.to_owned(),
            merged_short_sha: self.git.short_sha(source_ref)?,
            upstream_origin: gitrepo.remote.clone(),
            upstream_branch: gitrepo.branch.clone(),
            upstream_commit_short_sha: self.git.short_sha(&gitrepo.commit.parse()?)?,
            tool_version: self.tool_version.to_owned(),
            tool_origin,
            tool_commit,
        })
    }

    /// `clone <url> [<subdir>]`, also used for re-clone via `--force`.
    pub fn clone(
        &self,
        url: &str,
        subdir: Option<&str>,
        branch: Option<&str>,
        force: bool,
    ) -> Result<SubrepoOutcome> {
        let subdir = match subdir {
            Some(subdir) => subdir.to_owned(),
            None => derive_subdir_from_url(url)?,
        };
        let _scope = log::scope(format!("clone {subdir}"));
        let preflight_state = preflight::check_allow_unborn(&self.git)?;

        let gitrepo_path = self.gitrepo_path(&subdir);
        let existing = GitRepoFile::read(&gitrepo_path)?;
        if existing.is_some() && !force {
            return Err(SubrepoAlreadyExists.into());
        }
        let subdir_path = self.git.root().join(&subdir);
        if existing.is_none() && subdir_path.exists() {
            let has_entries = std::fs::read_dir(&subdir_path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            if has_entries {
                bail!("{subdir} already exists and is not empty");
            }
        }

        let branch = match branch {
            Some(branch) => branch.to_owned(),
            None => self
                .git
                .remote_default_branch(url)?
                .with_context(|| format!("could not determine default branch of {url}"))?,
        };

        let upstream_head = self.git.fetch(url, &branch)?;
        let ns = RefNamespace::new(&subdir);
        self.git.update_ref(&ns.fetch(), &upstream_head)?;
        self.git.remote_ensure(&ns.remote_name(), url)?;

        if let Some(existing) = &existing {
            if existing.commit == upstream_head.as_str() {
                return Ok(SubrepoOutcome::NoOp(format!(
                    "{subdir} is up to date with {url}"
                )));
            }
            std::fs::remove_dir_all(&subdir_path)
                .with_context(|| format!("removing existing {subdir}"))?;
        }
        std::fs::create_dir_all(&subdir_path)?;

        let gitrepo = GitRepoFile {
            remote: url.to_owned(),
            branch: branch.clone(),
            commit: upstream_head.to_string(),
            parent: preflight_state
                .as_ref()
                .map(|state| state.original_head_commit.to_string())
                .unwrap_or_default(),
            cmdver: self.tool_version.to_owned(),
        };

        self.squash_into_subdir(
            &subdir,
            &upstream_head,
            &gitrepo,
            "clone",
            vec![url.to_owned()],
            preflight_state.as_ref().map(|s| &s.original_head_commit),
        )?;
        self.git
            .update_ref(&ns.commit(), &upstream_head)?;
        Ok(SubrepoOutcome::Ok)
    }

    /// `fetch <subdir>`. `override_remote`/`override_branch` redirect this
    /// one fetch without touching `.gitrepo` (§4.4: `fetch` takes
    /// `--branch`/`--remote` but has no `--update`).
    pub fn fetch(
        &self,
        subdir: &str,
        override_remote: Option<&str>,
        override_branch: Option<&str>,
    ) -> Result<CommitId> {
        let _scope = log::scope(format!("fetch {subdir}"));
        preflight::check(&self.git, false)?;
        let gitrepo = self.read_gitrepo(subdir)?;
        let remote = override_remote.unwrap_or(&gitrepo.remote);
        let branch = override_branch.unwrap_or(&gitrepo.branch);
        let upstream_head = self.git.fetch(remote, branch)?;
        let ns = RefNamespace::new(subdir);
        self.git.update_ref(&ns.fetch(), &upstream_head)?;
        self.git.remote_ensure(&ns.remote_name(), remote)?;
        Ok(upstream_head)
    }

    /// `branch <subdir>`. Returns `Ok(None)` for "no new commits".
    pub fn branch(&self, subdir: &str, force: bool) -> Result<Option<CommitId>> {
        self.branch_as(subdir, &RefNamespace::new(subdir).branch_name(), force)
    }

    fn branch_as(
        &self,
        subdir: &str,
        branch_name: &str,
        force: bool,
    ) -> Result<Option<CommitId>> {
        let _scope = log::scope(format!("branch {subdir}"));
        preflight::check(&self.git, true)?;
        if self.git.branch_exists(branch_name)? {
            if !force {
                return Ok(Some(self.git.rev_parse(branch_name)?));
            }
            self.git.branch_delete(branch_name)?;
        }
        let gitrepo = self.read_gitrepo(subdir)?;
        // An empty `parent` is the "none" sentinel `clone` records when it ran
        // into a repository with no prior HEAD (§8 scenario (a)); there is no
        // commit to exclude, so the rewrite walks the full ancestry of HEAD.
        let parent: Option<CommitId> = if gitrepo.parent.is_empty() {
            None
        } else {
            Some(gitrepo.parent.parse().context("parsing .gitrepo parent")?)
        };
        let head = self.git.current_commit()?;
        let original_head_commit = head.clone();

        let _scope_inner = log::scope("rewrite");
        let Some(tip) = rewrite_subrepo_history(&self.git, subdir, parent.as_ref(), &head)? else {
            self.git.reset_hard(&original_head_commit)?;
            return Ok(None);
        };
        self.git.branch_create(branch_name, &tip, true)?;
        self.git.reset_hard(&original_head_commit)?;
        Ok(Some(tip))
    }

    /// `pull <subdir>`. `override_remote`/`override_branch` redirect this
    /// one fetch; they are only persisted into `.gitrepo` when `update` is
    /// set (§4.4: "`--update` requires at least one of `--branch`/`--remote`").
    pub fn pull(
        &self,
        subdir: &str,
        override_remote: Option<&str>,
        override_branch: Option<&str>,
        update: bool,
    ) -> Result<SubrepoOutcome> {
        let _scope = log::scope(format!("pull {subdir}"));
        let gitrepo = self.read_gitrepo(subdir)?;
        let remote = override_remote.unwrap_or(&gitrepo.remote);
        let branch = override_branch.unwrap_or(&gitrepo.branch);
        let recorded_commit = gitrepo.commit.clone();

        let upstream_head = self.git.fetch(remote, branch)?;
        let ns = RefNamespace::new(subdir);
        self.git.update_ref(&ns.fetch(), &upstream_head)?;
        self.git.remote_ensure(&ns.remote_name(), remote)?;
        if upstream_head.as_str() == recorded_commit {
            return Ok(SubrepoOutcome::NoOp(format!("{subdir} is up to date")));
        }

        let ns = RefNamespace::new(subdir);
        let branch_name = ns.branch_name();
        self.git.branch_delete(&branch_name)?;
        let tip = self.branch(subdir, false)?;

        let rebased_tip = match tip {
            Some(_) => {
                let fetch_ref = ns.fetch();
                match self.git.rebase_branch_onto(&branch_name, &fetch_ref)? {
                    RebaseOutcome::Completed => self.git.rev_parse(&branch_name)?,
                    RebaseOutcome::Conflict { output } => {
                        log::error(format!(
                            "pull of {subdir} left conflicts; resolve them, then run:\n\
                             \x20 git subrepo commit {subdir}\n\
                             or abort with:\n\
                             \x20 git rebase --abort && git checkout ORIG_HEAD && git subrepo clean {subdir}\n\
                             {output}"
                        ));
                        return Ok(SubrepoOutcome::PullConflict);
                    }
                }
            }
            None => {
                self.git.branch_create(&branch_name, &upstream_head, true)?;
                upstream_head.clone()
            }
        };

        self.git.checkout(&self.original_branch_or_fail()?)?;
        let outcome = self.commit_inner(
            subdir,
            &rebased_tip,
            false,
            override_remote,
            override_branch,
            update,
            "pull",
            vec![subdir.to_owned()],
        )?;
        if let SubrepoOutcome::Ok = outcome {
            self.git
                .update_ref(&ns.pull(), &self.git.current_commit()?)?;
        }
        Ok(outcome)
    }

    fn original_branch_or_fail(&self) -> Result<String> {
        self.git
            .current_branch()?
            .ok_or_else(|| anyhow::anyhow!("HEAD is detached"))
    }

    /// `commit <subdir> [<commit-ref>]`. No `--branch`/`--remote`/`--update`
    /// here; §4.4 only grants `commit` `--fetch --force`.
    pub fn commit(
        &self,
        subdir: &str,
        commit_ref: Option<&str>,
        force: bool,
    ) -> Result<SubrepoOutcome> {
        let _scope = log::scope(format!("commit {subdir}"));
        preflight::check(&self.git, true)?;
        let default_ref = RefNamespace::new(subdir).branch_name();
        let commit_ref = commit_ref.unwrap_or(&default_ref);
        let source = self.git.rev_parse(commit_ref)?;
        self.commit_inner(
            subdir,
            &source,
            force,
            None,
            None,
            false,
            "commit",
            vec![subdir.to_owned(), commit_ref.to_owned()],
        )
    }

    fn commit_inner(
        &self,
        subdir: &str,
        source: &CommitId,
        force: bool,
        update_remote: Option<&str>,
        update_branch: Option<&str>,
        update: bool,
        command_name: &str,
        original_args: Vec<String>,
    ) -> Result<SubrepoOutcome> {
        let mut gitrepo = self.read_gitrepo(subdir)?;
        let ns = RefNamespace::new(subdir);

        if !force {
            let fetch_ref = ns.fetch();
            if self.git.ref_exists(&fetch_ref)? {
                let upstream_head = self.git.rev_parse(&fetch_ref)?;
                if !self.git.is_ancestor(&upstream_head, source)? {
                    bail!(
                        "{source} does not contain the fetched upstream head; use --force to override",
                        source = source
                    );
                }
            }
        }

        if update {
            if let Some(remote) = update_remote {
                gitrepo.remote = remote.to_owned();
            }
            if let Some(branch) = update_branch {
                gitrepo.branch = branch.to_owned();
            }
        }
        if let Some(fetch_tip) = self
            .git
            .ref_exists(&ns.fetch())?
            .then(|| self.git.rev_parse(&ns.fetch()))
            .transpose()?
        {
            gitrepo.commit = fetch_tip.to_string();
        }

        let original_head_commit = self.git.current_commit()?;
        gitrepo.parent = original_head_commit.to_string();
        gitrepo.cmdver = self.tool_version.to_owned();

        self.squash_into_subdir(
            subdir,
            source,
            &gitrepo,
            command_name,
            original_args,
            Some(&original_head_commit),
        )?;
        self.git.update_ref(&ns.commit(), source)?;
        Ok(SubrepoOutcome::Ok)
    }

    /// Shared by `clone` and `commit`: materialises `source`'s tree under
    /// `<subdir>/`, writes `.gitrepo`, and produces the squash commit
    /// (§4.2.1 steps, §4.2.5 steps 3-9).
    fn squash_into_subdir(
        &self,
        subdir: &str,
        source: &CommitId,
        gitrepo: &GitRepoFile,
        command_name: &str,
        original_args: Vec<String>,
        original_head_commit: Option<&CommitId>,
    ) -> Result<()> {
        let subdir_path = self.git.root().join(subdir);
        std::fs::create_dir_all(&subdir_path)?;
        if let Ok(entries) = std::fs::read_dir(&subdir_path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
        }

        self.git.reset_hard_in_subtree(&subdir_path, source)?;
        match original_head_commit {
            Some(commit) => self.git.reset_mixed(commit)?,
            None => self.git.remove_index_file()?,
        }

        gitrepo.write(&self.gitrepo_path(subdir))?;
        self.git.add_path(subdir)?;

        let fields =
            self.commit_message_fields(command_name, original_args, subdir, source, gitrepo)?;
        let message = build_commit_message(&fields);
        let tree = self.git.write_tree()?;
        let parents = match original_head_commit {
            Some(commit) => vec![commit.clone()],
            None => vec![],
        };
        let new_commit = self.git.commit_tree(&tree, &parents, &message)?;
        self.git.reset_hard(&new_commit)?;
        Ok(())
    }

    /// `push <subdir> [<branch-name>]`.
    pub fn push(
        &self,
        subdir: &str,
        branch_name: Option<&str>,
        force: bool,
        override_remote: Option<&str>,
        override_branch: Option<&str>,
        update: bool,
    ) -> Result<SubrepoOutcome> {
        let _scope = log::scope(format!("push {subdir}"));
        preflight::check(&self.git, true)?;
        let mut gitrepo = self.read_gitrepo(subdir)?;
        if let Some(remote) = override_remote {
            gitrepo.remote = remote.to_owned();
        }
        if let Some(branch) = override_branch {
            gitrepo.branch = branch.to_owned();
        }
        if update && (override_remote.is_some() || override_branch.is_some()) {
            gitrepo.write(&self.gitrepo_path(subdir))?;
        }
        let ns = RefNamespace::new(subdir);
        let upstream_head = self.git.fetch(&gitrepo.remote, &gitrepo.branch)?;
        self.git.update_ref(&ns.fetch(), &upstream_head)?;
        self.git.remote_ensure(&ns.remote_name(), &gitrepo.remote)?;

        let push_candidate = match branch_name {
            Some(name) => {
                if !self.git.branch_exists(name)? {
                    bail!("branch {name} does not exist");
                }
                name.to_owned()
            }
            None => {
                let push_branch = ns.push_branch_name();
                if self.git.branch_exists(&push_branch)? {
                    bail!(
                        "{push_branch} already exists; resolve or run `git subrepo clean {subdir}` first"
                    );
                }
                let original_branch = self.original_branch_or_fail()?;
                let tip = self.branch_as(subdir, &push_branch, true)?;
                let Some(_tip) = tip else {
                    self.git.checkout(&original_branch)?;
                    return Ok(SubrepoOutcome::NoOp(format!(
                        "no new commits to push for {subdir}"
                    )));
                };
                let fetch_ref = ns.fetch();
                match self.git.rebase_branch_onto(&push_branch, &fetch_ref)? {
                    RebaseOutcome::Completed => {}
                    RebaseOutcome::Conflict { output } => {
                        log::error(format!(
                            "push of {subdir} left conflicts; resolve them, then run:\n\
                             \x20 git subrepo push {subdir} {push_branch}\n\
                             or abort with:\n\
                             \x20 git rebase --abort && git checkout ORIG_HEAD && git subrepo clean {subdir}\n\
                             {output}"
                        ));
                        return Ok(SubrepoOutcome::PushConflict);
                    }
                }
                self.git.checkout(&original_branch)?;
                push_branch
            }
        };

        if !force {
            let candidate_commit = self.git.rev_parse(&push_candidate)?;
            if !self.git.is_ancestor(&upstream_head, &candidate_commit)? {
                bail!("{push_candidate} does not contain the fetched upstream head; use --force to override");
            }
        }

        let refspec = format!("{push_candidate}:refs/heads/{}", gitrepo.branch);
        self.git.push(&gitrepo.remote, &refspec, force)?;
        let pushed_commit = self.git.rev_parse(&push_candidate)?;
        self.git.update_ref(&ns.push(), &pushed_commit)?;
        if branch_name.is_none() {
            self.git.branch_delete(&ns.push_branch_name())?;
        }
        Ok(SubrepoOutcome::Ok)
    }

    /// `status [<subdir>...]`. Discovers all subrepos when `subdirs` is
    /// empty.
    pub fn status(&self, subdirs: &[String], fetch: bool) -> Result<Vec<StatusEntry>> {
        let subdirs: Vec<String> = if subdirs.is_empty() {
            self.discover_subrepos()?
        } else {
            subdirs.to_vec()
        };
        let mut entries = Vec::new();
        for subdir in subdirs {
            if fetch {
                let _ = self.fetch(&subdir, None, None);
            }
            let gitrepo = self.read_gitrepo(&subdir)?;
            let uses_legacy_former =
                GitRepoFile::used_deprecated_former(&self.gitrepo_path(&subdir))?;
            let ns = RefNamespace::new(&subdir);
            entries.push(StatusEntry {
                subdir: subdir.clone(),
                remote: gitrepo.remote,
                branch: gitrepo.branch,
                commit: gitrepo.commit,
                parent: gitrepo.parent,
                uses_legacy_former,
                fetch_ref: self.git.rev_parse(&ns.fetch()).ok(),
                branch_ref: self.git.rev_parse(&ns.branch()).ok(),
                commit_ref: self.git.rev_parse(&ns.commit()).ok(),
                pull_ref: self.git.rev_parse(&ns.pull()).ok(),
                push_ref: self.git.rev_parse(&ns.push()).ok(),
            });
        }
        Ok(entries)
    }

    /// Walks the worktree for `.gitrepo` files, collapsing nested subrepos
    /// to their outermost parent (§4.2.7).
    fn discover_subrepos(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        walk_for_gitrepo(self.git.root(), self.git.root(), &mut found)?;
        found.sort();
        let mut outermost: Vec<String> = Vec::new();
        for subdir in found {
            let is_nested = outermost
                .iter()
                .any(|parent: &String| subdir.starts_with(&format!("{parent}/")));
            if !is_nested {
                outermost.push(subdir);
            }
        }
        Ok(outermost)
    }

    /// `clean <subdir>`.
    pub fn clean(&self, subdir: &str, force: bool) -> Result<()> {
        let _scope = log::scope(format!("clean {subdir}"));
        preflight::check(&self.git, false)?;
        let ns = RefNamespace::new(subdir);
        self.git.branch_delete(&ns.branch_name())?;
        self.git.branch_delete(&ns.push_branch_name())?;
        self.git.remote_remove(&ns.remote_name())?;
        if force {
            for refname in self.git.refs_with_prefix(&ns.prefix())? {
                self.git.delete_ref(&refname)?;
            }
        }
        Ok(())
    }
}

pub struct StatusEntry {
    pub subdir: String,
    pub remote: String,
    pub branch: String,
    pub commit: String,
    pub parent: String,
    pub uses_legacy_former: bool,
    pub fetch_ref: Option<CommitId>,
    pub branch_ref: Option<CommitId>,
    pub commit_ref: Option<CommitId>,
    pub pull_ref: Option<CommitId>,
    pub push_ref: Option<CommitId>,
}

fn walk_for_gitrepo(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().is_some_and(|name| name == ".git") {
            continue;
        }
        if path.is_dir() {
            walk_for_gitrepo(root, &path, found)?;
        } else if path.file_name().is_some_and(|name| name == ".gitrepo") {
            if let Some(parent) = path.parent() {
                let relative = parent
                    .strip_prefix(root)
                    .unwrap_or(parent)
                    .to_string_lossy()
                    .replace('\\', "/");
                found.push(relative);
            }
        }
    }
    Ok(())
}

/// Derives a subdir name from a URL's final path component, stripping a
/// trailing `.git` and `/`.
///
/// ```
/// use git_subrepo::engine::derive_subdir_from_url;
///
/// assert_eq!(derive_subdir_from_url("https://example.com/foo.git").unwrap(), "foo");
/// assert_eq!(derive_subdir_from_url("https://example.com/foo/").unwrap(), "foo");
/// assert_eq!(derive_subdir_from_url("git@example.com:org/bar.git").unwrap(), "bar");
/// assert!(derive_subdir_from_url("https://example.com/foo bar.git").is_err());
/// ```
pub fn derive_subdir_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .with_context(|| format!("could not derive a subdir name from {url}"))?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        bail!("derived subdir name '{name}' is not a valid directory name; pass one explicitly");
    }
    Ok(name.to_owned())
}
