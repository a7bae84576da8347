use crate::command_span;
use crate::log::CommandSpanExt as _;
use crate::util::CommandExtension as _;
use anyhow::Context as _;
use anyhow::Result;
use anyhow::bail;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

/// A commit id. No validation of hex-ness is performed beyond non-emptiness;
/// Git itself rejects anything malformed when the id is next used.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CommitId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty commit id");
        }
        Ok(CommitId(s.to_owned()))
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a rebase attempt: either it completed, or it stopped with
/// conflicts and the working tree was left mid-rebase for the user.
pub enum RebaseOutcome {
    Completed,
    Conflict { output: String },
}

/// A narrow wrapper over the `git` binary bound to one working tree. Every
/// invocation is spawned through [`GitDriver::command`] and traced with a
/// span naming the subcommand.
pub struct GitDriver {
    root: PathBuf,
}

impl GitDriver {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        GitDriver { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a `git` invocation rooted at the driver's worktree.
    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        command.current_dir(&self.root);
        command.args(args);
        command
    }

    fn run(&self, name: &'static str, args: &[&str]) -> Result<crate::util::SafeOutput> {
        let mut command = self.command(args);
        let output = command
            .trace_command(command_span!(name))
            .check_success_with_stderr()
            .with_context(|| format!("git {name} failed"))?;
        Ok(output)
    }

    fn run_stdout(&self, name: &'static str, args: &[&str]) -> Result<String> {
        self.run(name, args)?.stdout_trimmed()
    }

    pub fn version(&self) -> Result<String> {
        self.run_stdout("version", &["--version"])
    }

    pub fn is_top_level(&self) -> Result<bool> {
        let git_dir = self.run_stdout("rev-parse", &["rev-parse", "--git-dir"])?;
        Ok(git_dir == ".git")
    }

    pub fn is_clean_worktree(&self) -> Result<bool> {
        let status = self.run_stdout("status", &["status", "--porcelain"])?;
        Ok(status.is_empty())
    }

    /// `None` when HEAD is detached or points at an unborn branch.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let mut command = self.command(&["symbolic-ref", "--short", "-q", "HEAD"]);
        let output = command
            .trace_command(command_span!("symbolic-ref"))
            .safe_output()?;
        if output.status.success() {
            Ok(Some(output.stdout_trimmed()?))
        } else {
            Ok(None)
        }
    }

    pub fn current_commit(&self) -> Result<CommitId> {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, rev: &str) -> Result<CommitId> {
        self.run_stdout("rev-parse", &["rev-parse", "--verify", rev])?
            .parse()
    }

    pub fn revision_exists(&self, rev: &str) -> Result<bool> {
        let mut command = self.command(&["rev-parse", "--verify", "--quiet", rev]);
        Ok(command
            .trace_command(command_span!("rev-parse"))
            .safe_output()?
            .status
            .success())
    }

    pub fn ref_exists(&self, refname: &str) -> Result<bool> {
        let mut command = self.command(&["show-ref", "--verify", "--quiet", refname]);
        Ok(command
            .trace_command(command_span!("show-ref"))
            .safe_output()?
            .status
            .success())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/heads/{name}"))
    }

    pub fn short_sha(&self, commit: &CommitId) -> Result<String> {
        self.run_stdout("rev-parse", &["rev-parse", "--short", commit.as_str()])
    }

    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> Result<bool> {
        let mut command = self.command(&[
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ]);
        Ok(command
            .trace_command(command_span!("merge-base"))
            .safe_output()?
            .status
            .success())
    }

    /// Fetches `branch` from `remote` and returns the resulting commit.
    pub fn fetch(&self, remote: &str, branch: &str) -> Result<CommitId> {
        self.run("fetch", &["fetch", remote, branch])?;
        self.rev_parse("FETCH_HEAD")
    }

    pub fn push(&self, remote: &str, refspec: &str, force: bool) -> Result<()> {
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(refspec);
        self.run("push", &args)?;
        Ok(())
    }

    /// Discovers the branch that a remote's `HEAD` symref resolves to, for
    /// `clone` when no `--branch` was given.
    pub fn remote_default_branch(&self, url: &str) -> Result<Option<String>> {
        let output = self.run_stdout("ls-remote", &["ls-remote", "--symref", url, "HEAD"])?;
        for line in output.lines() {
            if let Some(rest) = line.strip_prefix("ref: ") {
                if let Some((refname, _)) = rest.split_once('\t') {
                    if let Some(branch) = refname.strip_prefix("refs/heads/") {
                        return Ok(Some(branch.to_owned()));
                    }
                }
            }
        }
        Ok(None)
    }

    pub fn update_ref(&self, refname: &str, commit: &CommitId) -> Result<()> {
        self.run("update-ref", &["update-ref", refname, commit.as_str()])?;
        Ok(())
    }

    pub fn delete_ref(&self, refname: &str) -> Result<()> {
        if self.ref_exists(refname)? {
            self.run("update-ref", &["update-ref", "-d", refname])?;
        }
        Ok(())
    }

    pub fn refs_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let output = self.run_stdout(
            "for-each-ref",
            &["for-each-ref", "--format=%(refname)", prefix],
        )?;
        Ok(output.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect())
    }

    pub fn branch_create(&self, name: &str, commit: &CommitId, force: bool) -> Result<()> {
        let mut args = vec!["branch"];
        if force {
            args.push("--force");
        }
        args.push(name);
        args.push(commit.as_str());
        self.run("branch", &args)?;
        Ok(())
    }

    pub fn branch_delete(&self, name: &str) -> Result<()> {
        if self.branch_exists(name)? {
            self.run("branch", &["branch", "-D", name])?;
        }
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run("checkout", &["checkout", branch])?;
        Ok(())
    }

    pub fn reset_mixed(&self, commit: &CommitId) -> Result<()> {
        self.run("reset", &["reset", commit.as_str()])?;
        Ok(())
    }

    pub fn reset_hard(&self, commit: &CommitId) -> Result<()> {
        self.run("reset", &["reset", "--hard", commit.as_str()])?;
        Ok(())
    }

    /// Resets `commit`'s tree into `subtree_root` (an absolute path inside
    /// the worktree) as if it were the repository root, while leaving the
    /// index a flat representation of that tree at the *real* repo root.
    /// This is the `GIT_WORK_TREE` trick `commit` (4.2.5) relies on to
    /// materialise an upstream tree under `<subdir>/`.
    pub fn reset_hard_in_subtree(&self, subtree_root: &Path, commit: &CommitId) -> Result<()> {
        let mut command = Command::new("git");
        command
            .current_dir(&self.root)
            .env("GIT_DIR", self.root.join(".git"))
            .env("GIT_WORK_TREE", subtree_root)
            .args(["reset", "--hard", commit.as_str()]);
        command
            .trace_command(command_span!("reset"))
            .check_success_with_stderr()
            .context("git reset --hard into subtree failed")?;
        Ok(())
    }

    pub fn remove_index_file(&self) -> Result<()> {
        let index_path = self.root.join(".git").join("index");
        if index_path.exists() {
            std::fs::remove_file(index_path)?;
        }
        Ok(())
    }

    pub fn add_path(&self, path: &str) -> Result<()> {
        self.run("add", &["add", "--", path])?;
        Ok(())
    }

    pub fn write_tree(&self) -> Result<String> {
        self.run_stdout("write-tree", &["write-tree"])
    }

    /// The sha of the tree at `commit`, or the subtree at `commit:path` when
    /// `path` is given.
    pub fn tree_of(&self, commit: &CommitId, path: Option<&str>) -> Result<Option<String>> {
        let rev = match path {
            Some(path) => format!("{}:{path}", commit.as_str()),
            None => format!("{}^{{tree}}", commit.as_str()),
        };
        if !self.revision_exists(&rev)? {
            return Ok(None);
        }
        Ok(Some(self.run_stdout("rev-parse", &["rev-parse", &rev])?))
    }

    pub fn commit_message(&self, commit: &CommitId) -> Result<String> {
        self.run_stdout("log", &["log", "-1", "--format=%B", commit.as_str()])
    }

    /// Raw `ls-tree` lines (`<mode> <type> <sha>\t<name>`) for `tree`.
    pub fn ls_tree(&self, tree: &str) -> Result<Vec<String>> {
        let output = self.run_stdout("ls-tree", &["ls-tree", tree])?;
        Ok(output.lines().map(str::to_owned).collect())
    }

    /// Builds a tree object from `ls-tree`-formatted lines via `mktree`.
    pub fn mktree(&self, lines: &[String]) -> Result<String> {
        let mut command = self.command(&["mktree"]);
        command.stdin(std::process::Stdio::piped());
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());
        let mut child = command
            .spawn()
            .context("spawning git mktree")?;
        {
            use std::io::Write as _;
            let mut stdin = child.stdin.take().expect("piped stdin");
            let body = lines.join("\n") + "\n";
            stdin.write_all(body.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        let status = crate::util::SafeExitStatus::new(output.status);
        if !status.success() {
            bail!(
                "git mktree failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(crate::util::trim_newline_suffix(&String::from_utf8(output.stdout)?).to_owned())
    }

    /// Returns `tree`'s entries with `.gitrepo` removed, for the `branch`
    /// rewrite's tree-drop pass (4.2.3 step 7).
    pub fn tree_without_gitrepo(&self, tree: &str) -> Result<String> {
        let lines: Vec<String> = self
            .ls_tree(tree)?
            .into_iter()
            .filter(|line| !line.ends_with("\t.gitrepo"))
            .collect();
        self.mktree(&lines)
    }

    pub fn commit_tree(
        &self,
        tree: &str,
        parents: &[CommitId],
        message: &str,
    ) -> Result<CommitId> {
        let mut command = self.command(&[]);
        command.arg("commit-tree").arg(tree);
        for parent in parents {
            command.arg("-p").arg(parent.as_str());
        }
        command.arg("-m").arg(message);
        command
            .trace_command(command_span!("commit-tree"))
            .check_success_with_stderr()
            .context("git commit-tree failed")?
            .stdout_trimmed()?
            .parse()
    }

    /// Topologically ordered (oldest first) commits in `range`, e.g.
    /// `"parent..HEAD"`.
    pub fn rev_list_topo_reverse(&self, range: &str) -> Result<Vec<CommitId>> {
        let output = self.run_stdout(
            "rev-list",
            &["rev-list", "--topo-order", "--reverse", range],
        )?;
        output.lines().map(str::parse).collect()
    }

    /// Rebases `branch` onto `onto`. On conflict the branch checkout is left
    /// mid-rebase (per the host's `--all` recovery contract) and the
    /// captured output is returned for the caller to print as a recovery
    /// script.
    pub fn rebase_branch_onto(&self, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        self.checkout(branch)?;
        let mut command = self.command(&["rebase", onto]);
        let output = command
            .trace_command(command_span!("rebase"))
            .safe_output()?;
        if output.status.success() {
            Ok(RebaseOutcome::Completed)
        } else {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            Ok(RebaseOutcome::Conflict { output: combined })
        }
    }

    pub fn remote_get_url(&self, name: &str) -> Result<Option<String>> {
        let mut command = self.command(&["remote", "get-url", name]);
        let output = command
            .trace_command(command_span!("remote"))
            .safe_output()?;
        if output.status.success() {
            Ok(Some(output.stdout_trimmed()?))
        } else {
            Ok(None)
        }
    }

    pub fn remote_ensure(&self, name: &str, url: &str) -> Result<()> {
        match self.remote_get_url(name)? {
            Some(existing) if existing == url => Ok(()),
            Some(_) => {
                self.run("remote", &["remote", "set-url", name, url])?;
                Ok(())
            }
            None => {
                self.run("remote", &["remote", "add", name, url])?;
                Ok(())
            }
        }
    }

    pub fn remote_remove(&self, name: &str) -> Result<()> {
        if self.remote_get_url(name)?.is_some() {
            self.run("remote", &["remote", "remove", name])?;
        }
        Ok(())
    }
}
