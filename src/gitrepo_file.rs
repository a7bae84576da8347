use anyhow::Context as _;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

use crate::util::CommandExtension as _;

const HEADER: &str = "\
; DO NOT EDIT this file by hand, it was generated by git-subrepo.
; See the `git subrepo` documentation before changing it manually,
; as doing so incorrectly can corrupt the subrepo's history.
";

/// The persisted `<subdir>/.gitrepo` record (§3 DATA MODEL), an INI file
/// read and written through Git's own config parser (`git config --file=`)
/// so that hand edits using `git config` stay compatible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepoFile {
    pub remote: String,
    pub branch: String,
    pub commit: String,
    pub parent: String,
    pub cmdver: String,
}

impl GitRepoFile {
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let remote = config_get(path, "subrepo.remote")?
            .with_context(|| format!("{}: missing subrepo.remote", path.display()))?;
        let branch = config_get(path, "subrepo.branch")?
            .with_context(|| format!("{}: missing subrepo.branch", path.display()))?;
        let commit = config_get(path, "subrepo.commit")?.unwrap_or_default();
        // `parent` is the current key; `former` is the deprecated alias some
        // older `.gitrepo` files still carry. Prefer `parent` when both are
        // present.
        let parent = match config_get(path, "subrepo.parent")? {
            Some(parent) => parent,
            None => config_get(path, "subrepo.former")?.unwrap_or_default(),
        };
        let cmdver = config_get(path, "subrepo.cmdver")?.unwrap_or_default();
        Ok(Some(GitRepoFile {
            remote,
            branch,
            commit,
            parent,
            cmdver,
        }))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let is_new = !path.exists();
        if is_new {
            std::fs::write(path, HEADER)
                .with_context(|| format!("creating {}", path.display()))?;
        }
        config_set(path, "subrepo.remote", &self.remote)?;
        config_set(path, "subrepo.branch", &self.branch)?;
        config_set(path, "subrepo.commit", &self.commit)?;
        config_set(path, "subrepo.parent", &self.parent)?;
        config_set(path, "subrepo.cmdver", &self.cmdver)?;
        // `former` is read-only/deprecated; never written back.
        config_unset(path, "subrepo.former")?;
        Ok(())
    }

    /// Whether this file's `former` key, rather than `parent`, was the one
    /// actually present on disk, so callers can surface a deprecation note.
    pub fn used_deprecated_former(path: &Path) -> Result<bool> {
        Ok(config_get(path, "subrepo.parent")?.is_none()
            && config_get(path, "subrepo.former")?.is_some())
    }
}

fn config_get(path: &Path, key: &str) -> Result<Option<String>> {
    let mut command = Command::new("git");
    command.args(["config", "--file"]).arg(path).arg("--get").arg(key);
    let output = command.safe_output()?;
    if output.status.success() {
        Ok(Some(
            crate::util::trim_newline_suffix(&output.stdout_string()?).to_owned(),
        ))
    } else {
        Ok(None)
    }
}

fn config_set(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut command = Command::new("git");
    command
        .args(["config", "--file"])
        .arg(path)
        .arg(key)
        .arg(value);
    command
        .check_success_with_stderr()
        .with_context(|| format!("writing {key} to {}", path.display()))?;
    Ok(())
}

fn config_unset(path: &Path, key: &str) -> Result<()> {
    let mut command = Command::new("git");
    command
        .args(["config", "--file"])
        .arg(path)
        .args(["--unset", key]);
    // Exit code 5 means the key was already absent; not an error here.
    let output = command.safe_output()?;
    if output.status.success() || output.status.code() == Some(5) {
        Ok(())
    } else {
        output.check_success_with_stderr()?;
        Ok(())
    }
}
