use anyhow::bail;
use std::cell::Cell;
use std::io::Write;
use std::ops::Deref;
use std::ops::DerefMut;
use std::path::Path;
use std::process::Command;
use std::process::ExitStatus;

/// Removes trailing LF or CRLF from a string.
///
/// ```
/// use git_subrepo::util::trim_newline_suffix;
///
/// assert_eq!(trim_newline_suffix("foo"), "foo");
/// assert_eq!(trim_newline_suffix("foo\n"), "foo");
/// assert_eq!(trim_newline_suffix("foo\r\n"), "foo");
/// assert_eq!(trim_newline_suffix("foo\nbar\n"), "foo\nbar");
/// ```
pub fn trim_newline_suffix(line: &str) -> &str {
    let Some(line) = line.strip_suffix('\n') else {
        return line;
    };
    line.strip_suffix('\r').unwrap_or(line)
}

/// Writes `contents` to `path` like `std::fs::write`, marking the result
/// executable on Unix (git-subrepo only ever uses this for hook scripts, and
/// Windows has no such bit to set).
pub fn write_executable<P, C>(path: P, contents: C) -> std::io::Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if cfg!(windows) {
        return std::fs::write(path, contents);
    }
    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true);
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o755);
    let mut file = options.open(path)?;
    file.write_all(contents.as_ref())
}

/// Extends [`Command`] so call sites get a captured, already-validated
/// [`SafeOutput`] in one step rather than checking `status.success()` by
/// hand at every spawn site.
pub trait CommandExtension {
    fn safe_output(&mut self) -> std::io::Result<SafeOutput>;

    /// Runs the command and turns a non-zero exit into an [`anyhow::Error`]
    /// that carries stderr, instead of a silent [`SafeOutput`] the caller
    /// might forget to check.
    fn check_success_with_stderr(&mut self) -> anyhow::Result<SafeOutput> {
        let output = self.safe_output()?;
        output.check_success_with_stderr()?;
        Ok(output)
    }
}

impl CommandExtension for Command {
    fn safe_output(&mut self) -> std::io::Result<SafeOutput> {
        let output = self.output()?;
        let status = SafeExitStatus::new(output.status);
        Ok(SafeOutput { output, status })
    }
}

/// Captured `stdout`/`stderr` plus a [`SafeExitStatus`] that must be
/// consulted before this goes out of scope.
pub struct SafeOutput {
    output: std::process::Output,
    pub status: SafeExitStatus,
}

/// Guards an [`ExitStatus`] so it cannot be dropped unexamined: a call site
/// that never looks at `status` (via `Deref`, `Display`, or
/// `check_success_with_stderr`) panics instead of letting a failed command
/// pass as silent success.
pub struct SafeExitStatus {
    status: ExitStatus,
    consulted: Cell<bool>,
}

impl SafeExitStatus {
    pub fn new(status: ExitStatus) -> Self {
        SafeExitStatus {
            status,
            consulted: Cell::new(false),
        }
    }
}

impl Drop for SafeExitStatus {
    fn drop(&mut self) {
        if !self.consulted.get() {
            panic!("exit status dropped without being checked");
        }
    }
}

impl Deref for SafeExitStatus {
    type Target = ExitStatus;

    fn deref(&self) -> &Self::Target {
        self.consulted.set(true);
        &self.status
    }
}

impl std::fmt::Display for SafeExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.status.fmt(f)
    }
}

impl SafeOutput {
    /// Turns a failed exit status into an error combining the status and
    /// stderr on one line, or across several if stderr itself is
    /// multi-line.
    pub fn check_success_with_stderr(&self) -> anyhow::Result<&Self> {
        if self.status.success() {
            return Ok(self);
        }
        let stderr = String::from_utf8_lossy(&self.stderr);
        let separator = if stderr.trim_ascii().contains('\n') {
            ":\n"
        } else {
            ": "
        };
        match stderr.as_ref() {
            "" => bail!("{}", self.status),
            stderr => bail!("{}{separator}{stderr}", self.status),
        }
    }

    pub fn stdout_string(&self) -> anyhow::Result<String> {
        Ok(String::from_utf8(self.output.stdout.clone())?)
    }

    pub fn stdout_trimmed(&self) -> anyhow::Result<String> {
        Ok(trim_newline_suffix(&self.stdout_string()?).to_owned())
    }
}

impl Deref for SafeOutput {
    type Target = std::process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

impl DerefMut for SafeOutput {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.output
    }
}

/// Format a command argument for display on a shell command line. If
/// escaping is needed, single quotes are added.
///
/// # Examples
/// ```
/// use git_subrepo::util::format_arg_lossy;
/// use std::ffi::OsStr;
///
/// assert_eq!(format_arg_lossy(OsStr::new("arg")), "arg");
/// assert_eq!(format_arg_lossy(OsStr::new("some arg")), "'some arg'");
/// ```
pub fn format_arg_lossy(arg: &std::ffi::OsStr) -> String {
    let s = arg.to_string_lossy();
    if [' ', '"', '$'].iter().any(|c| s.contains(*c)) {
        format!("'{}'", s.replace('\'', "'\\''"))
    } else if s.contains('\'') {
        s.replace('\'', "\\'")
    } else {
        s.to_string()
    }
}

pub fn command_to_string_lossy(cmd: &std::process::Command) -> String {
    format!(
        "{} {}",
        format_arg_lossy(cmd.get_program()),
        cmd.get_args()
            .map(format_arg_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    )
}
