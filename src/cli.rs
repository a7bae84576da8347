/** Command line argument definition using subcommands.
 *
 * See also https://jmmv.dev/2013/08/cli-design-putting-flags-to-good-use.html#bad-using-flags-to-select-subcommands.
 */
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

use crate::log;

const ABOUT: &str = "Embed an upstream Git repository as a subdirectory, with pull/push back \
to the origin, without flattening its history into yours.";

#[derive(Parser, Debug)]
#[command(about = ABOUT, name = "git-subrepo")]
pub struct Cli {
    /// Run as if started in <path>.
    #[arg(name = "path", short = 'C', global = true)]
    pub working_directory: Option<PathBuf>,

    #[clap(flatten)]
    pub log_level: LogLevelArg,

    #[command(subcommand)]
    pub command: Commands,
}

const DEFAULT_LOG_LEVEL: i8 = 2; // Level::INFO

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct LogLevelArg {
    /// Use `-v` for debug or `-vv` for trace log messages.
    #[arg(long, short = 'v', global = true, default_value = "0", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use `-q` to hide info, `-qq` to hide warnings, or `-qqq` to also hide
    /// error messages.
    #[arg(long, short = 'q', global = true, default_value = "0", action = clap::ArgAction::Count)]
    quiet: u8,
}

impl LogLevelArg {
    /// Resolves the verbosity, preset by `GIT_SUBREPO_QUIET`/`_VERBOSE`/
    /// `_DEBUG` (§6.2) unless an explicit `-v`/`-q` flag overrides them.
    pub fn value(&self) -> anyhow::Result<i8> {
        let (verbose, quiet) = if self.verbose == 0 && self.quiet == 0 {
            env_preset()
        } else {
            (self.verbose, self.quiet)
        };
        let level = DEFAULT_LOG_LEVEL as i16 + verbose as i16 - quiet as i16;
        if level < log::OFF as i16 {
            anyhow::bail!("Too quiet log level, {} below silent", log::OFF as i16 - level);
        } else if level > 4 {
            anyhow::bail!("Too verbose log level, {} above trace", level - 4);
        }
        Ok(level as i8)
    }
}

fn env_preset() -> (u8, u8) {
    if is_env_truthy("GIT_SUBREPO_DEBUG") {
        (2, 0)
    } else if is_env_truthy("GIT_SUBREPO_VERBOSE") {
        (1, 0)
    } else if is_env_truthy("GIT_SUBREPO_QUIET") {
        (0, 1)
    } else {
        (0, 0)
    }
}

fn is_env_truthy(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| !value.is_empty() && value != "0")
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone an upstream repository into a subdirectory.
    Clone(Clone),
    /// Update a subdirectory from its upstream remote.
    Pull(SubdirCommand),
    /// Push local commits under a subdirectory back to its upstream remote.
    Push(Push),
    /// Fetch a subrepo's remote without touching the mainline tree.
    Fetch(Fetch),
    /// Synthesise the upstream-equivalent branch for a subdirectory.
    Branch(Branch),
    /// Squash a ref into a subdirectory as a single mainline commit.
    Commit(Commit),
    /// Show the recorded remote, branch and commit for one or all subrepos.
    Status(Status),
    /// Remove the synthesised branches, remote and (optionally) refs for a subdirectory.
    Clean(Clean),
    /// Print the version of the git-subrepo tool.
    #[clap(aliases = ["-V", "--version"])]
    Version,
}

#[derive(Args, Debug)]
pub struct Clone {
    /// URL of the upstream repository.
    pub remote: String,

    /// Subdirectory to clone into. Derived from the URL when omitted.
    pub subdir: Option<String>,

    /// Upstream branch to track. Discovered from the remote's HEAD when omitted.
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Re-clone into an existing subrepo, replacing its content.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SubdirCommand {
    /// The subrepo to operate on. Required unless `--all` is given.
    pub subdir: Option<String>,

    /// Process every configured subrepo, in lexicographic order.
    #[arg(long)]
    pub all: bool,

    #[clap(flatten)]
    pub overrides: RemoteOverride,
}

#[derive(Args, Debug)]
pub struct Fetch {
    /// The subrepo to operate on. Required unless `--all` is given.
    pub subdir: Option<String>,

    /// Process every configured subrepo, in lexicographic order.
    #[arg(long)]
    pub all: bool,

    /// Fetch from this branch instead of the recorded one.
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Fetch from this remote instead of the recorded one.
    #[arg(long, short = 'r')]
    pub remote: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct RemoteOverride {
    /// Override the recorded upstream branch.
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Override the recorded upstream remote URL.
    #[arg(long, short = 'r')]
    pub remote: Option<String>,

    /// Persist `--branch`/`--remote` into `.gitrepo`. Requires at least one of them.
    #[arg(long)]
    pub update: bool,
}

impl RemoteOverride {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.update && self.branch.is_none() && self.remote.is_none() {
            anyhow::bail!("--update requires --branch or --remote");
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct Push {
    pub subdir: Option<String>,

    /// An already-rebased branch to push as-is, instead of synthesising one.
    pub branch_name: Option<String>,

    #[arg(long)]
    pub all: bool,

    /// Push even if the candidate does not contain the fetched upstream head.
    #[arg(long)]
    pub force: bool,

    #[clap(flatten)]
    pub overrides: RemoteOverride,
}

#[derive(Args, Debug)]
pub struct Branch {
    pub subdir: Option<String>,

    #[arg(long)]
    pub all: bool,

    /// Fetch before synthesising the branch.
    #[arg(long)]
    pub fetch: bool,

    /// Recreate the branch even if it already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct Commit {
    pub subdir: String,

    /// Ref to squash into `<subdir>/`. Defaults to `subrepo/<subdir>`.
    pub commit_ref: Option<String>,

    /// Fetch before committing.
    #[arg(long)]
    pub fetch: bool,

    /// Commit even if the fetched upstream head is not an ancestor of `<commit-ref>`.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct Status {
    pub subdirs: Vec<String>,

    /// Fetch each subrepo before reporting its status.
    #[arg(long)]
    pub fetch: bool,
}

#[derive(Args, Debug)]
pub struct Clean {
    pub subdir: Option<String>,

    #[arg(long)]
    pub all: bool,

    /// Also delete the `refs/subrepo/<subdir>/` ref subtree.
    #[arg(long)]
    pub force: bool,
}
