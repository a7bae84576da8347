mod cli;

use crate::cli::Cli;
use crate::cli::Commands;
use anyhow::Result;
use clap::Parser;
use colored::Colorize as _;
use git_subrepo::engine::Engine;
use git_subrepo::engine::SubrepoOutcome;
use git_subrepo::error;
use git_subrepo::log;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    install_colored_panic_hook();

    let args = Cli::parse();
    let log_level_value = match args.log_level.value() {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{}: {err:#}", "git-subrepo".red().bold());
            return ExitCode::from(2);
        }
    };
    log::init(log_level_value);

    let working_directory = args
        .working_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let engine = Engine::new(working_directory);

    match run(&engine, &args.command) {
        Ok(SubrepoOutcome::Ok) => ExitCode::SUCCESS,
        Ok(SubrepoOutcome::NoOp(message)) => {
            log::info(message);
            ExitCode::SUCCESS
        }
        Ok(SubrepoOutcome::PullConflict) => ExitCode::from(error::PULL_CONFLICT_CODE as u8),
        Ok(SubrepoOutcome::PushConflict) => ExitCode::from(error::PUSH_CONFLICT_CODE as u8),
        Err(err) => {
            log::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn install_colored_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic| {
        if let Some(payload) = panic.payload().downcast_ref::<&str>() {
            eprintln!("\n{}\n", payload.red());
        } else if let Some(payload) = panic.payload().downcast_ref::<String>() {
            eprintln!("\n{}\n", payload.red());
        }
        default_hook(panic);
    }));
}

fn run(engine: &Engine, command: &Commands) -> Result<SubrepoOutcome> {
    match command {
        Commands::Clone(args) => {
            engine.clone(
                &args.remote,
                args.subdir.as_deref(),
                args.branch.as_deref(),
                args.force,
            )
        }
        Commands::Fetch(args) => {
            for_each_subdir(engine, args.subdir.as_deref(), args.all, |subdir| {
                engine.fetch(subdir, args.remote.as_deref(), args.branch.as_deref())?;
                Ok(SubrepoOutcome::Ok)
            })
        }
        Commands::Branch(args) => {
            for_each_subdir(engine, args.subdir.as_deref(), args.all, |subdir| {
                if args.fetch {
                    engine.fetch(subdir, None, None)?;
                }
                match engine.branch(subdir, args.force)? {
                    Some(_) => Ok(SubrepoOutcome::Ok),
                    None => Ok(SubrepoOutcome::NoOp(format!(
                        "no new commits to branch for {subdir}"
                    ))),
                }
            })
        }
        Commands::Commit(args) => {
            if args.fetch {
                engine.fetch(&args.subdir, None, None)?;
            }
            engine.commit(&args.subdir, args.commit_ref.as_deref(), args.force)
        }
        Commands::Pull(args) => {
            args.overrides.validate()?;
            for_each_subdir(engine, args.subdir.as_deref(), args.all, |subdir| {
                engine.pull(
                    subdir,
                    args.overrides.remote.as_deref(),
                    args.overrides.branch.as_deref(),
                    args.overrides.update,
                )
            })
        }
        Commands::Push(args) => {
            args.overrides.validate()?;
            for_each_subdir(engine, args.subdir.as_deref(), args.all, |subdir| {
                engine.push(
                    subdir,
                    args.branch_name.as_deref(),
                    args.force,
                    args.overrides.remote.as_deref(),
                    args.overrides.branch.as_deref(),
                    args.overrides.update,
                )
            })
        }
        Commands::Status(args) => {
            let entries = engine.status(&args.subdirs, args.fetch)?;
            print_status(&entries);
            Ok(SubrepoOutcome::Ok)
        }
        Commands::Clean(args) => {
            for_each_subdir(engine, args.subdir.as_deref(), args.all, |subdir| {
                engine.clean(subdir, args.force)?;
                Ok(SubrepoOutcome::Ok)
            })
        }
        Commands::Version => {
            println!("git-subrepo {}", env!("CARGO_PKG_VERSION"));
            Ok(SubrepoOutcome::Ok)
        }
    }
}

/// Runs `f` over either the single named subdir or, with `--all`, every
/// subrepo discovered in the worktree, continuing past failures and
/// reporting a summary at the end (§5, §7).
fn for_each_subdir(
    engine: &Engine,
    subdir: Option<&str>,
    all: bool,
    f: impl Fn(&str) -> Result<SubrepoOutcome>,
) -> Result<SubrepoOutcome> {
    if all {
        let subdirs = engine
            .status(&[], false)?
            .into_iter()
            .map(|entry| entry.subdir)
            .collect::<Vec<_>>();
        let observer = log::ErrorObserver::new(log::ErrorMode::KeepGoing);
        let mut last_conflict = None;
        for subdir in subdirs {
            let _scope = log::scope(subdir.clone());
            let result = f(&subdir).map(|outcome| {
                if matches!(outcome, SubrepoOutcome::PullConflict | SubrepoOutcome::PushConflict) {
                    last_conflict = Some(outcome);
                }
            });
            observer.consume(result)?;
        }
        observer.into_result()?;
        Ok(last_conflict.unwrap_or(SubrepoOutcome::Ok))
    } else {
        let subdir = subdir.ok_or_else(|| anyhow::anyhow!("a subdir argument or --all is required"))?;
        f(subdir)
    }
}

fn print_status(entries: &[git_subrepo::engine::StatusEntry]) {
    if log::quiet() {
        for entry in entries {
            println!("{}", entry.subdir);
        }
        return;
    }
    for entry in entries {
        println!("{}", entry.subdir.bold());
        println!("  remote: {}", entry.remote);
        println!("  branch: {}", entry.branch);
        println!("  commit: {}", entry.commit);
        if entry.uses_legacy_former {
            println!("  parent: {} (deprecated: recorded as 'former')", entry.parent);
        } else {
            println!("  parent: {}", entry.parent);
        }
        if let Some(fetch_ref) = &entry.fetch_ref {
            println!("  fetch:  {fetch_ref}");
        }
        if let Some(branch_ref) = &entry.branch_ref {
            println!("  branch ref: {branch_ref}");
        }
        if let Some(commit_ref) = &entry.commit_ref {
            println!("  commit ref: {commit_ref}");
        }
        if let Some(pull_ref) = &entry.pull_ref {
            println!("  pull:   {pull_ref}");
        }
        if let Some(push_ref) = &entry.push_ref {
            println!("  push:   {push_ref}");
        }
    }
}
