/// Leveled, colored, scoped logging to stderr, plus a tracing span around
/// every spawned `git` subprocess so that `-vv` reads as a nested trace of
/// what the engine actually did.
use colored::Colorize as _;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::rc::Rc;
use std::sync::atomic::AtomicI8;
use std::sync::atomic::Ordering;

pub use tracing::Level;

/// One tier quieter than `Level::ERROR`, reached by `-qqq` (§8 property h):
/// every log line, including errors, is suppressed.
pub const OFF: i8 = -1;

static MAX_LEVEL: AtomicI8 = AtomicI8::new(level_to_value(Level::INFO));

const fn level_to_value(level: Level) -> i8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        Level::TRACE => 4,
    }
}

/// Installs the stderr logger and sets the initial verbosity. Also brings up
/// a bare `tracing` subscriber so that `CommandSpanExt` spans have somewhere
/// to go; `git-subrepo` does not (yet) persist a trace file, unlike the
/// teacher codebase this is modeled on.
pub fn init(value: i8) {
    set_level_value(value);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(false)
        .without_time()
        .with_max_level(tracing::level_filters::LevelFilter::TRACE)
        .finish();
    // Another invocation (e.g. in tests that run the binary's `main` in
    // process) may have already installed a subscriber; that is fine, we
    // only need the first one. We never print through this subscriber
    // ourselves (see `emit`, below) -- it only gives `CommandSpanExt` spans
    // somewhere to attach to for anything else that cares to listen.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn set_level(level: Level) {
    set_level_value(level_to_value(level));
}

pub fn set_level_value(value: i8) {
    MAX_LEVEL.store(value, Ordering::Relaxed);
}

fn enabled(level: Level) -> bool {
    level_to_value(level) <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Whether any `-q` was given, i.e. `Level::INFO` itself is suppressed.
/// `status` (§4.2.7) uses this to print only subdir paths instead of the
/// full recorded metadata.
pub fn quiet() -> bool {
    !enabled(Level::INFO)
}

fn colored_level(level: Level) -> colored::ColoredString {
    let s = level.as_str();
    match level {
        Level::ERROR => s.red().bold(),
        Level::WARN => s.yellow().bold(),
        Level::INFO => s.green(),
        Level::DEBUG => s.blue(),
        Level::TRACE => s.into(),
    }
}

/// Emits one log line at `level`, prefixed by the current [`scope`], to
/// stderr, gated entirely by [`enabled`] -- the `-qqq` tier (§8 property h)
/// must suppress this unconditionally, so, unlike [`CommandSpanExt`]'s
/// subprocess spans, this never goes through the `tracing` subscriber, whose
/// own level filter is fixed at installation time.
pub fn emit(level: Level, msg: impl fmt::Display) {
    if !enabled(level) {
        return;
    }
    let context = current_scope();
    let line = if context.is_empty() {
        msg.to_string()
    } else {
        format!("{context}: {msg}")
    };
    eprintln!("{}: {line}", colored_level(level));
}

pub fn error(msg: impl fmt::Display) {
    emit(Level::ERROR, msg);
}

pub fn info(msg: impl fmt::Display) {
    emit(Level::INFO, msg);
}

pub fn debug(msg: impl fmt::Display) {
    emit(Level::DEBUG, msg);
}

pub fn trace(msg: impl fmt::Display) {
    emit(Level::TRACE, msg);
}

thread_local! {
    static CURRENT_LOG_SCOPE: RefCell<Option<Rc<LogScopeContext>>> = const { RefCell::new(None) };
}

struct LogScopeContext {
    previous: Option<Rc<LogScopeContext>>,
    context: String,
}

impl LogScopeContext {
    fn full_context(&self) -> String {
        match &self.previous {
            Some(previous) => {
                let previous_full_context = previous.full_context();
                if previous_full_context.is_empty() {
                    self.context.clone()
                } else {
                    format!("{previous_full_context}: {}", self.context)
                }
            }
            None => self.context.clone(),
        }
    }
}

pub fn current_scope() -> String {
    CURRENT_LOG_SCOPE.with(|cell| {
        cell.borrow()
            .as_ref()
            .map_or_else(String::new, |scope| scope.full_context())
    })
}

/// A logging scope, entered on construction and exited on drop. Nested scopes
/// build a colon-separated context string, e.g. `pull foo: branch:
/// subdirectory-rewrite`, prefixed onto every log line emitted while active.
pub struct LogScope {
    inner: Rc<LogScopeContext>,
}

impl LogScope {
    pub fn new(context: impl Into<String>) -> Self {
        let inner = CURRENT_LOG_SCOPE.with(|cell| {
            let previous = cell.borrow().clone();
            let new_scope = Rc::new(LogScopeContext {
                previous,
                context: context.into(),
            });
            *cell.borrow_mut() = Some(new_scope.clone());
            new_scope
        });
        LogScope { inner }
    }
}

impl Drop for LogScope {
    fn drop(&mut self) {
        CURRENT_LOG_SCOPE.with(|cell| {
            *cell.borrow_mut() = self.inner.previous.clone();
        });
    }
}

/// Creates a new logging scope with the given context and enters it.
pub fn scope(context: impl Into<String>) -> LogScope {
    LogScope::new(context)
}

/// Whether a multi-subrepo operation (`--all`) stops at the first failing
/// subrepo or keeps going and reports a summary at the end.
#[derive(Clone, Copy)]
pub enum ErrorMode {
    KeepGoing,
    FailFast,
}

/// Accumulates errors across an `--all` run the way the teacher's
/// `ErrorObserver` does: each failure is logged immediately, and a single
/// summary error is returned at the end if anything failed.
pub struct ErrorObserver {
    failures: std::cell::Cell<usize>,
    mode: ErrorMode,
}

impl ErrorObserver {
    pub fn new(mode: ErrorMode) -> Self {
        ErrorObserver {
            failures: std::cell::Cell::new(0),
            mode,
        }
    }

    /// Runs `f`; on error, logs it and either stops (`FailFast`) or returns
    /// `Ok(())` and keeps counting (`KeepGoing`).
    pub fn consume(&self, result: anyhow::Result<()>) -> anyhow::Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failures.set(self.failures.get() + 1);
                match self.mode {
                    ErrorMode::KeepGoing => {
                        error(format!("{err:#}"));
                        Ok(())
                    }
                    ErrorMode::FailFast => Err(err),
                }
            }
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.get()
    }

    /// Returns an error summarizing how many subrepos failed, if any.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.failures.get() {
            0 => Ok(()),
            1 => anyhow::bail!("1 subrepo failed, see above"),
            n => anyhow::bail!("{n} subrepos failed, see above"),
        }
    }
}

/// Convenience for spawning a named `tracing` span around a `git`
/// subcommand, used by [`CommandSpanExt::trace_command`].
#[macro_export]
macro_rules! command_span {
    ($name:expr) => {
        $name
    };
}

/// Holds both a `tracing` span (for anything else listening) and the
/// underlying command, alive for as long as the spawn it wraps.
pub struct CommandSpanScope<'a> {
    command: &'a mut std::process::Command,
    _entered_span: tracing::span::EnteredSpan,
}

impl<'a> CommandSpanScope<'a> {
    fn new(command: &'a mut std::process::Command, subcommand: &str) -> Self {
        let line = crate::util::command_to_string_lossy(command);
        debug(format!("Running {line}"));
        trace(format!("git {subcommand}: {line}"));
        let span = tracing::debug_span!("git", subcommand = %subcommand, cmd = %line);
        CommandSpanScope {
            command,
            _entered_span: span.entered(),
        }
    }
}

impl Deref for CommandSpanScope<'_> {
    type Target = std::process::Command;

    fn deref(&self) -> &Self::Target {
        self.command
    }
}

impl DerefMut for CommandSpanScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.command
    }
}

/// Wraps every spawned `git` subprocess in a named tracing span, mirroring
/// the teacher's `CommandSpanExt`/`command_span!` pattern, and logs it at
/// `debug` (the command line) and `trace` (the subcommand name) so `-vv`
/// produces a visible trace of every process the engine spawns (§8 property
/// g).
pub trait CommandSpanExt {
    fn trace_command(&mut self, subcommand: &str) -> CommandSpanScope<'_>;
}

impl CommandSpanExt for std::process::Command {
    fn trace_command(&mut self, subcommand: &str) -> CommandSpanScope<'_> {
        CommandSpanScope::new(self, subcommand)
    }
}
