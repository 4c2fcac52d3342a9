//! Session configuration and opening.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ServiceContext;
use crate::error::SpawnError;
use crate::probe;

use super::batch::{Batch, BatchResult};
use super::dispatch::{Dispatcher, InlineDispatcher};
use super::outcome::Outcome;
use super::session::{LineListener, Session, SessionOptions};

/// Default watchdog allowance while `open_checked` waits for an elevation
/// prompt.
pub const OPEN_WATCHDOG_TIMEOUT: u32 = 60;

/// Default watchdog tick.
pub const DEFAULT_WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Configures and opens a [`Session`].
///
/// ```no_run
/// use sushell::shell::Builder;
///
/// let session = Builder::new().use_sh().watchdog_timeout(10).open()?;
/// session.submit_lines(["echo hello"], 7, |result| println!("{:?}", result.output));
/// session.close();
/// # Ok::<(), sushell::error::SpawnError>(())
/// ```
pub struct Builder {
    shell: String,
    env: BTreeMap<String, String>,
    want_stderr: bool,
    log_io: bool,
    watchdog_timeout: u32,
    open_watchdog_timeout: u32,
    watchdog_tick: Duration,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    stdout_listener: Option<LineListener>,
    stderr_listener: Option<LineListener>,
    pending: Vec<Batch>,
    context: ServiceContext,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Starts from `sh`, no watchdog, inline callbacks and live adapters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            env: BTreeMap::new(),
            want_stderr: false,
            log_io: true,
            watchdog_timeout: 0,
            open_watchdog_timeout: OPEN_WATCHDOG_TIMEOUT,
            watchdog_tick: DEFAULT_WATCHDOG_TICK,
            dispatcher: None,
            stdout_listener: None,
            stderr_listener: None,
            pending: Vec::new(),
            context: ServiceContext::live(),
        }
    }

    /// Sets the shell command line, e.g. `sh` or `su --mount-master`.
    #[must_use]
    pub fn shell(mut self, command_line: impl Into<String>) -> Self {
        self.shell = command_line.into();
        self
    }

    /// Uses the unprivileged `sh`.
    #[must_use]
    pub fn use_sh(self) -> Self {
        self.shell("sh")
    }

    /// Uses the elevation helper `su`.
    #[must_use]
    pub fn use_su(self) -> Self {
        self.shell("su")
    }

    /// Includes stderr lines in batch output.
    #[must_use]
    pub fn want_stderr(mut self, want: bool) -> Self {
        self.want_stderr = want;
        self
    }

    /// Adds one environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds several environment overrides.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Queues a batch to run as soon as the shell is up.
    #[must_use]
    pub fn batch(mut self, batch: Batch) -> Self {
        self.pending.push(batch);
        self
    }

    /// Queues command lines whose output is discarded.
    #[must_use]
    pub fn command<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch(Batch::new(lines, 0))
    }

    /// Receives every stdout line of every batch.
    #[must_use]
    pub fn on_stdout_line(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.stdout_listener = Some(Arc::new(listener));
        self
    }

    /// Receives every stderr line of every batch.
    #[must_use]
    pub fn on_stderr_line(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.stderr_listener = Some(Arc::new(listener));
        self
    }

    /// Sets the per-batch watchdog allowance in ticks; 0 disables it.
    #[must_use]
    pub fn watchdog_timeout(mut self, ticks: u32) -> Self {
        self.watchdog_timeout = ticks;
        self
    }

    /// Sets the watchdog allowance for the `open_checked` probe batch.
    #[must_use]
    pub fn open_watchdog_timeout(mut self, ticks: u32) -> Self {
        self.open_watchdog_timeout = ticks;
        self
    }

    /// Sets the watchdog tick length.
    #[must_use]
    pub fn watchdog_tick(mut self, tick: Duration) -> Self {
        self.watchdog_tick = tick;
        self
    }

    /// Runs callbacks through `dispatcher` instead of inline.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Turns logging of written commands and output lines on or off.
    #[must_use]
    pub fn log_io(mut self, enabled: bool) -> Self {
        self.log_io = enabled;
        self
    }

    /// Uses the given ports instead of the live ones.
    #[must_use]
    pub fn context(mut self, context: ServiceContext) -> Self {
        self.context = context;
        self
    }

    /// Starts the shell.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnError`] if the shell cannot be started.
    pub fn open(self) -> Result<Session, SpawnError> {
        let options = SessionOptions {
            shell: self.shell,
            env: self.env,
            want_stderr: self.want_stderr,
            log_io: self.log_io,
            watchdog_timeout: self.watchdog_timeout,
            watchdog_tick: self.watchdog_tick,
            dispatcher: self.dispatcher.unwrap_or_else(|| Arc::new(InlineDispatcher::new())),
            stdout_listener: self.stdout_listener,
            stderr_listener: self.stderr_listener,
            context: self.context,
        };
        Session::start(options, self.pending)
    }

    /// Starts the shell and verifies it actually works.
    ///
    /// `on_open` receives [`Outcome::SpawnFailed`] (directly, on this thread)
    /// if the shell cannot be started. Otherwise a probe batch runs with a
    /// generous watchdog, leaving time for an elevation prompt, and
    /// `on_open` later receives [`Outcome::RUNNING`],
    /// [`Outcome::WrongPrivilege`] when an `su` shell is not root (or the
    /// probe output is unrecognisable), or the fatal outcome that ended the
    /// probe. The configured watchdog allowance applies afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnError`] if the shell cannot be started.
    pub fn open_checked<F>(self, on_open: F) -> Result<Session, SpawnError>
    where
        F: FnOnce(Outcome, Vec<String>) + Send + 'static,
    {
        let steady_timeout = self.watchdog_timeout;
        let open_timeout = self.open_watchdog_timeout;
        let check_for_root = probe::is_su(&self.shell);
        let session = match self.open() {
            Ok(session) => session,
            Err(e) => {
                on_open(Outcome::SpawnFailed, Vec::new());
                return Err(e);
            }
        };

        session.set_watchdog_timeout(open_timeout);
        let handle = session.handle();
        session.submit(Batch::new(probe::AVAILABLE_TEST_COMMANDS, 0).on_result(
            move |result: BatchResult| {
                handle.set_watchdog_timeout(steady_timeout);
                let outcome = match result.outcome {
                    // A helper that exits during the check (access denied) left no shell.
                    Outcome::Exited(_) if !handle.is_running() => Outcome::ShellDied,
                    Outcome::Exited(_) if probe::parse_available(&result.output, check_for_root) => {
                        Outcome::RUNNING
                    }
                    Outcome::Exited(_) => Outcome::WrongPrivilege,
                    fatal => fatal,
                };
                on_open(outcome, result.output);
            },
        ));
        Ok(session)
    }
}
