//! Interactive shell session.
//!
//! A [`Session`] owns one child shell and feeds it batches one at a time.
//! State lives behind a single mutex shared by the caller threads, both
//! reader threads and the watchdog. User callbacks are posted to the
//! session's [`Dispatcher`] while the lock is held (which fixes their order)
//! and run only after it is released.
//!
//! Lock order: `state` before `child`. `stdin` is never taken while `state`
//! is held.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::context::ServiceContext;
use crate::error::SpawnError;
use crate::ports::process::{ChildProcess, SpawnRequest};

use super::batch::{self, Batch, BatchResult, BatchSink, MarkerGenerator};
use super::dispatch::{self, CallbackTracker, Dispatcher, Task};
use super::outcome::Outcome;
use super::reader::{LineReader, Stream, StreamEvent};
use super::watchdog::{Tick, Ticker, Verdict, WatchdogState};

/// Session-wide listener for every stdout or stderr line.
pub type LineListener = Arc<dyn Fn(&str) + Send + Sync>;

/// How often `close` checks whether the shell has exited.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// How long a shell whose pipes closed gets to report its exit status.
const EXIT_STATUS_GRACE: Duration = Duration::from_millis(250);
const EXIT_STATUS_POLL: Duration = Duration::from_millis(2);

static OPEN_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// Number of sessions opened in this process and not yet closed or killed.
///
/// Intended for leak checks at the end of tests.
#[must_use]
pub fn open_sessions() -> usize {
    OPEN_SESSIONS.load(Ordering::SeqCst)
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The shell is being started.
    Opening,
    /// No batch is running.
    Idle,
    /// A batch is running.
    Busy,
    /// `close` is draining the shell.
    Closing,
    /// The shell is gone; the session accepts no more work.
    Closed,
}

/// Everything a session needs besides its initial queue.
pub(crate) struct SessionOptions {
    pub shell: String,
    pub env: std::collections::BTreeMap<String, String>,
    pub want_stderr: bool,
    pub log_io: bool,
    pub watchdog_timeout: u32,
    pub watchdog_tick: Duration,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub stdout_listener: Option<LineListener>,
    pub stderr_listener: Option<LineListener>,
    pub context: ServiceContext,
}

struct ActiveBatch {
    tag: i32,
    sink: BatchSink,
    marker: String,
    buffer: Option<Vec<String>>,
    exit_code: i32,
    stdout_marker: bool,
    stderr_marker: bool,
}

struct State {
    phase: Phase,
    pending: VecDeque<Batch>,
    active: Option<ActiveBatch>,
    watchdog: WatchdogState,
    ticker: Option<Ticker>,
    armed_epoch: Option<u64>,
    open_streams: u8,
    streams_lost: bool,
}

pub(crate) struct Shared {
    label: String,
    state: Mutex<State>,
    idle: Condvar,
    child: Mutex<Option<Box<dyn ChildProcess>>>,
    stdin: Mutex<Option<Box<dyn Write + Send>>>,
    dispatcher: Arc<dyn Dispatcher>,
    callbacks: Arc<CallbackTracker>,
    markers: MarkerGenerator,
    want_stderr: bool,
    log_io: bool,
    watchdog_tick: Duration,
    stdout_listener: Option<LineListener>,
    stderr_listener: Option<LineListener>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Uppercased program name, used to tag log lines (`SH`, `SU`).
fn label_for(program: &str) -> String {
    program.rsplit('/').next().unwrap_or(program).to_uppercase()
}

/// Collects the exit status of a terminated `child` without blocking the
/// caller; a child that has not exited yet is waited for on its own thread.
fn reap(label: &str, mut child: Box<dyn ChildProcess>) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    let owner = label.to_string();
    let spawned = thread::Builder::new().name(format!("{}-reaper", label.to_lowercase())).spawn(
        move || match child.wait() {
            Ok(code) => debug!(code, "[{owner}%] shell reaped"),
            Err(e) => debug!(error = %e, "[{owner}%] wait for shell failed"),
        },
    );
    if let Err(e) = spawned {
        warn!(error = %e, "[{label}%] failed to start reaper; shell left unreaped");
    }
}

impl Shared {
    fn post(&self, task: Task) {
        self.callbacks.post(self.dispatcher.as_ref(), task);
    }

    /// Writes a batch script (if any) and runs inline callbacks. Must be
    /// called after every state change, with the state lock released.
    fn after_unlock(&self, script: Option<String>) {
        if let Some(script) = script {
            self.write_input(&script);
        }
        self.dispatcher.run_pending();
    }

    fn write_input(&self, text: &str) {
        let mut stdin = lock(&self.stdin);
        let Some(input) = stdin.as_mut() else {
            debug!("[{}%] input already closed", self.label);
            return;
        };
        // A dead shell surfaces through the readers or the watchdog.
        if let Err(e) = input.write_all(text.as_bytes()).and_then(|()| input.flush()) {
            debug!(error = %e, "[{}%] write to shell failed; closing input", self.label);
            stdin.take();
        }
    }

    fn child_running(&self) -> bool {
        match lock(&self.child).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn is_alive(&self, state: &State) -> bool {
        matches!(state.phase, Phase::Idle | Phase::Busy)
            && !state.streams_lost
            && self.child_running()
    }

    /// Outcome for the active batch of a shell that ended on its own.
    ///
    /// A normal exit reports its status, so `exit 3` completes the batch
    /// with `Exited(3)`. Death by signal, or no status within
    /// [`EXIT_STATUS_GRACE`], is `ShellDied`.
    fn exit_outcome(&self) -> Outcome {
        let deadline = Instant::now() + EXIT_STATUS_GRACE;
        loop {
            let status = match lock(&self.child).as_mut() {
                Some(child) => child.try_wait(),
                None => return Outcome::ShellDied,
            };
            match status {
                Ok(Some(code)) if code >= 0 => return Outcome::Exited(code),
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_STATUS_POLL),
                _ => return Outcome::ShellDied,
            }
        }
    }

    fn deliver(&self, tag: i32, sink: BatchSink, outcome: Outcome, output: Vec<String>) {
        match sink {
            BatchSink::None => {}
            BatchSink::Result(callback) => {
                self.post(Box::new(move || callback(BatchResult { tag, outcome, output })));
            }
            BatchSink::Lines(handler) => {
                self.post(Box::new(move || handler.on_result(tag, outcome)));
            }
        }
    }

    /// Promotes the next pending batch if nothing is active.
    ///
    /// Returns the script to write once the lock is released.
    fn run_next(self: &Arc<Self>, state: &mut State) -> Option<String> {
        let mut script = None;
        while state.active.is_none() {
            if !self.is_alive(state) {
                self.fail_pending(state);
                break;
            }
            let Some(batch) = state.pending.pop_front() else { break };
            if batch.is_empty() {
                self.deliver(batch.tag, batch.sink, Outcome::Exited(0), Vec::new());
                continue;
            }
            script = Some(self.activate(state, batch));
        }
        self.settle(state);
        script
    }

    fn activate(self: &Arc<Self>, state: &mut State, batch: Batch) -> String {
        let marker = self.markers.next_marker();
        if self.log_io {
            for line in &batch.lines {
                debug!("[{}+] {line}", self.label);
            }
        }
        let script = batch::encode(&batch.lines, &marker);
        let buffer = batch.sink.wants_buffer().then(Vec::new);
        state.active = Some(ActiveBatch {
            tag: batch.tag,
            sink: batch.sink,
            marker,
            buffer,
            exit_code: 0,
            stdout_marker: false,
            stderr_marker: false,
        });
        state.watchdog.reset();
        self.start_ticker(state);
        script
    }

    /// Syncs the phase with the active slot and wakes idle waiters.
    fn settle(&self, state: &mut State) {
        match (state.phase, state.active.is_some()) {
            (Phase::Idle, true) => state.phase = Phase::Busy,
            (Phase::Busy, false) => state.phase = Phase::Idle,
            _ => {}
        }
        if state.active.is_none() {
            self.idle.notify_all();
        }
    }

    fn fail_pending(&self, state: &mut State) {
        if !state.pending.is_empty() {
            warn!("[{}%] shell not running, failing {} queued batches", self.label, state.pending.len());
        }
        while let Some(batch) = state.pending.pop_front() {
            self.deliver(batch.tag, batch.sink, Outcome::ShellDied, Vec::new());
        }
    }

    /// Ends the active batch with `outcome` and fails everything queued.
    fn abort(&self, state: &mut State, outcome: Outcome) {
        self.stop_ticker(state);
        if let Some(active) = state.active.take() {
            self.deliver(active.tag, active.sink, outcome, active.buffer.unwrap_or_default());
        }
        self.fail_pending(state);
        self.settle(state);
    }

    fn mark_closed(&self, state: &mut State) {
        state.ticker = None;
        state.armed_epoch = None;
        if state.phase != Phase::Closed {
            state.phase = Phase::Closed;
            OPEN_SESSIONS.fetch_sub(1, Ordering::SeqCst);
            info!("[{}%] END", self.label);
        }
        self.idle.notify_all();
    }

    /// Arms the session's ticker for the active batch, starting the ticker
    /// thread on first use.
    fn start_ticker(self: &Arc<Self>, state: &mut State) {
        if !state.watchdog.enabled() {
            self.stop_ticker(state);
            return;
        }
        if state.ticker.is_none() {
            let weak = Arc::downgrade(self);
            let name = format!("{}-watchdog", self.label.to_lowercase());
            match Ticker::start(&name, self.watchdog_tick, move |epoch| match weak.upgrade() {
                Some(shared) => shared.on_tick(epoch),
                None => Tick::Stop,
            }) {
                Ok(ticker) => state.ticker = Some(ticker),
                Err(e) => {
                    warn!(error = %e, "[{}%] failed to start watchdog", self.label);
                    return;
                }
            }
        }
        state.armed_epoch = state.ticker.as_ref().map(Ticker::arm);
    }

    /// Pauses the ticker and invalidates any tick already in progress.
    fn stop_ticker(&self, state: &mut State) {
        if let Some(ticker) = &state.ticker {
            ticker.disarm();
        }
        state.armed_epoch = None;
    }

    fn on_tick(self: &Arc<Self>, epoch: u64) -> Tick {
        {
            let mut state = lock(&self.state);
            if state.armed_epoch != Some(epoch) || state.active.is_none() {
                return Tick::Continue;
            }
            let alive = self.is_alive(&state);
            match state.watchdog.tick(alive) {
                Verdict::Healthy => return Tick::Continue,
                Verdict::TimedOut => {
                    warn!("[{}%] WATCHDOG_EXIT", self.label);
                    self.abort(&mut state, Outcome::WatchdogTimeout);
                }
                Verdict::Dead => {
                    warn!("[{}%] SHELL_DIED", self.label);
                    let outcome = self.exit_outcome();
                    self.abort(&mut state, outcome);
                }
            }
        }
        // Marker lines may still arrive for the aborted batch, so the shell
        // cannot be reused.
        self.kill();
        Tick::Stop
    }

    fn on_event(self: &Arc<Self>, stream: Stream, event: StreamEvent) {
        let script = {
            let mut state = lock(&self.state);
            match event {
                StreamEvent::Line(line) => self.on_line(&mut state, stream, line),
                StreamEvent::Closed => {
                    self.on_stream_closed(&mut state, stream);
                    None
                }
            }
        };
        self.after_unlock(script);
    }

    fn on_line(self: &Arc<Self>, state: &mut State, stream: Stream, line: String) -> Option<String> {
        let Some(active) = state.active.as_mut() else {
            debug!("[{}{}] output with no active batch: {line}", self.label, stream.indicator());
            return None;
        };

        if batch::is_marker(&line, &active.marker) {
            match stream {
                Stream::Stdout => {
                    if let Some(code) = batch::parse_exit_code(&line, &active.marker) {
                        active.exit_code = code;
                    }
                    active.stdout_marker = true;
                }
                Stream::Stderr => active.stderr_marker = true,
            }
            if active.stdout_marker && active.stderr_marker {
                return self.finish_active(state);
            }
            return None;
        }

        if self.log_io {
            trace!("[{}{}] {line}", self.label, stream.indicator());
        }
        let belongs_to_batch = stream == Stream::Stdout || self.want_stderr;
        if belongs_to_batch {
            if let Some(buffer) = active.buffer.as_mut() {
                buffer.push(line.clone());
            }
        }
        let listener = match stream {
            Stream::Stdout => self.stdout_listener.as_ref(),
            Stream::Stderr => self.stderr_listener.as_ref(),
        };
        if let Some(listener) = listener {
            let listener = Arc::clone(listener);
            let line = line.clone();
            self.post(Box::new(move || listener(&line)));
        }
        if belongs_to_batch {
            if let Some(handler) = active.sink.line_handler() {
                let handler = Arc::clone(handler);
                self.post(Box::new(move || handler.on_line(&line)));
            }
        }
        None
    }

    fn finish_active(self: &Arc<Self>, state: &mut State) -> Option<String> {
        let active = state.active.take()?;
        self.stop_ticker(state);
        self.deliver(
            active.tag,
            active.sink,
            Outcome::Exited(active.exit_code),
            active.buffer.unwrap_or_default(),
        );
        self.run_next(state)
    }

    fn on_stream_closed(&self, state: &mut State, stream: Stream) {
        debug!("[{}{}] stream closed", self.label, stream.indicator());
        state.open_streams = state.open_streams.saturating_sub(1);
        if state.open_streams > 0 {
            return;
        }
        state.streams_lost = true;
        if matches!(state.phase, Phase::Idle | Phase::Busy) {
            let outcome = if state.active.is_some() {
                warn!("[{}%] SHELL_DIED", self.label);
                self.exit_outcome()
            } else {
                Outcome::ShellDied
            };
            self.abort(state, outcome);
        }
    }

    /// Completes work stranded on a shell that died without closing its
    /// pipes (or before the watchdog noticed).
    fn reap_if_dead(&self, state: &mut State) {
        if state.active.is_some() && !self.is_alive(state) {
            warn!("[{}%] SHELL_DIED", self.label);
            let outcome = self.exit_outcome();
            self.abort(state, outcome);
        }
    }

    fn set_watchdog_timeout(self: &Arc<Self>, ticks: u32) {
        {
            let mut state = lock(&self.state);
            state.watchdog.timeout = ticks;
            if ticks == 0 {
                self.stop_ticker(&mut state);
            } else if state.active.is_some() && state.armed_epoch.is_none() {
                self.start_ticker(&mut state);
            }
        }
        self.dispatcher.run_pending();
    }

    fn kill(&self) {
        {
            let mut state = lock(&self.state);
            if state.phase == Phase::Closed {
                return;
            }
            self.abort(&mut state, Outcome::ShellDied);
            self.mark_closed(&mut state);
        }
        // Input goes first: a shell that survives the signal still exits
        // at end of input.
        match self.stdin.try_lock() {
            Ok(mut stdin) => drop(stdin.take()),
            Err(TryLockError::Poisoned(poisoned)) => drop(poisoned.into_inner().take()),
            Err(TryLockError::WouldBlock) => {
                debug!("[{}%] input busy; the writer closes it when its write fails", self.label);
            }
        }
        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                warn!(error = %e, "[{}%] kill failed", self.label);
            }
            reap(&self.label, child);
        }
        self.dispatcher.run_pending();
    }
}

/// A long-lived interactive shell accepting batches of commands.
///
/// Create one with [`super::Builder`]. A session must be ended with
/// [`Session::close`] or [`Session::kill`]; dropping an open session kills
/// the shell and logs a warning.
pub struct Session {
    shared: Arc<Shared>,
    readers: Mutex<Vec<LineReader>>,
}

impl Session {
    /// Spawns the shell, starts both readers and begins servicing `pending`.
    pub(crate) fn start(options: SessionOptions, pending: Vec<Batch>) -> Result<Self, SpawnError> {
        let request = SpawnRequest::from_command_line(&options.shell, options.env);
        let label = label_for(&request.program);
        info!("[{label}%] START");

        let mut child = options.context.spawner.spawn(&request)?;
        let streams = (child.take_stdin(), child.take_stdout(), child.take_stderr());
        let (Some(stdin), Some(stdout), Some(stderr)) = streams else {
            let _ = child.kill();
            reap(&label, child);
            return Err(SpawnError::Io(std::io::Error::other("child streams are not piped")));
        };

        let shared = Arc::new(Shared {
            label: label.clone(),
            state: Mutex::new(State {
                phase: Phase::Opening,
                pending: pending.into(),
                active: None,
                watchdog: WatchdogState { timeout: options.watchdog_timeout, elapsed: 0 },
                ticker: None,
                armed_epoch: None,
                open_streams: 2,
                streams_lost: false,
            }),
            idle: Condvar::new(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            dispatcher: options.dispatcher,
            callbacks: Arc::new(CallbackTracker::new()),
            markers: MarkerGenerator::new(Arc::clone(&options.context.id_gen)),
            want_stderr: options.want_stderr,
            log_io: options.log_io,
            watchdog_tick: options.watchdog_tick,
            stdout_listener: options.stdout_listener,
            stderr_listener: options.stderr_listener,
        });

        let mut readers = Vec::with_capacity(2);
        for (stream, pipe) in [(Stream::Stdout, stdout), (Stream::Stderr, stderr)] {
            let sink = Arc::clone(&shared);
            let name = format!("{label}{}", stream.indicator());
            match LineReader::spawn(&name, pipe, move |event| sink.on_event(stream, event)) {
                Ok(reader) => readers.push(reader),
                Err(e) => {
                    lock(&shared.stdin).take();
                    let child = lock(&shared.child).take();
                    if let Some(mut child) = child {
                        let _ = child.kill();
                        reap(&label, child);
                    }
                    return Err(SpawnError::Io(e));
                }
            }
        }

        OPEN_SESSIONS.fetch_add(1, Ordering::SeqCst);
        let script = {
            let mut state = lock(&shared.state);
            state.phase = Phase::Idle;
            shared.run_next(&mut state)
        };
        shared.after_unlock(script);

        Ok(Self { shared, readers: Mutex::new(readers) })
    }

    /// Queues `batch`; it starts as soon as every earlier batch has finished.
    ///
    /// Never waits for the batch itself. On a dead or closed session the
    /// batch completes at once with [`Outcome::ShellDied`].
    pub fn submit(&self, batch: Batch) {
        let script = {
            let mut state = lock(&self.shared.state);
            state.pending.push_back(batch);
            if state.active.is_some() {
                None
            } else {
                self.shared.run_next(&mut state)
            }
        };
        self.shared.after_unlock(script);
    }

    /// Queues `lines`, delivering buffered output to `on_result`.
    pub fn submit_lines<I, S>(
        &self,
        lines: I,
        tag: i32,
        on_result: impl FnOnce(BatchResult) + Send + 'static,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(Batch::new(lines, tag).on_result(on_result));
    }

    /// Queues `lines`, streaming output to `handler` without buffering.
    pub fn submit_streaming<I, S>(&self, lines: I, tag: i32, handler: Arc<dyn batch::LineHandler>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(Batch::new(lines, tag).on_lines(handler));
    }

    /// Returns `true` if no batch is running.
    ///
    /// A shell found dead here fails its active batch with
    /// [`Outcome::ShellDied`].
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let idle = {
            let mut state = lock(&self.shared.state);
            self.shared.reap_if_dead(&mut state);
            state.active.is_none()
        };
        self.shared.after_unlock(None);
        idle
    }

    /// Returns `true` while the shell process is alive and usable.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let state = lock(&self.shared.state);
        self.shared.is_alive(&state)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.shared.state).phase
    }

    /// Number of output lines buffered for the running batch.
    #[must_use]
    pub fn buffered_lines(&self) -> usize {
        lock(&self.shared.state)
            .active
            .as_ref()
            .and_then(|active| active.buffer.as_ref())
            .map_or(0, Vec::len)
    }

    /// Changes the watchdog allowance, in ticks; 0 disables it.
    pub fn set_watchdog_timeout(&self, ticks: u32) {
        self.shared.set_watchdog_timeout(ticks);
    }

    /// Returns a handle usable from inside callbacks that does not keep the
    /// session alive.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle { shared: Arc::downgrade(&self.shared) }
    }

    /// Blocks until no batch is running and posted callbacks have run.
    ///
    /// Returns `false` if `timeout` elapses first. Callbacks are not waited
    /// for when called from inside a callback. Calling this from a reader
    /// thread (an inline callback) while a batch is running deadlocks.
    pub fn wait_for_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        {
            let mut state = lock(&self.shared.state);
            loop {
                self.shared.reap_if_dead(&mut state);
                if state.active.is_none() && state.pending.is_empty() {
                    break;
                }
                state = match deadline {
                    None => self.shared.idle.wait(state).unwrap_or_else(PoisonError::into_inner),
                    Some(deadline) => {
                        let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                            return false;
                        };
                        self.shared
                            .idle
                            .wait_timeout(state, left)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0
                    }
                };
            }
        }
        self.shared.dispatcher.run_pending();
        if dispatch::in_callback() {
            return true;
        }
        self.shared.callbacks.wait_drained(deadline)
    }

    /// Gracefully ends the session.
    ///
    /// Waits for queued work, asks the shell to `exit`, waits for it and for
    /// both readers. Calling it again is a no-op.
    ///
    /// A shell that ignores `exit` keeps this waiting until [`Session::kill`]
    /// is called from another thread; `close` then returns without joining
    /// the readers, as `kill` does.
    pub fn close(&self) {
        {
            let state = lock(&self.shared.state);
            if matches!(state.phase, Phase::Closing | Phase::Closed) {
                return;
            }
        }
        if !self.is_idle() {
            self.wait_for_idle(None);
        }
        {
            let mut state = lock(&self.shared.state);
            if matches!(state.phase, Phase::Closing | Phase::Closed) {
                return;
            }
            state.phase = Phase::Closing;
            self.shared.stop_ticker(&mut state);
        }

        if let Some(mut input) = lock(&self.shared.stdin).take() {
            // Fails harmlessly if the shell is already gone.
            let _ = input.write_all(b"exit\n").and_then(|()| input.flush());
        }
        loop {
            if lock(&self.shared.state).phase == Phase::Closed {
                return;
            }
            if !self.shared.child_running() {
                break;
            }
            thread::sleep(EXIT_POLL);
        }
        for reader in lock(&self.readers).iter_mut() {
            reader.join();
        }

        {
            let mut state = lock(&self.shared.state);
            self.shared.abort(&mut state, Outcome::ShellDied);
            self.shared.mark_closed(&mut state);
        }
        self.shared.dispatcher.run_pending();
    }

    /// Forcibly ends the session without draining.
    ///
    /// Closes the shell's input, signals it and returns without waiting for
    /// it to exit. The running batch and everything queued complete with
    /// [`Outcome::ShellDied`].
    pub fn kill(&self) {
        self.shared.kill();
    }
}

/// Weak reference to a session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Weak<Shared>,
}

impl SessionHandle {
    /// Same as [`Session::set_watchdog_timeout`]; does nothing once the
    /// session is gone.
    pub fn set_watchdog_timeout(&self, ticks: u32) {
        if let Some(shared) = self.shared.upgrade() {
            shared.set_watchdog_timeout(ticks);
        }
    }

    /// Same as [`Session::is_running`]; `false` once the session is gone.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            let state = lock(&shared.state);
            shared.is_alive(&state)
        })
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.phase() != Phase::Closed {
            warn!("[{}%] session dropped while open; killing shell", self.shared.label);
            self.shared.kill();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("shell", &self.shared.label)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
