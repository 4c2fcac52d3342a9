//! Scripted fake shell for session integration tests.
//!
//! The fake understands just enough to drive a session:
//!
//! - `echo <text>`, `echo <text> $?`, `echo <text> >&2`
//! - `err <text>` writes to stderr
//! - `(exit N)` sets the status, `exit` / `exit N` ends the shell
//! - `id` prints a `uid=` line for the configured uid
//! - `hang` blocks until the process is killed
//! - `spam N` prints N lines at once
//! - `stubborn` makes the shell ignore `exit` and end of input
//!
//! It also records every stdout marker echo and the largest number of
//! batch scripts ever written without their stderr marker having been
//! emitted yet.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sushell::context::ServiceContext;
use sushell::error::SpawnError;
use sushell::ports::process::{ChildProcess, ProcessSpawner, SpawnRequest};

const POLL: Duration = Duration::from_millis(2);

/// What the fake observed across all of its processes.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub spawns: usize,
    pub markers: Vec<String>,
    pub scripts_written: usize,
    pub batches_completed: usize,
    pub max_in_flight: usize,
    pub exits: usize,
}

/// Spawner producing scripted fake shells.
#[derive(Clone, Default)]
pub struct FakeShell {
    uid: u32,
    refuse_spawn: bool,
    refuse_kill: bool,
    exit_at_start: Option<i32>,
    stats: Arc<Mutex<Stats>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `id` report `uid`.
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    /// Makes every spawn fail as if the executable were missing.
    pub fn refusing_spawn(mut self) -> Self {
        self.refuse_spawn = true;
        self
    }

    /// Makes `kill` fail without touching the process, like signalling a
    /// shell owned by another user.
    pub fn refusing_kill(mut self) -> Self {
        self.refuse_kill = true;
        self
    }

    /// Makes every shell exit with `code` before reading any input.
    pub fn exiting_at_start(mut self, code: i32) -> Self {
        self.exit_at_start = Some(code);
        self
    }

    pub fn context(&self) -> ServiceContext {
        ServiceContext::live().with_spawner(Arc::new(self.clone()))
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FakeShell {
    fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn ChildProcess>, SpawnError> {
        if self.refuse_spawn {
            return Err(SpawnError::NotFound { program: request.program.clone() });
        }
        self.stats.lock().unwrap().spawns += 1;

        let (stdin_tx, stdin_rx) = mpsc::channel();
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        let killed = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(None));

        let interpreter = Interpreter {
            input: stdin_rx,
            stdout: stdout_tx,
            stderr: stderr_tx,
            killed: Arc::clone(&killed),
            stats: Arc::clone(&self.stats),
            uid: self.uid,
            last_status: 0,
            stubborn: false,
        };
        let exit_status = Arc::clone(&status);
        let stats = Arc::clone(&self.stats);
        let exit_at_start = self.exit_at_start;
        thread::spawn(move || {
            let code = match exit_at_start {
                Some(code) => code,
                None => interpreter.run(),
            };
            *exit_status.lock().unwrap() = Some(code);
            stats.lock().unwrap().exits += 1;
        });

        Ok(Box::new(FakeChild {
            stdin: Some(ChannelWriter { tx: stdin_tx, stats: Arc::clone(&self.stats) }),
            stdout: Some(PipeReader::new(stdout_rx)),
            stderr: Some(PipeReader::new(stderr_rx)),
            killed,
            refuse_kill: self.refuse_kill,
            status,
        }))
    }
}

struct FakeChild {
    stdin: Option<ChannelWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    killed: Arc<AtomicBool>,
    refuse_kill: bool,
    status: Arc<Mutex<Option<i32>>>,
}

impl ChildProcess for FakeChild {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.stdin.take().map(|w| Box::new(w) as Box<dyn Write + Send>)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take().map(|r| Box::new(r) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr.take().map(|r| Box::new(r) as Box<dyn Read + Send>)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(*self.status.lock().unwrap())
    }

    fn wait(&mut self) -> io::Result<i32> {
        loop {
            if let Some(code) = *self.status.lock().unwrap() {
                return Ok(code);
            }
            thread::sleep(POLL);
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.refuse_kill {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "operation not permitted"));
        }
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ChannelWriter {
    tx: Sender<Vec<u8>>,
    stats: Arc<Mutex<Stats>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.ends_with(b" >&2\n") {
            let mut stats = self.stats.lock().unwrap();
            let in_flight = stats.scripts_written - stats.batches_completed + 1;
            stats.max_in_flight = stats.max_in_flight.max(in_flight);
            stats.scripts_written += 1;
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "fake shell exited"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl PipeReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self { rx, chunk: Vec::new(), pos: 0 }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

enum Step {
    Continue,
    Exit(i32),
}

struct Interpreter {
    input: Receiver<Vec<u8>>,
    stdout: Sender<Vec<u8>>,
    stderr: Sender<Vec<u8>>,
    killed: Arc<AtomicBool>,
    stats: Arc<Mutex<Stats>>,
    uid: u32,
    last_status: i32,
    stubborn: bool,
}

impl Interpreter {
    fn run(mut self) -> i32 {
        let mut pending = String::new();
        loop {
            if self.killed.load(Ordering::SeqCst) {
                return -1;
            }
            let chunk = match self.input.recv_timeout(POLL) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) if self.stubborn => {
                    thread::sleep(POLL);
                    continue;
                }
                // End of input behaves like `exit`.
                Err(RecvTimeoutError::Disconnected) => return self.last_status,
            };
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(end) = pending.find('\n') {
                let line: String = pending.drain(..=end).collect();
                if let Step::Exit(code) = self.execute(line.trim()) {
                    return code;
                }
            }
        }
    }

    fn out(&self, text: &str) {
        let _ = self.stdout.send(format!("{text}\n").into_bytes());
    }

    fn err(&self, text: &str) {
        let _ = self.stderr.send(format!("{text}\n").into_bytes());
    }

    fn execute(&mut self, line: &str) -> Step {
        if let Some(rest) = line.strip_prefix("echo ") {
            if let Some(marker) = rest.strip_suffix(" $?") {
                self.stats.lock().unwrap().markers.push(marker.to_string());
                self.out(&format!("{marker} {}", self.last_status));
            } else if let Some(marker) = rest.strip_suffix(" >&2") {
                self.stats.lock().unwrap().batches_completed += 1;
                self.err(marker);
            } else {
                self.out(rest);
                self.last_status = 0;
            }
            return Step::Continue;
        }
        if let Some(text) = line.strip_prefix("err ") {
            self.err(text);
            self.last_status = 0;
            return Step::Continue;
        }
        if let Some(code) = line.strip_prefix("(exit ").and_then(|r| r.strip_suffix(')')) {
            self.last_status = code.trim().parse().unwrap_or(2);
            return Step::Continue;
        }
        if line == "stubborn" {
            self.stubborn = true;
            self.last_status = 0;
            return Step::Continue;
        }
        if line == "exit" || line.starts_with("exit ") {
            if self.stubborn {
                return Step::Continue;
            }
            let code = line.strip_prefix("exit ").map_or(Ok(self.last_status), |c| c.trim().parse());
            return Step::Exit(code.unwrap_or(2));
        }
        if line == "id" {
            self.out(&format!("uid={0}(fake) gid={0}(fake)", self.uid));
            self.last_status = 0;
            return Step::Continue;
        }
        if line == "hang" {
            while !self.killed.load(Ordering::SeqCst) {
                thread::sleep(POLL);
            }
            return Step::Exit(-1);
        }
        if let Some(count) = line.strip_prefix("spam ") {
            let count: usize = count.trim().parse().unwrap_or(0);
            let mut text = String::new();
            for i in 0..count {
                text.push_str(&format!("line {i}\n"));
            }
            let _ = self.stdout.send(text.into_bytes());
            self.last_status = 0;
            return Step::Continue;
        }
        if line.is_empty() {
            return Step::Continue;
        }
        self.err(&format!("fake: {line}: not found"));
        self.last_status = 127;
        Step::Continue
    }
}
