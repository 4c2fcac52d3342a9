//! Process spawner port for launching child shells.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::error::SpawnError;

/// Everything needed to start a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed after the program.
    pub args: Vec<String>,
    /// Environment overrides, merged over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl SpawnRequest {
    /// Builds a request from a shell command line such as `su --mount-master`.
    ///
    /// The line is split on whitespace; the first word is the program.
    #[must_use]
    pub fn from_command_line(command_line: &str, env: BTreeMap<String, String>) -> Self {
        let mut words = command_line.split_whitespace().map(String::from);
        let program = words.next().unwrap_or_default();
        Self { program, args: words.collect(), env }
    }
}

/// A running child process with piped standard streams.
///
/// Each `take_*` method hands out its stream once; later calls return `None`.
pub trait ChildProcess: Send {
    /// Takes the write end of the child's standard input.
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Takes the read end of the child's standard output.
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Takes the read end of the child's standard error.
    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Returns the exit code if the process has exited, without blocking.
    ///
    /// A process terminated by a signal reports `-1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process status cannot be queried.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Blocks until the process exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the process fails.
    fn wait(&mut self) -> io::Result<i32>;

    /// Forcibly terminates the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts child processes.
///
/// Abstracting process creation lets sessions run against scripted fake
/// shells in tests instead of real executables.
pub trait ProcessSpawner: Send + Sync {
    /// Spawns the requested process with all three standard streams piped.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::NotFound`] when the executable does not exist and
    /// [`SpawnError::Io`] for any other OS refusal.
    fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn ChildProcess>, SpawnError>;
}
