//! Live process spawner using `std::process::Command`.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::error::SpawnError;
use crate::ports::process::{ChildProcess, ProcessSpawner, SpawnRequest};

/// Spawns real OS processes with piped standard streams.
pub struct LiveSpawner;

impl ProcessSpawner for LiveSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn ChildProcess>, SpawnError> {
        if request.program.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }
        debug!(program = %request.program, args = ?request.args, "Spawning shell");
        let child = Command::new(&request.program)
            .args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    SpawnError::NotFound { program: request.program.clone() }
                }
                _ => SpawnError::Io(e),
            })?;
        Ok(Box::new(LiveChild { child }))
    }
}

/// A child started by [`LiveSpawner`].
struct LiveChild {
    child: Child,
}

fn code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl ChildProcess for LiveChild {
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.child.stdin.take().map(|s| Box::new(s) as Box<dyn Write + Send>)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(code_of))
    }

    fn wait(&mut self) -> io::Result<i32> {
        Ok(code_of(self.child.wait()?))
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            // Already exited.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}
