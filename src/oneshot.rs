//! Run a list of commands in a fresh shell and collect the output.
//!
//! Unlike a [`crate::shell::Session`], a one-shot shell is started, fed its
//! commands followed by `exit`, and waited for. Both output streams are
//! drained on reader threads so a chatty command cannot block the shell.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, trace};

use crate::context::ServiceContext;
use crate::error::{RunError, SpawnError};
use crate::ports::process::SpawnRequest;
use crate::probe;
use crate::shell::reader::{LineReader, Stream, StreamEvent};

/// Exit status an elevation helper uses to report refused access.
pub const ACCESS_DENIED_EXIT: i32 = 255;

/// Runs `commands` in `shell` and returns the collected output lines.
///
/// Stdout lines are always collected; stderr lines only when `want_stderr`
/// is set, in which case the interleaving of the two streams is not
/// guaranteed. `env` entries override the inherited environment.
///
/// # Errors
///
/// Returns [`RunError::Spawn`] if the shell cannot be started,
/// [`RunError::AccessDenied`] if an `su` shell exits with status 255 and
/// [`RunError::Io`] if the shell cannot be waited for.
pub fn run<S: AsRef<str>>(
    ctx: &ServiceContext,
    shell: &str,
    commands: &[S],
    env: &BTreeMap<String, String>,
    want_stderr: bool,
) -> Result<Vec<String>, RunError> {
    let request = SpawnRequest::from_command_line(shell, env.clone());
    let label = request.program.rsplit('/').next().unwrap_or(&request.program).to_uppercase();
    info!("[{label}%] START");

    let mut child = ctx.spawner.spawn(&request)?;
    let output = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::with_capacity(2);
    for (stream, pipe, keep) in [
        (Stream::Stdout, child.take_stdout(), true),
        (Stream::Stderr, child.take_stderr(), want_stderr),
    ] {
        let Some(pipe) = pipe else { continue };
        let sink = Arc::clone(&output);
        let name = format!("{label}{}", stream.indicator());
        let indicator = stream.indicator();
        let tag = label.clone();
        let spawned = LineReader::spawn(&name, pipe, move |event| {
            if let StreamEvent::Line(line) = event {
                trace!("[{tag}{indicator}] {line}");
                if keep {
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(line);
                }
            }
        });
        match spawned {
            Ok(reader) => readers.push(reader),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpawnError::Io(e).into());
            }
        }
    }

    if let Some(mut stdin) = child.take_stdin() {
        for command in commands {
            let command = command.as_ref();
            debug!("[{label}+] {command}");
            // The shell may exit early (say, on an `exit` line); whatever it
            // produced up to that point is still collected below.
            if stdin.write_all(command.as_bytes()).and_then(|()| stdin.write_all(b"\n")).is_err() {
                break;
            }
        }
        let _ = stdin.write_all(b"exit\n").and_then(|()| stdin.flush());
    }

    let code = child.wait()?;
    for reader in &mut readers {
        reader.join();
    }
    info!("[{label}%] END");

    if probe::is_su(shell) && code == ACCESS_DENIED_EXIT {
        return Err(RunError::AccessDenied);
    }
    let lines = std::mem::take(&mut *output.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(lines)
}

/// Runs `commands` with `sh`, without stderr.
///
/// # Errors
///
/// See [`run`].
pub fn sh<S: AsRef<str>>(ctx: &ServiceContext, commands: &[S]) -> Result<Vec<String>, RunError> {
    run(ctx, "sh", commands, &BTreeMap::new(), false)
}

/// Runs `commands` with `su`, without stderr.
///
/// # Errors
///
/// See [`run`].
pub fn su<S: AsRef<str>>(ctx: &ServiceContext, commands: &[S]) -> Result<Vec<String>, RunError> {
    run(ctx, "su", commands, &BTreeMap::new(), false)
}
