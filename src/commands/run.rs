//! `sushell run` command.

use std::sync::mpsc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::ShellArgs;
use crate::config::Config;
use crate::context::ServiceContext;
use crate::shell::{Outcome, Session};

/// JSON report for one batch.
#[derive(Debug, Serialize)]
struct BatchReport {
    tag: i32,
    command: String,
    outcome: Outcome,
    output: Vec<String>,
    finished_at: DateTime<Utc>,
}

/// JSON report for the whole session.
#[derive(Debug, Serialize)]
struct RunReport {
    shell: String,
    batches: Vec<BatchReport>,
}

/// Execute the `run` command.
///
/// Opens one session, submits every command as its own batch, waits for all
/// of them and closes the session.
///
/// # Errors
///
/// Returns an error string if the shell cannot be started, fails its check,
/// or any batch does not finish with exit status 0.
pub fn run(
    ctx: &ServiceContext,
    config: &Config,
    args: &ShellArgs,
    timeout: Option<u32>,
    check: bool,
) -> Result<(), String> {
    let shell = super::shell_for(args, config);
    let mut builder = config.builder(args.su, ctx.clone()).shell(shell.clone());
    if let Some(timeout) = timeout {
        builder = builder.watchdog_timeout(timeout);
    }
    if args.stderr {
        builder = builder.want_stderr(true);
    }

    let session = if check {
        let (open_tx, open_rx) = mpsc::channel();
        let session = builder
            .open_checked(move |outcome, _| {
                let _ = open_tx.send(outcome);
            })
            .map_err(|e| format!("Failed to start {shell}: {e}"))?;
        match open_rx.recv() {
            Ok(outcome) if outcome == Outcome::RUNNING => {}
            Ok(outcome) => {
                session.kill();
                return Err(format!("Shell check failed for {shell}: {outcome}"));
            }
            Err(_) => {
                session.kill();
                return Err(format!("Shell check for {shell} never completed"));
            }
        }
        session
    } else {
        builder.open().map_err(|e| format!("Failed to start {shell}: {e}"))?
    };

    let batches = run_batches(&session, &args.commands);
    session.close();

    let failed = batches.iter().filter(|b| !b.outcome.is_success()).count();
    if args.json {
        let report = RunReport { shell, batches };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        for batch in &batches {
            for line in &batch.output {
                println!("{line}");
            }
            if !batch.outcome.is_success() {
                eprintln!("[{}] {}: {}", batch.tag, batch.command, batch.outcome);
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} command(s) failed", args.commands.len()));
    }
    Ok(())
}

fn run_batches(session: &Session, commands: &[String]) -> Vec<BatchReport> {
    let (tx, rx) = mpsc::channel();
    for (index, command) in commands.iter().enumerate() {
        let tag = i32::try_from(index).unwrap_or(i32::MAX);
        let tx = tx.clone();
        let command = command.clone();
        session.submit_lines([command.clone()], tag, move |result| {
            let _ = tx.send(BatchReport {
                tag: result.tag,
                command,
                outcome: result.outcome,
                output: result.output,
                finished_at: Utc::now(),
            });
        });
    }
    drop(tx);
    session.wait_for_idle(None);

    let mut batches: Vec<BatchReport> = rx.iter().collect();
    batches.sort_by_key(|b| b.tag);
    batches
}
