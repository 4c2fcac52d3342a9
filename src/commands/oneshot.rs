//! `sushell oneshot` command.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::ShellArgs;
use crate::config::Config;
use crate::context::ServiceContext;
use crate::oneshot;

#[derive(Debug, Serialize)]
struct OneshotReport<'a> {
    shell: &'a str,
    commands: &'a [String],
    output: Vec<String>,
    finished_at: DateTime<Utc>,
}

/// Execute the `oneshot` command.
///
/// # Errors
///
/// Returns an error string if the shell cannot be started or refuses access.
pub fn run(ctx: &ServiceContext, config: &Config, args: &ShellArgs) -> Result<(), String> {
    let shell = super::shell_for(args, config);
    let want_stderr = args.stderr || config.want_stderr;
    let output = oneshot::run(ctx, &shell, &args.commands, &config.env, want_stderr)
        .map_err(|e| format!("{shell}: {e}"))?;

    if args.json {
        let report =
            OneshotReport { shell: &shell, commands: &args.commands, output, finished_at: Utc::now() };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        for line in output {
            println!("{line}");
        }
    }
    Ok(())
}
