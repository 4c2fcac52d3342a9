//! Command dispatch and handlers.

pub mod invocation;
pub mod oneshot;
pub mod probe;
pub mod run;

use crate::cli::{Cli, Command, ShellArgs};
use crate::config::Config;
use crate::context::ServiceContext;

/// Dispatch a parsed command line to its handler.
///
/// Configuration comes from `--config` (or `SUSHELL_CONFIG`) plus
/// `SUSHELL_*` environment overrides.
///
/// # Errors
///
/// Returns an error string if the configuration is invalid or the selected
/// command handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let config = Config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    dispatch_with_context(&cli.command, &config, &ServiceContext::live())
}

/// Dispatch a command with the given configuration and service context.
fn dispatch_with_context(
    command: &Command,
    config: &Config,
    ctx: &ServiceContext,
) -> Result<(), String> {
    match command {
        Command::Run { shell, timeout, check } => run::run(ctx, config, shell, *timeout, *check),
        Command::Oneshot { shell } => oneshot::run(ctx, config, shell),
        Command::Probe { json } => probe::run(ctx, config, *json),
        Command::Invocation { uid, context, mount_master } => {
            invocation::run(ctx, config, *uid, context.as_deref(), *mount_master)
        }
    }
}

/// Shell command line selected by `--shell`/`--su` and the config.
fn shell_for(args: &ShellArgs, config: &Config) -> String {
    match &args.shell {
        Some(shell) => shell.clone(),
        None if args.su => config.su_shell.clone(),
        None => config.shell.clone(),
    }
}
