//! `sushell invocation` command.

use crate::config::Config;
use crate::context::ServiceContext;
use crate::probe;

/// Execute the `invocation` command.
///
/// Prints the shell command line to start an elevated shell as `uid`,
/// passing `context` only when the helper and system support it.
///
/// # Errors
///
/// This command does not fail.
pub fn run(
    ctx: &ServiceContext,
    config: &Config,
    uid: u32,
    context: Option<&str>,
    mount_master: bool,
) -> Result<(), String> {
    if mount_master {
        println!("{}", probe::shell_mount_master());
        return Ok(());
    }
    println!("{}", config.probe(ctx.clone()).shell_invocation(uid, context));
    Ok(())
}
