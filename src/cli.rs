//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for `sushell`.
#[derive(Debug, Parser)]
#[command(name = "sushell", version, about = "Run commands through long-lived (optionally elevated) shells")]
pub struct Cli {
    /// YAML config file (defaults to `$SUSHELL_CONFIG`).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by the commands that run shell commands.
#[derive(Debug, Args)]
pub struct ShellArgs {
    /// Use the elevated shell (`su`) instead of `sh`.
    #[arg(long)]
    pub su: bool,

    /// Override the shell command line.
    #[arg(long, value_name = "CMDLINE", conflicts_with = "su")]
    pub shell: Option<String>,

    /// Include stderr in the output.
    #[arg(long)]
    pub stderr: bool,

    /// Print a JSON report instead of plain output.
    #[arg(long)]
    pub json: bool,

    /// Command lines to run.
    #[arg(required = true, value_name = "COMMAND")]
    pub commands: Vec<String>,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open a session and run each COMMAND as its own batch.
    Run {
        /// Shell selection and commands.
        #[command(flatten)]
        shell: ShellArgs,

        /// Watchdog allowance per batch, in ticks (0 disables).
        #[arg(long, value_name = "TICKS")]
        timeout: Option<u32>,

        /// Verify the shell works (and is root for `su`) before running.
        #[arg(long)]
        check: bool,
    },
    /// Run all COMMANDs in a fresh shell that exits afterwards.
    Oneshot {
        /// Shell selection and commands.
        #[command(flatten)]
        shell: ShellArgs,
    },
    /// Report elevation availability, helper versions and SELinux mode.
    Probe {
        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },
    /// Print the command line that starts an elevated shell.
    Invocation {
        /// Target uid (0 is root).
        #[arg(long, default_value_t = 0)]
        uid: u32,

        /// SELinux context to request.
        #[arg(long)]
        context: Option<String>,

        /// Connect to the mount-master daemon instead.
        #[arg(long, conflicts_with_all = ["uid", "context"])]
        mount_master: bool,
    },
}
