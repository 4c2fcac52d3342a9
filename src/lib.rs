//! Long-lived, optionally elevated shell sessions.
//!
//! The core type is [`shell::Session`]: one child shell kept open and fed
//! batches of command lines, each completed with its exit code and output.
//! [`probe`] answers whether an elevated shell is available and how to
//! start one; [`oneshot`] runs commands in a throwaway shell.

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod oneshot;
pub mod ports;
pub mod probe;
pub mod shell;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}
