//! Error types for sushell.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to start a child shell.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The executable could not be found.
    #[error("shell executable not found: {program}")]
    NotFound {
        /// Program that was requested.
        program: String,
    },

    /// The request had no program to run.
    #[error("empty shell command line")]
    EmptyCommand,

    /// The OS refused to start the process.
    #[error("failed to spawn shell: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a one-shot [`crate::oneshot::run`] invocation.
#[derive(Debug, Error)]
pub enum RunError {
    /// The shell could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// An elevated shell exited with the helper's "access denied" status.
    #[error("elevated shell refused access")]
    AccessDenied,

    /// Waiting on the shell or its readers failed.
    #[error("shell i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to load configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`crate::config::Config`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value {value:?} for {key}")]
    InvalidOverride {
        /// Environment variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}
