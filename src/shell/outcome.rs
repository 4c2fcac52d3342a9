//! How a batch (or a session open) ended.

use serde::Serialize;

/// Raw result codes, as surfaced to callers that want plain integers.
///
/// Session-level signals are negative so they cannot be confused with a
/// shell exit status.
pub mod codes {
    /// The session was opened and the shell is running.
    pub const RUNNING: i32 = 0;
    /// The watchdog aborted a batch that took too long.
    pub const WATCHDOG_TIMEOUT: i32 = -1;
    /// The shell process died.
    pub const SHELL_DIED: i32 = -2;
    /// The shell could not be started.
    pub const SPAWN_FAILED: i32 = -3;
    /// The shell started but lacks the expected privilege.
    pub const WRONG_PRIVILEGE: i32 = -4;
}

/// Terminal status delivered with every batch result and open notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "exit_code", rename_all = "snake_case")]
pub enum Outcome {
    /// The batch ran; carries the exit status of its last command line.
    Exited(i32),
    /// The watchdog fired before the batch completed.
    WatchdogTimeout,
    /// The shell died before the batch completed.
    ShellDied,
    /// The shell could not be started (open notifications only).
    SpawnFailed,
    /// The shell runs without the expected privilege (open notifications only).
    WrongPrivilege,
}

impl Outcome {
    /// Open notification for a session that started successfully.
    pub const RUNNING: Self = Self::Exited(codes::RUNNING);

    /// Returns the integer code for this outcome.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::WatchdogTimeout => codes::WATCHDOG_TIMEOUT,
            Self::ShellDied => codes::SHELL_DIED,
            Self::SpawnFailed => codes::SPAWN_FAILED,
            Self::WrongPrivilege => codes::WRONG_PRIVILEGE,
        }
    }

    /// Returns `true` for session-level failures; the session must be
    /// recreated after one of these.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Exited(_))
    }

    /// Returns `true` if the batch ran and its last command succeeded.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Exited(0)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit {code}"),
            Self::WatchdogTimeout => f.write_str("watchdog timeout"),
            Self::ShellDied => f.write_str("shell died"),
            Self::SpawnFailed => f.write_str("spawn failed"),
            Self::WrongPrivilege => f.write_str("wrong privilege level"),
        }
    }
}
