//! Privilege and availability probing for elevated shells.
//!
//! The probe answers three questions about the elevation helper (`su`):
//! does it give us a working root shell, which version is it, and does the
//! system enforce SELinux. Answers are cached per [`ElevationProbe`] until
//! [`ElevationProbe::invalidate`] is called.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::context::ServiceContext;
use crate::oneshot;

/// Line echoed by the first availability command.
pub const AVAILABLE_SENTINEL: &str = "-BOC-";

/// Commands whose output tells whether a shell works and who it runs as.
pub const AVAILABLE_TEST_COMMANDS: [&str; 2] = ["echo -BOC-", "id"];

/// Where the kernel exposes the SELinux enforcing flag.
pub const SELINUX_ENFORCE_PATH: &str = "/sys/fs/selinux/enforce";

/// Oldest internal helper version known to accept `--context`.
pub const MIN_CONTEXT_VERSION: i32 = 190;

/// Checks the output of [`AVAILABLE_TEST_COMMANDS`].
///
/// If `id` produced a `uid=` line, the shell works, and when
/// `check_for_root` is set it must also report `uid=0`. Without an `id`
/// line, seeing the sentinel is taken as a working shell of unknown
/// privilege.
#[must_use]
pub fn parse_available<S: AsRef<str>>(lines: &[S], check_for_root: bool) -> bool {
    let mut sentinel_seen = false;
    for line in lines {
        let line = line.as_ref();
        if line.contains("uid=") {
            return !check_for_root || line.contains("uid=0");
        }
        if line.contains(AVAILABLE_SENTINEL) {
            sentinel_seen = true;
        }
    }
    sentinel_seen
}

/// Returns `true` if `shell` looks like an invocation of `su`.
#[must_use]
pub fn is_su(shell: &str) -> bool {
    let program = shell.split(' ').next().unwrap_or_default();
    program.rsplit('/').next() == Some("su")
}

/// Shell command line that connects to the mount-master daemon, so mounts
/// become visible to every process.
#[must_use]
pub fn shell_mount_master() -> &'static str {
    "su --mount-master"
}

#[derive(Debug, Default)]
struct ProbeCache {
    available: Option<bool>,
    internal_version: Option<Option<String>>,
    display_version: Option<Option<String>>,
    selinux_enforcing: Option<bool>,
}

/// Cached knowledge about the elevation helper.
pub struct ElevationProbe {
    ctx: ServiceContext,
    su_shell: String,
    selinux_fallback: bool,
    cache: Mutex<ProbeCache>,
}

impl ElevationProbe {
    /// Creates a probe that runs `su` through `ctx`.
    #[must_use]
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            su_shell: "su".to_string(),
            selinux_fallback: false,
            cache: Mutex::new(ProbeCache::default()),
        }
    }

    /// Uses a different helper command, e.g. a full path to `su`.
    #[must_use]
    pub fn with_su_shell(mut self, su_shell: impl Into<String>) -> Self {
        self.su_shell = su_shell.into();
        self
    }

    /// Sets the answer used when the SELinux flag cannot be read.
    #[must_use]
    pub fn with_selinux_fallback(mut self, enforcing: bool) -> Self {
        self.selinux_fallback = enforcing;
        self
    }

    fn cache(&self) -> MutexGuard<'_, ProbeCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the helper yields a root shell.
    pub fn available(&self) -> bool {
        if let Some(available) = self.cache().available {
            return available;
        }
        let available = match oneshot::run(
            &self.ctx,
            &self.su_shell,
            &AVAILABLE_TEST_COMMANDS,
            &BTreeMap::new(),
            false,
        ) {
            Ok(lines) => parse_available(&lines, true),
            Err(e) => {
                debug!(error = %e, "Elevation helper unavailable");
                false
            }
        };
        self.cache().available = Some(available);
        available
    }

    /// Returns the helper's version, if it reports one.
    ///
    /// With `internal` set this is the numeric version used for
    /// comparisons (`su -V`), otherwise the human-readable one (`su -v`).
    pub fn version(&self, internal: bool) -> Option<String> {
        {
            let cache = self.cache();
            let cached = if internal { &cache.internal_version } else { &cache.display_version };
            if let Some(version) = cached {
                return version.clone();
            }
        }

        let flag = if internal { "-V" } else { "-v" };
        let command = format!("{} {flag}", self.su_shell);
        let no_commands: [&str; 0] = [];
        let version = match oneshot::run(&self.ctx, &command, &no_commands, &BTreeMap::new(), false)
        {
            Ok(lines) => lines.into_iter().find(|line| {
                if internal {
                    line.trim().parse::<i32>().is_ok_and(|v| v > 0)
                } else {
                    line.contains('.')
                }
            }),
            Err(e) => {
                debug!(error = %e, "Elevation helper version unavailable");
                None
            }
        };

        let mut cache = self.cache();
        let slot = if internal { &mut cache.internal_version } else { &mut cache.display_version };
        *slot = Some(version.clone());
        version
    }

    /// Returns `true` if SELinux is in enforcing mode.
    ///
    /// Falls back to the configured answer when the kernel flag is missing
    /// or unreadable.
    pub fn is_selinux_enforcing(&self) -> bool {
        if let Some(enforcing) = self.cache().selinux_enforcing {
            return enforcing;
        }
        let path = Path::new(SELINUX_ENFORCE_PATH);
        let enforcing = if self.ctx.fs.exists(path) {
            match self.ctx.fs.read_to_string(path) {
                Ok(flag) => flag.starts_with('1'),
                Err(e) => {
                    debug!(error = %e, "Unreadable SELinux flag; using fallback");
                    self.selinux_fallback
                }
            }
        } else {
            self.selinux_fallback
        };
        self.cache().selinux_enforcing = Some(enforcing);
        enforcing
    }

    /// Forgets every cached answer.
    pub fn invalidate(&self) {
        *self.cache() = ProbeCache::default();
    }

    /// Builds the command line that starts a helper shell as `uid`, in the
    /// SELinux `context` when the helper supports it.
    ///
    /// The result has the form `su[ --context <context>][ <uid>]`. The
    /// context is only passed when SELinux is enforcing and the helper is
    /// SuperSU with an internal version of at least
    /// [`MIN_CONTEXT_VERSION`]; the uid is omitted for root.
    pub fn shell_invocation(&self, uid: u32, context: Option<&str>) -> String {
        let mut shell = self.su_shell.clone();
        if let Some(context) = context {
            if self.is_selinux_enforcing() && self.supports_context() {
                shell = format!("{shell} --context {context}");
            }
        }
        if uid > 0 {
            shell = format!("{shell} {uid}");
        }
        shell
    }

    fn supports_context(&self) -> bool {
        let Some(display) = self.version(false) else { return false };
        let Some(internal) = self.version(true) else { return false };
        display.ends_with("SUPERSU")
            && internal.trim().parse::<i32>().is_ok_and(|v| v >= MIN_CONTEXT_VERSION)
    }
}

impl std::fmt::Debug for ElevationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationProbe")
            .field("su_shell", &self.su_shell)
            .field("selinux_fallback", &self.selinux_fallback)
            .field("cache", &*self.cache())
            .finish_non_exhaustive()
    }
}
