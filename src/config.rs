//! Configuration: YAML file plus `SUSHELL_*` environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ServiceContext;
use crate::error::ConfigError;
use crate::probe::ElevationProbe;
use crate::shell::builder::{DEFAULT_WATCHDOG_TICK, OPEN_WATCHDOG_TIMEOUT};
use crate::shell::Builder;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "SUSHELL_CONFIG";

/// Session and probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Unprivileged shell command line.
    pub shell: String,
    /// Elevated shell command line.
    pub su_shell: String,
    /// Watchdog allowance per batch, in ticks; 0 disables it.
    pub watchdog_timeout: u32,
    /// Watchdog allowance while a checked open waits for the shell.
    pub open_watchdog_timeout: u32,
    /// Length of one watchdog tick, in milliseconds.
    pub tick_millis: u64,
    /// Include stderr in batch output.
    pub want_stderr: bool,
    /// Log written commands and output lines.
    pub log_io: bool,
    /// Extra environment for the shell.
    pub env: BTreeMap<String, String>,
    /// Assumed SELinux mode when the kernel flag is unavailable.
    pub selinux_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            su_shell: "su".to_string(),
            watchdog_timeout: 0,
            open_watchdog_timeout: OPEN_WATCHDOG_TIMEOUT,
            tick_millis: u64::try_from(DEFAULT_WATCHDOG_TICK.as_millis()).unwrap_or(1000),
            want_stderr: false,
            log_io: true,
            env: BTreeMap::new(),
            selinux_fallback: false,
        }
    }
}

impl Config {
    /// Loads configuration for the CLI.
    ///
    /// Reads `path`, or the file named by `SUSHELL_CONFIG`, or starts from
    /// defaults; then applies `SUSHELL_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.or(from_env.as_deref()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parses a YAML config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Applies overrides looked up by variable name.
    ///
    /// Recognised: `SUSHELL_SHELL`, `SUSHELL_SU_SHELL`,
    /// `SUSHELL_WATCHDOG_TIMEOUT`, `SUSHELL_OPEN_WATCHDOG_TIMEOUT`,
    /// `SUSHELL_TICK_MILLIS`, `SUSHELL_WANT_STDERR`, `SUSHELL_LOG_IO`,
    /// `SUSHELL_SELINUX_FALLBACK`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for values that do not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = lookup("SUSHELL_SHELL") {
            self.shell = shell;
        }
        if let Some(su_shell) = lookup("SUSHELL_SU_SHELL") {
            self.su_shell = su_shell;
        }
        override_parsed(&lookup, "SUSHELL_WATCHDOG_TIMEOUT", &mut self.watchdog_timeout)?;
        override_parsed(&lookup, "SUSHELL_OPEN_WATCHDOG_TIMEOUT", &mut self.open_watchdog_timeout)?;
        override_parsed(&lookup, "SUSHELL_TICK_MILLIS", &mut self.tick_millis)?;
        override_flag(&lookup, "SUSHELL_WANT_STDERR", &mut self.want_stderr)?;
        override_flag(&lookup, "SUSHELL_LOG_IO", &mut self.log_io)?;
        override_flag(&lookup, "SUSHELL_SELINUX_FALLBACK", &mut self.selinux_fallback)?;
        Ok(())
    }

    /// Watchdog tick as a duration.
    #[must_use]
    pub fn watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }

    /// Returns a session builder preconfigured from these settings.
    #[must_use]
    pub fn builder(&self, elevated: bool, ctx: ServiceContext) -> Builder {
        let shell = if elevated { &self.su_shell } else { &self.shell };
        Builder::new()
            .shell(shell.clone())
            .envs(self.env.clone())
            .want_stderr(self.want_stderr)
            .log_io(self.log_io)
            .watchdog_timeout(self.watchdog_timeout)
            .open_watchdog_timeout(self.open_watchdog_timeout)
            .watchdog_tick(self.watchdog_tick())
            .context(ctx)
    }

    /// Returns an elevation probe using these settings.
    #[must_use]
    pub fn probe(&self, ctx: ServiceContext) -> ElevationProbe {
        ElevationProbe::new(ctx)
            .with_su_shell(self.su_shell.clone())
            .with_selinux_fallback(self.selinux_fallback)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOverride { key: key.to_string(), value })?;
    }
    Ok(())
}

fn override_flag<F>(lookup: &F, key: &str, slot: &mut bool) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *slot = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(ConfigError::InvalidOverride { key: key.to_string(), value }),
        };
    }
    Ok(())
}
