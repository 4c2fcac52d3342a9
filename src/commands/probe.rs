//! `sushell probe` command.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::context::ServiceContext;

/// What the probe found out about the elevation helper.
#[derive(Debug, Serialize)]
struct ProbeReport {
    su_shell: String,
    available: bool,
    version: Option<String>,
    internal_version: Option<String>,
    selinux_enforcing: bool,
    checked_at: DateTime<Utc>,
}

/// Execute the `probe` command.
///
/// An unavailable helper is a result, not an error.
///
/// # Errors
///
/// Returns an error string if the JSON report cannot be serialized.
pub fn run(ctx: &ServiceContext, config: &Config, json: bool) -> Result<(), String> {
    let probe = config.probe(ctx.clone());
    let report = ProbeReport {
        su_shell: config.su_shell.clone(),
        available: probe.available(),
        version: probe.version(false),
        internal_version: probe.version(true),
        selinux_enforcing: probe.is_selinux_enforcing(),
        checked_at: Utc::now(),
    };

    if json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
    println!("helper:            {}", report.su_shell);
    println!("root available:    {}", if report.available { "yes" } else { "no" });
    println!("version:           {}", or_unknown(&report.version));
    println!("internal version:  {}", or_unknown(&report.internal_version));
    println!("selinux enforcing: {}", if report.selinux_enforcing { "yes" } else { "no" });
    Ok(())
}
