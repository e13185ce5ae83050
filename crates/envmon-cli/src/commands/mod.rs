//! Command handler modules for envmon-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod certs;
pub mod csv_column;
pub mod stats;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use envmon_config::{ConfigSurface, DeskSettings, UnusedKeyPolicy};
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Settings from `--config` layers, or defaults when none were given.
///
/// Unknown keys are logged, not fatal: the same files are shared with the
/// daemon, which reads more of them.
pub fn load_settings(paths: &[String]) -> Result<DeskSettings> {
    if paths.is_empty() {
        return Ok(DeskSettings::default());
    }
    let loaded = envmon_config::load_layered_yaml(paths)?;
    let report = envmon_config::report_unused_keys(
        ConfigSurface::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        warn!(
            unused = ?report.unused_leaf_pointers,
            "config keys not read by the CLI"
        );
    }
    DeskSettings::from_config_json(&loaded.config_json)
}

/// Accepts RFC 3339 (`2025-03-01T12:00:00Z`) or a bare date, read as
/// midnight UTC.
pub fn parse_utc(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}': expected YYYY-MM-DD or RFC 3339"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid date '{s}'"))?;
    Ok(midnight.and_utc())
}
