//! Layered configuration resolution: CLI > environment > TOML file > default.
//!
//! Every pipeline path and threshold is resolved through the same four-tier
//! priority order so there is exactly one place that knows how to find the
//! config file and exactly one place that knows the platform-default data
//! directory.

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve a path-valued setting: CLI argument, then environment variable,
/// then a key in the already-loaded TOML document, then a compiled default.
pub fn resolve_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml: Option<&toml::Value>,
    toml_key: &str,
    default: impl FnOnce() -> PathBuf,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }
    if let Some(value) = toml.and_then(|t| t.get(toml_key)).and_then(|v| v.as_str()) {
        return PathBuf::from(value);
    }
    default()
}

/// Resolve a string-valued setting with the same CLI > env > TOML > default
/// priority as [`resolve_path`], without the path coercion.
pub fn resolve_string(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml: Option<&toml::Value>,
    toml_key: &str,
    default: impl FnOnce() -> String,
) -> String {
    if let Some(v) = cli_arg {
        return v.to_string();
    }
    if let Ok(v) = std::env::var(env_var_name) {
        return v;
    }
    if let Some(v) = toml.and_then(|t| t.get(toml_key)).and_then(|v| v.as_str()) {
        return v.to_string();
    }
    default()
}

/// Locate and parse the application's TOML config file, if one exists.
///
/// Looks in `$XDG_CONFIG_HOME/<app_name>/config.toml` (or the platform
/// equivalent via `dirs`), falling back to `/etc/<app_name>/config.toml` on
/// Linux. Returns `Ok(None)` rather than an error when no file is present —
/// the file is optional at every tier of resolution above it.
pub fn load_toml_config(app_name: &str) -> Result<Option<toml::Value>> {
    let candidates = config_file_candidates(app_name);
    for path in candidates {
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let value: toml::Value = toml::from_str(&content)?;
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn config_file_candidates(app_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(app_name).join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from(format!("/etc/{app_name}/config.toml")));
    }
    candidates
}

/// Platform-default data directory for the named application
/// (logs, status JSON, fingerprint cache, run lock).
pub fn default_data_dir(app_name: &str) -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(app_name))
            .unwrap_or_else(|| PathBuf::from(format!("C:\\ProgramData\\{app_name}")))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(app_name))
            .unwrap_or_else(|| PathBuf::from(format!("/Library/Application Support/{app_name}")))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join(app_name))
            .unwrap_or_else(|| PathBuf::from(format!("/var/lib/{app_name}")))
    }
}

/// Parse a `bool`-ish environment variable (`1`/`true`/`yes` vs anything
/// else), falling back to `default` when unset or unparsable.
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

/// Parse an env var that may be absent (falls back to `default`) but must
/// parse if present — surfaces misconfiguration instead of silently
/// ignoring a typo'd value.
pub fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Config(format!("{name} could not be parsed: {v:?}"))),
        Err(_) => Ok(default),
    }
}
