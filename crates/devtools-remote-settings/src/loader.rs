//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "DEVTOOLS_REMOTE_SETTINGS";
/// Settings file looked up in the working directory otherwise.
pub const DEFAULT_SETTINGS_FILE: &str = "devtools-remote.json";

/// Resolve the settings file path.
pub fn settings_path() -> PathBuf {
    std::env::var(SETTINGS_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Invalid JSON or values the
/// server cannot run with are errors.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Like [`load_settings_from_path`], reading overrides through `env`.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<RelaySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides looked up through `env`.
///
/// Recognized variables:
/// - `PORT`, `WEBSOCKET_DOMAIN`, `MIXPANEL_TOKEN`
/// - `DEVTOOLS_REMOTE_HOST`, `DEVTOOLS_REMOTE_STATIC_DIR`
/// - `DEVTOOLS_REMOTE_LOG_LEVEL`, `DEVTOOLS_REMOTE_LOG_JSON`
/// - `DEVTOOLS_REMOTE_METRICS`
///
/// Empty values are treated as unset; invalid values are ignored with a
/// warning.
pub fn apply_overrides<F>(settings: &mut RelaySettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| env(name).filter(|v| !v.is_empty());

    // ── Server settings ─────────────────────────────────────────────
    if let Some(raw) = string("PORT") {
        match parse_u16_range(&raw, 0, 65535) {
            Some(v) => settings.server.port = v,
            None => warn!(key = "PORT", value = %raw, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = string("WEBSOCKET_DOMAIN") {
        settings.server.public_host = Some(v);
    }
    if let Some(v) = string("DEVTOOLS_REMOTE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("DEVTOOLS_REMOTE_STATIC_DIR") {
        settings.server.static_dir = v;
    }

    // ── Analytics ───────────────────────────────────────────────────
    if let Some(v) = string("MIXPANEL_TOKEN") {
        settings.analytics.mixpanel_token = Some(v);
    }

    // ── Logging and metrics ─────────────────────────────────────────
    if let Some(v) = string("DEVTOOLS_REMOTE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(&string, "DEVTOOLS_REMOTE_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = read_bool(&string, "DEVTOOLS_REMOTE_METRICS") {
        settings.metrics.enabled = v;
    }
}

fn read_bool(string: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = string(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
