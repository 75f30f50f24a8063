//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

/// Resolve the settings file path.
///
/// `RELAY_CONFIG` wins when set; otherwise `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// [`RelaySettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Read and merge the settings file without consulting the environment.
pub fn read_settings_file(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `RELAY_*` environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning and the file/default value
/// is kept.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary variable lookup.
pub fn apply_overrides_from(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("RELAY_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("RELAY_PORT", &v),
        }
    }
    if let Some(v) = string("RELAY_WS_PATH") {
        settings.server.ws_path = v;
    }
    if let Some(v) = string("RELAY_STATIC_DIR") {
        settings.server.static_dir = v;
    }

    // ── Relay ───────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_WELCOME_MESSAGE") {
        settings.relay.welcome_message = v;
    }
    if let Some(v) = string("RELAY_MAX_MESSAGE_SIZE") {
        match parse_usize_range(&v, 1024, 64 * 1024 * 1024) {
            Some(n) => settings.relay.max_message_size = n,
            None => warn_invalid("RELAY_MAX_MESSAGE_SIZE", &v),
        }
    }
    if let Some(v) = string("RELAY_SEND_QUEUE") {
        match parse_usize_range(&v, 1, 65_536) {
            Some(n) => settings.relay.send_queue_capacity = n,
            None => warn_invalid("RELAY_SEND_QUEUE", &v),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}
