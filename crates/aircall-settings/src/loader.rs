//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AirCallSettings::default()`]
//! 2. If `~/.aircall/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `AIRCALL_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::AirCallSettings;

/// Resolve the path to the settings file (`~/.aircall/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".aircall").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If the
/// file contains invalid JSON or the result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<AirCallSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<AirCallSettings> {
    let defaults = serde_json::to_value(AirCallSettings::default())?;

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

/// Apply `AIRCALL_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut AirCallSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (an environment stand-in).
///
/// - Integers must parse and fall within the stated range
/// - Booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Empty or invalid values are ignored with a warning
pub fn apply_overrides_from(
    settings: &mut AirCallSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = Env { lookup };

    if let Some(v) = env.string("AIRCALL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("AIRCALL_PORT", |s| parse_range::<u16>(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("AIRCALL_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.parsed("AIRCALL_MAX_CONNECTIONS", |s| {
        parse_range::<usize>(s, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("AIRCALL_PING_INTERVAL_MS", |s| {
        parse_range::<u64>(s, 1000, 600_000)
    }) {
        settings.server.ping_interval_ms = v;
    }
    if let Some(v) = env.parsed("AIRCALL_PONG_TIMEOUT_MS", |s| {
        parse_range::<u64>(s, 1000, 3_600_000)
    }) {
        settings.server.pong_timeout_ms = v;
    }
    if let Some(v) = env.string("AIRCALL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("AIRCALL_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

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

/// Parse a string as an integer within `min..=max`.
pub fn parse_range<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
