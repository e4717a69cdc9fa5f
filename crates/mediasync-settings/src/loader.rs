//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use mediasync_core::logging::LogLevel;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Settings file used when neither `--config` nor `MEDIASYNC_CONFIG` is given.
pub const DEFAULT_SETTINGS_FILE: &str = "mediasync.json";

/// Environment variable naming an alternative settings file.
pub const CONFIG_ENV: &str = "MEDIASYNC_CONFIG";

/// Resolve the settings file path.
///
/// Priority: the explicit path, then `MEDIASYNC_CONFIG`, then
/// `./mediasync.json`.
pub fn settings_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    read_env_string(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from)
}

/// Load settings from a specific path with process env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the file
/// contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, reading overrides through `lookup`.
pub fn load_settings_with_env(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
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

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply overrides read through `lookup`.
///
/// Where two names are listed, the `MEDIASYNC_`-prefixed one wins.
/// Integers must parse and fall within range; anything else is logged and
/// ignored.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16_any(&["MEDIASYNC_PORT", "PORT"], 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("MEDIASYNC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("MEDIASYNC_DEFAULT_ROOM") {
        settings.server.default_room = v;
    }
    if let Some(v) = env.u64("MEDIASYNC_SHUTDOWN_TIMEOUT_SECS", 1, 600) {
        settings.server.shutdown_timeout_secs = v;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.usize("MEDIASYNC_SEND_QUEUE", 1, 65_536) {
        settings.connection.send_queue_capacity = v;
    }
    if let Some(v) = env.usize("MEDIASYNC_MAX_MESSAGE_SIZE", 64, 16 * 1024 * 1024) {
        settings.connection.max_message_size = v;
    }
    if let Some(v) = env.u64("MEDIASYNC_PONG_WAIT_SECS", 2, 3600) {
        settings.connection.pong_wait_secs = v;
    }
    if let Some(v) = env.u64("MEDIASYNC_WRITE_WAIT_SECS", 1, 600) {
        settings.connection.write_wait_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string_any(&["MEDIASYNC_LOG_LEVEL", "LOG_LEVEL"]) {
        settings.logging.level = LogLevel::from_str_lossy(&v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn string_any(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.string(name))
    }

    fn u16_any(&self, names: &[&str], min: u16, max: u16) -> Option<u16> {
        let (name, val) = names
            .iter()
            .find_map(|name| self.string(name).map(|v| (*name, v)))?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_with_env ──────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings =
            load_settings_with_env(Path::new("/nonexistent/mediasync.json"), no_env).unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediasync.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "connection": {"sendQueueCapacity": 32}}"#,
        )
        .unwrap();

        let settings = load_settings_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.connection.send_queue_capacity, 32);
        assert_eq!(settings.connection.max_message_size, 4096);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediasync.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert_matches!(load_settings_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediasync.json");
        std::fs::write(&path, r#"{"connection": {"sendQueueCapacity": 0}}"#).unwrap();

        assert_matches!(
            load_settings_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediasync.json");
        std::fs::write(&path, r#"{"server": {"port": 9090}}"#).unwrap();

        let settings = load_settings_with_env(&path, env_of(&[("PORT", "7000")])).unwrap();
        assert_eq!(settings.server.port, 7000);
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn prefixed_port_wins_over_plain() {
        let mut s = RelaySettings::default();
        apply_overrides(
            &mut s,
            env_of(&[("PORT", "7000"), ("MEDIASYNC_PORT", "7001")]),
        );
        assert_eq!(s.server.port, 7001);
    }

    #[test]
    fn invalid_port_ignored() {
        let mut s = RelaySettings::default();
        apply_overrides(&mut s, env_of(&[("PORT", "0")]));
        assert_eq!(s.server.port, 8080);
        apply_overrides(&mut s, env_of(&[("PORT", "http")]));
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn log_level_from_plain_var() {
        let mut s = RelaySettings::default();
        apply_overrides(&mut s, env_of(&[("LOG_LEVEL", "debug")]));
        assert_eq!(s.logging.level, LogLevel::Debug);
    }

    #[test]
    fn connection_overrides() {
        let mut s = RelaySettings::default();
        apply_overrides(
            &mut s,
            env_of(&[
                ("MEDIASYNC_SEND_QUEUE", "16"),
                ("MEDIASYNC_MAX_MESSAGE_SIZE", "8192"),
                ("MEDIASYNC_PONG_WAIT_SECS", "20"),
                ("MEDIASYNC_WRITE_WAIT_SECS", "5"),
            ]),
        );
        assert_eq!(s.connection.send_queue_capacity, 16);
        assert_eq!(s.connection.max_message_size, 8192);
        assert_eq!(s.connection.pong_wait_secs, 20);
        assert_eq!(s.connection.write_wait_secs, 5);
    }

    #[test]
    fn out_of_range_queue_ignored() {
        let mut s = RelaySettings::default();
        apply_overrides(&mut s, env_of(&[("MEDIASYNC_SEND_QUEUE", "0")]));
        assert_eq!(s.connection.send_queue_capacity, 256);
    }

    #[test]
    fn empty_values_ignored() {
        let mut s = RelaySettings::default();
        apply_overrides(
            &mut s,
            env_of(&[("MEDIASYNC_HOST", ""), ("MEDIASYNC_DEFAULT_ROOM", "  ")]),
        );
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.default_room, "default");
    }

    #[test]
    fn explicit_path_wins() {
        let path = settings_path(Some(Path::new("/etc/mediasync.json")));
        assert_eq!(path, PathBuf::from("/etc/mediasync.json"));
    }

    // ── parse_*_range ───────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range(" 80 ", 1, 65535), Some(80));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("60", 2, 3600), Some(60));
        assert_eq!(parse_u64_range("1", 2, 3600), None);
        assert_eq!(parse_u64_range("abc", 2, 3600), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("256", 1, 65_536), Some(256));
        assert_eq!(parse_usize_range("70000", 1, 65_536), None);
    }
}
