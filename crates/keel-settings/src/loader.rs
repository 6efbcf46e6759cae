//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`KeelSettings::default()`]
//! 2. If `~/.keel/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{EstimatorKind, KeelSettings};

/// Resolve the path to the settings file (`~/.keel/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".keel").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<KeelSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<KeelSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<KeelSettings> {
    let defaults = serde_json::to_value(KeelSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: KeelSettings = serde_json::from_value(merged)?;
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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut KeelSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`. Invalid values are logged and ignored.
pub fn apply_overrides(settings: &mut KeelSettings, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    // ── Context ─────────────────────────────────────────────────────
    if let Some(v) = read_usize(&read, "KEEL_STICKINESS_FACTOR", 1, 1_000) {
        settings.context.stickiness_factor = v;
    }
    if let Some(v) = read_usize(&read, "KEEL_MAX_MESSAGE_HISTORY", 2, 1_000_000) {
        settings.context.max_message_history = v;
    }

    // ── Tokens ──────────────────────────────────────────────────────
    if let Some(v) = read("KEEL_TOKEN_ESTIMATOR") {
        match parse_estimator(&v) {
            Some(kind) => settings.tokens.estimator = kind,
            None => warn!(key = "KEEL_TOKEN_ESTIMATOR", value = %v, "invalid estimator env var, ignoring"),
        }
    }

    // ── Gemini ──────────────────────────────────────────────────────
    if let Some(v) = read("KEEL_GEMINI_MODEL") {
        settings.gemini.model = v;
    }
    if let Some(v) = read("KEEL_GEMINI_BASE_URL") {
        settings.gemini.base_url = v;
    }
    if let Some(v) = read("GEMINI_API_KEY") {
        settings.gemini.api_key = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("KEEL_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse an estimator name (`words` or `chars`, case-insensitive).
pub fn parse_estimator(val: &str) -> Option<EstimatorKind> {
    match val.trim().to_lowercase().as_str() {
        "words" => Some(EstimatorKind::Words),
        "chars" => Some(EstimatorKind::Chars),
        _ => None,
    }
}

fn read_usize(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = read(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_objects_recursively() {
        let merged = deep_merge(
            json!({"context": {"stickinessFactor": 5, "maxMessageHistory": 1000}}),
            json!({"context": {"stickinessFactor": 2}}),
        );
        assert_eq!(
            merged,
            json!({"context": {"stickinessFactor": 2, "maxMessageHistory": 1000}})
        );
    }

    #[test]
    fn deep_merge_skips_null_and_replaces_arrays() {
        let merged = deep_merge(json!({"a": 1, "b": [1, 2]}), json!({"a": null, "b": [3]}));
        assert_eq!(merged, json!({"a": 1, "b": [3]}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(&dir.path().join("nope.json"), env_of(&[])).unwrap();
        assert_eq!(settings, KeelSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"context":{"stickinessFactor":3},"gemini":{"model":"gemini-2.5-pro"}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, env_of(&[])).unwrap();
        assert_eq!(settings.context.stickiness_factor, 3);
        assert_eq!(settings.context.max_message_history, 1000);
        assert_eq!(settings.gemini.model, "gemini-2.5-pro");
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context":{"stickinessFactor":3}}"#).unwrap();

        let settings = load_with_env(
            &path,
            env_of(&[
                ("KEEL_STICKINESS_FACTOR", "8"),
                ("KEEL_TOKEN_ESTIMATOR", "CHARS"),
                ("GEMINI_API_KEY", "k-123"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.context.stickiness_factor, 8);
        assert_eq!(settings.tokens.estimator, EstimatorKind::Chars);
        assert_eq!(settings.gemini.api_key.as_deref(), Some("k-123"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = KeelSettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("KEEL_STICKINESS_FACTOR", "0"),
                ("KEEL_MAX_MESSAGE_HISTORY", "lots"),
                ("KEEL_TOKEN_ESTIMATOR", "bytes"),
                ("KEEL_GEMINI_MODEL", ""),
            ]),
        );
        assert_eq!(settings, KeelSettings::default());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_with_env(&path, env_of(&[])), Err(SettingsError::Json(_)));
    }

    #[test]
    fn out_of_range_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context":{"stickinessFactor":0}}"#).unwrap();
        assert_matches!(
            load_with_env(&path, env_of(&[])),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_usize_range("5", 1, 10), Some(5));
        assert_eq!(parse_usize_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("-1", 1, 10), None);
        assert_eq!(parse_estimator(" Words "), Some(EstimatorKind::Words));
        assert_eq!(parse_estimator("tokens"), None);
    }
}
