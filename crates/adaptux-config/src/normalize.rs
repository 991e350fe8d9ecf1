//! Merge a user-supplied config document with defaults
//!
//! Normalization never fails. Fields with the wrong shape are replaced by
//! their default and reported as [`ConfigWarning`]s, which are also logged
//! with `tracing::warn!`.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::{AdaptConfig, DEFAULT_PROFILE};

/// A field that was rejected during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Name of the offending field
    pub field: &'static str,
    /// What the field was expected to be
    pub expected: &'static str,
}

impl ConfigWarning {
    fn new(field: &'static str, expected: &'static str) -> Self {
        Self { field, expected }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid config: \"{}\" must be {}. Using default.",
            self.field, self.expected
        )
    }
}

/// Normalize a raw config document, logging any warnings
pub fn normalize_config(raw: &Value) -> AdaptConfig {
    normalize_config_with_warnings(raw).0
}

/// Normalize a raw config document and return the warnings alongside it
///
/// A non-object document (including `null`) is treated as an empty one.
pub fn normalize_config_with_warnings(raw: &Value) -> (AdaptConfig, Vec<ConfigWarning>) {
    let mut config = AdaptConfig::default();
    let mut warnings = Vec::new();

    let Some(doc) = raw.as_object() else {
        return (config, warnings);
    };

    if let Some(profile) = doc.get("profile") {
        match profile.as_str().map(str::trim) {
            Some(trimmed) if !trimmed.is_empty() => config.profile = trimmed.to_string(),
            _ => {
                warnings.push(ConfigWarning::new("profile", "a non-empty string"));
                config.profile = DEFAULT_PROFILE.to_string();
            }
        }
    }

    if let Some(rules) = doc.get("rules") {
        match rules.as_array() {
            Some(list) => config.rules = list.clone(),
            None => warnings.push(ConfigWarning::new("rules", "an array")),
        }
    }

    if let Some(signals) = doc.get("signals") {
        match signals.as_array() {
            Some(list) => {
                // Non-string entries are skipped rather than failing the whole list
                config.signals = list
                    .iter()
                    .filter_map(|s| s.as_str())
                    .map(str::to_string)
                    .collect();
            }
            None => warnings.push(ConfigWarning::new("signals", "an array")),
        }
    }

    if let Some(styling) = doc.get("styling") {
        match plain_object(styling) {
            Some(map) => config.styling = map,
            None => warnings.push(ConfigWarning::new("styling", "an object")),
        }
    }

    if let Some(features) = doc.get("features") {
        match plain_object(features) {
            Some(map) => config.features = map,
            None => warnings.push(ConfigWarning::new("features", "an object")),
        }
    }

    if let Some(debug) = doc.get("debug") {
        match debug.as_bool() {
            Some(flag) => config.debug = flag,
            None => warnings.push(ConfigWarning::new("debug", "a boolean")),
        }
    }

    let depth = doc
        .get("maxPropagationDepth")
        .or_else(|| doc.get("max_propagation_depth"));
    if let Some(depth) = depth {
        match depth.as_u64().filter(|d| *d > 0) {
            Some(d) => config.max_propagation_depth = usize::try_from(d).unwrap_or(usize::MAX),
            None => warnings.push(ConfigWarning::new(
                "maxPropagationDepth",
                "a positive integer",
            )),
        }
    }

    for warning in &warnings {
        warn!("[adaptux] {}", warning);
    }

    (config, warnings)
}

fn plain_object(value: &Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}
