//! Loading config documents from disk or strings

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::AdaptConfig;
use crate::normalize::{normalize_config_with_warnings, ConfigWarning};

/// Errors raised while reading or parsing a config document
///
/// Field-level problems are not errors; they become [`ConfigWarning`]s.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid in its format
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        /// Format the parser expected
        format: ConfigFormat,
        /// Parser error message
        message: String,
    },

    /// The file extension does not map to a supported format
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

impl ConfigError {
    fn parse(format: ConfigFormat, err: impl fmt::Display) -> Self {
        Self::Parse {
            format,
            message: err.to_string(),
        }
    }
}

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON document
    Json,
    /// TOML document
    #[cfg(feature = "toml")]
    Toml,
    /// YAML document
    #[cfg(feature = "yaml")]
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Ok(Self::Json),
            #[cfg(feature = "toml")]
            "toml" => Ok(Self::Toml),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parse `text` into a JSON value tree
    pub fn parse(self, text: &str) -> Result<Value, ConfigError> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| ConfigError::parse(self, e)),
            #[cfg(feature = "toml")]
            Self::Toml => toml::from_str(text).map_err(|e| ConfigError::parse(self, e)),
            #[cfg(feature = "yaml")]
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| ConfigError::parse(self, e)),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            #[cfg(feature = "toml")]
            Self::Toml => "toml",
            #[cfg(feature = "yaml")]
            Self::Yaml => "yaml",
        };
        f.write_str(name)
    }
}

/// A normalized config together with the warnings produced while loading it
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The normalized configuration
    pub config: AdaptConfig,
    /// Fields that were replaced by defaults
    pub warnings: Vec<ConfigWarning>,
}

/// Reads config documents and normalizes them
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and normalize a config file, picking the format from its extension
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loading {} config from {}", format, path.display());
        Self::load_from_str(&text, format)
    }

    /// Parse and normalize a config document held in memory
    pub fn load_from_str(text: &str, format: ConfigFormat) -> Result<LoadedConfig, ConfigError> {
        let raw = format.parse(text)?;
        let (config, warnings) = normalize_config_with_warnings(&raw);
        Ok(LoadedConfig { config, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("adapt.json")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("adapt.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("adapt.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("adapt.ini")),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn test_load_json_str() {
        let loaded = ConfigLoader::load_from_str(
            r#"{"profile": "reader", "signals": ["idle"]}"#,
            ConfigFormat::Json,
        )
        .unwrap();

        assert_eq!(loaded.config.profile, "reader");
        assert_eq!(loaded.config.signals, vec!["idle"]);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_load_toml_rules() {
        let text = r#"
profile = "calm"

[[rules]]
when = { idle = true }
apply = { calmMode = true }

[[rules]]
when = { signal = "focus", op = "<", value = 0.4 }
apply = { ui = { highlight = true } }
"#;

        let loaded = ConfigLoader::load_from_str(text, ConfigFormat::Toml).unwrap();

        assert_eq!(loaded.config.profile, "calm");
        assert_eq!(loaded.config.rules.len(), 2);
        assert_eq!(loaded.config.rules[1]["when"]["op"], "<");
    }

    #[test]
    fn test_parse_error_reports_format() {
        let err = ConfigLoader::load_from_str("{ not json", ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse json config"));
    }
}
