pub mod check;
pub mod eval;
pub mod replay;

use std::path::Path;

use adaptux_config::{ConfigLoader, LoadedConfig};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

/// Load and normalize a config file
pub(crate) fn load_config(path: &Path) -> Result<LoadedConfig> {
    ConfigLoader::load_from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Parse a command line argument that must hold a JSON object
pub(crate) fn parse_object(arg: &str, what: &str) -> Result<Map<String, Value>> {
    let value: Value =
        serde_json::from_str(arg).with_context(|| format!("--{what} is not valid JSON"))?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("--{what} must be a JSON object, got {other}"),
    }
}
