use std::path::Path;

use adaptux_core::Rule;
use anyhow::Result;

use super::load_config;

pub fn execute(config: &Path) -> Result<()> {
    let loaded = load_config(config)?;

    println!("{}", serde_json::to_string_pretty(&loaded.config)?);

    for warning in &loaded.warnings {
        println!("warning: {warning}");
    }

    let total = loaded.config.rules.len();
    let valid = loaded
        .config
        .rules
        .iter()
        .filter(|doc| Rule::from_value(doc).is_valid())
        .count();
    println!("{valid} of {total} rules are well-formed");

    Ok(())
}
