use std::path::Path;

use adaptux_core::Engine;
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use super::{load_config, parse_object};

pub fn execute(config: &Path, signals: &str, context: Option<&str>) -> Result<()> {
    let loaded = load_config(config)?;
    let signals = parse_object(signals, "signals")?;
    let context = context
        .map(|arg| parse_object(arg, "context"))
        .transpose()?
        .unwrap_or_default();

    let engine = Engine::new(loaded.config);

    // Context first so the first signal evaluation already sees it
    for (key, value) in context {
        engine.set_context(key, value);
    }

    for (name, value) in signals {
        match engine.register_signal(&name, value) {
            Ok(stored) => debug!(signal = %name, value = %stored, "registered"),
            Err(e) => warn!(signal = %name, "skipped: {e}"),
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(engine.ui().get_all()))?
    );

    engine.destroy();
    Ok(())
}
