use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use adaptux_core::{Engine, Topic};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::load_config;

pub fn execute(config: &Path, events: &Path) -> Result<()> {
    let loaded = load_config(config)?;

    let reader: Box<dyn BufRead> = if events == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(events)
            .with_context(|| format!("failed to open events file {}", events.display()))?;
        Box::new(BufReader::new(file))
    };

    let engine = Engine::new(loaded.config);
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    let _adaptations = engine.on_fn(Topic::Adaptation, move |result: &Value| {
        sink.lock().push(result.clone());
    });

    let ctx = engine.signal_context();
    let mut replayed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read events")?;
        if line.trim().is_empty() {
            continue;
        }
        let emission: Value = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not valid JSON", index + 1))?;
        debug!(line = index + 1, "replaying {emission}");
        ctx.emit(emission);
        replayed += 1;

        for change in changes.lock().drain(..) {
            println!("{change}");
        }
    }

    info!(emissions = replayed, "replay finished");
    println!("{}", Value::Object(engine.ui().get_all()));

    engine.destroy();
    Ok(())
}
