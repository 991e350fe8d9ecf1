//! Interface for signal producers
//!
//! A producer (an idle detector, a scroll tracker, a replayed log) implements
//! [`SignalSource`] and is handed a [`SignalContext`] when started. Every
//! emitted object carries a `type` discriminator:
//!
//! ```json
//! {"type": "idle", "value": true}
//! {"type": "scroll", "position": 840, "velocity": 1.7, "direction": "down"}
//! ```
//!
//! The context records the full object in a [`SignalSnapshot`] keyed by
//! `type` and forwards it to the engine, which stores the primary reading
//! (`value`, else `position`) as the signal named by `type`.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Fields consulted, in order, for the value stored in the registry
pub const PRIMARY_FIELDS: [&str; 2] = ["value", "position"];

/// Non-empty `type` of an emitted object
pub fn emission_type(emitted: &Value) -> Option<&str> {
    emitted
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// `(type, primary reading)` of an emitted object, if it has both
pub fn primary_reading(emitted: &Value) -> Option<(&str, &Value)> {
    let kind = emission_type(emitted)?;
    let value = PRIMARY_FIELDS.iter().find_map(|field| emitted.get(*field))?;
    Some((kind, value))
}

/// Latest emission per signal type, stamped with the time it was recorded
#[derive(Debug, Default)]
pub struct SignalSnapshot {
    data: Mutex<Map<String, Value>>,
}

impl SignalSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `emitted` under its `type` with a `ts` in epoch milliseconds
    ///
    /// Values that are not objects with a non-empty string `type` are ignored.
    pub fn update(&self, emitted: &Value) {
        let (Some(kind), Value::Object(fields)) = (emission_type(emitted), emitted) else {
            return;
        };
        let mut entry = fields.clone();
        entry.insert("ts".to_string(), Value::from(Utc::now().timestamp_millis()));
        self.data.lock().insert(kind.to_string(), Value::Object(entry));
    }

    /// Copy of every recorded entry
    pub fn get(&self) -> Map<String, Value> {
        self.data.lock().clone()
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.data.lock().clear();
    }
}

type Forward = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle a [`SignalSource`] emits through
#[derive(Clone)]
pub struct SignalContext {
    snapshot: Arc<SignalSnapshot>,
    forward: Forward,
}

impl SignalContext {
    /// Context recording into `snapshot` and passing every emission to `forward`
    pub fn new<F>(snapshot: Arc<SignalSnapshot>, forward: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self {
            snapshot,
            forward: Arc::new(forward),
        }
    }

    /// Record and forward one emission
    pub fn emit(&self, emitted: Value) {
        self.snapshot.update(&emitted);
        (self.forward)(&emitted);
    }

    /// Snapshot this context records into
    pub fn snapshot(&self) -> &Arc<SignalSnapshot> {
        &self.snapshot
    }
}

impl fmt::Debug for SignalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalContext")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

/// A producer of signal emissions
pub trait SignalSource: Send {
    /// Source name, for logs
    fn name(&self) -> &str;

    /// Begin producing into `ctx`
    fn start(&mut self, ctx: SignalContext);

    /// Stop producing and release resources
    fn stop(&mut self);
}
