//! Deduplicating sink for UI outputs

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::bus::Topic;
use crate::subscription::Subscription;
use crate::value::same_value;

/// Handler called with a single-key delta
pub type UiUpdateHandler = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Forwarder called as `(topic, delta)` after the handlers
pub type UiEmitter = Arc<dyn Fn(&str, &Value) + Send + Sync>;

type HandlerList = Arc<Mutex<Vec<UiUpdateHandler>>>;

/// Key/value store of active UI outputs
///
/// Setting a key to a value equal to the stored one does nothing. Any other
/// write stores the value, calls every handler with `{key: value}` and, when
/// an emitter is attached, forwards the same delta as `ui:update`.
#[derive(Default)]
pub struct UiChannel {
    values: Mutex<Map<String, Value>>,
    handlers: HandlerList,
    emitter: Option<UiEmitter>,
}

impl UiChannel {
    /// Channel without an emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel forwarding every delta to `emitter`
    pub fn with_emitter<F>(emitter: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        Self {
            emitter: Some(Arc::new(emitter)),
            ..Self::default()
        }
    }

    /// Store `value` under `key`; returns whether anything changed
    pub fn set(&self, key: &str, value: Value) -> bool {
        {
            let mut values = self.values.lock();
            if values.get(key).is_some_and(|current| same_value(current, &value)) {
                trace!(key, "ui value unchanged");
                return false;
            }
            values.insert(key.to_string(), value.clone());
        }

        let mut delta = Map::new();
        delta.insert(key.to_string(), value);

        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(&delta);
        }
        if let Some(emitter) = &self.emitter {
            emitter(Topic::UiUpdate.as_str(), &Value::Object(delta));
        }
        true
    }

    /// Stored value for `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Copy of every stored value
    pub fn get_all(&self) -> Map<String, Value> {
        self.values.lock().clone()
    }

    /// Register a delta handler
    pub fn on_update(&self, handler: UiUpdateHandler) -> Subscription {
        {
            let mut handlers = self.handlers.lock();
            if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
                return Subscription::noop();
            }
            handlers.push(Arc::clone(&handler));
        }

        let list: Weak<Mutex<Vec<UiUpdateHandler>>> = Arc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.lock().retain(|h| !Arc::ptr_eq(h, &handler));
            }
        })
    }

    /// Register a closure as a delta handler
    pub fn on_update_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        self.on_update(Arc::new(f))
    }

    /// Drop every handler
    pub fn clear_handlers(&self) {
        self.handlers.lock().clear();
    }
}

impl fmt::Debug for UiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiChannel")
            .field("values", &*self.values.lock())
            .field("handlers", &self.handlers.lock().len())
            .field("emitter", &self.emitter.is_some())
            .finish()
    }
}
