//! Signal values and the signals registry
//!
//! The registry is the system of record for raw inputs. Names are unique for
//! the registry's lifetime: a signal is created by `register`, changed only
//! by `update`, and never removed. Invalid calls never panic or return early
//! with partial effects; they are reported as [`SignalError`]s on the
//! `signal:error` topic and leave the store unchanged.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bus::{EventBus, Topic};
use crate::error::{SignalError, SignalErrorKind};
use crate::subscription::Subscription;
use crate::value::to_number;

/// A primitive signal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Boolean signal (e.g. `idle`)
    Bool(bool),
    /// Finite numeric signal (e.g. `focus`, `scroll`)
    Number(f64),
    /// Text signal
    Text(String),
}

/// Signal name → value, ordered by name
pub type SignalMap = BTreeMap<String, SignalValue>;

impl SignalValue {
    /// Validate a JSON value as a signal value
    ///
    /// Only finite numbers, booleans and strings are accepted; `null`,
    /// arrays and objects are rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// JSON form of the value
    ///
    /// A non-finite number has no JSON form and becomes `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Numeric reading of the value (`true` → 1, numeric text parsed, otherwise `NaN`)
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            other => to_number(Some(&other.to_json())),
        }
    }

    /// Whether the signal currently carries activity: a non-zero number,
    /// `true`, or non-empty text
    pub fn is_active(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0,
            Self::Bool(b) => *b,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for SignalValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for SignalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<SignalValue> for Value {
    fn from(v: SignalValue) -> Self {
        v.to_json()
    }
}

/// A stored signal, as carried by register/update events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    /// Signal name
    pub name: String,
    /// Normalized value
    pub value: SignalValue,
}

/// Events published by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// A new signal was stored
    Registered(SignalRecord),
    /// An existing signal changed
    Updated(SignalRecord),
    /// A call was rejected
    Rejected(SignalError),
}

impl SignalEvent {
    /// Topic the event is published on
    pub fn topic(&self) -> Topic {
        match self {
            Self::Registered(_) => Topic::SignalRegister,
            Self::Updated(_) => Topic::SignalUpdate,
            Self::Rejected(_) => Topic::SignalError,
        }
    }

    /// JSON payload for republishing on a `Value` bus
    pub fn payload(&self) -> Value {
        let payload = match self {
            Self::Registered(record) | Self::Updated(record) => serde_json::to_value(record),
            Self::Rejected(err) => serde_json::to_value(err),
        };
        payload.unwrap_or(Value::Null)
    }
}

/// Validated key/value store of primitive signal values
#[derive(Debug, Default)]
pub struct SignalsRegistry {
    signals: RwLock<SignalMap>,
    events: EventBus<SignalEvent>,
}

impl SignalsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new signal with its initial value
    pub fn register(&self, name: &str, value: impl Into<Value>) -> Result<SignalValue, SignalError> {
        let raw = value.into();
        let result = self.store(name, raw, |signals, name| {
            if signals.contains_key(name) {
                Err(SignalErrorKind::Duplicate)
            } else {
                Ok(())
            }
        });
        self.publish(result, SignalEvent::Registered)
    }

    /// Overwrite the value of a registered signal
    pub fn update(&self, name: &str, value: impl Into<Value>) -> Result<SignalValue, SignalError> {
        let raw = value.into();
        let result = self.store(name, raw, |signals, name| {
            if signals.contains_key(name) {
                Ok(())
            } else {
                Err(SignalErrorKind::Unknown)
            }
        });
        self.publish(result, SignalEvent::Updated)
    }

    /// Validate and store under a single write lock; the lock is released before publishing
    fn store<F>(&self, name: &str, raw: Value, precondition: F) -> Result<SignalRecord, SignalError>
    where
        F: FnOnce(&SignalMap, &str) -> Result<(), SignalErrorKind>,
    {
        if name.trim().is_empty() {
            return Err(SignalError::new(SignalErrorKind::InvalidName, name, raw));
        }

        let mut signals = self.signals.write();
        if let Err(kind) = precondition(&signals, name) {
            return Err(SignalError::new(kind, name, raw));
        }
        let Some(value) = SignalValue::from_json(&raw) else {
            return Err(SignalError::new(SignalErrorKind::InvalidType, name, raw));
        };

        signals.insert(name.to_string(), value.clone());
        Ok(SignalRecord {
            name: name.to_string(),
            value,
        })
    }

    fn publish<F>(
        &self,
        result: Result<SignalRecord, SignalError>,
        wrap: F,
    ) -> Result<SignalValue, SignalError>
    where
        F: FnOnce(SignalRecord) -> SignalEvent,
    {
        match result {
            Ok(record) => {
                let value = record.value.clone();
                let event = wrap(record);
                self.events.emit(event.topic(), &event);
                Ok(value)
            }
            Err(err) => {
                debug!(name = %err.name, kind = %err.kind, "signal rejected");
                let event = SignalEvent::Rejected(err.clone());
                self.events.emit(event.topic(), &event);
                Err(err)
            }
        }
    }

    /// Current value of a signal
    pub fn get(&self, name: &str) -> Option<SignalValue> {
        self.signals.read().get(name).cloned()
    }

    /// Whether a signal has been registered
    pub fn contains(&self, name: &str) -> bool {
        self.signals.read().contains_key(name)
    }

    /// Copy of every stored signal
    pub fn get_all(&self) -> SignalMap {
        self.signals.read().clone()
    }

    /// Number of registered signals
    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    /// Whether no signal has been registered
    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }

    /// Subscribe to value updates
    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &SignalValue) + Send + Sync + 'static,
    {
        self.events.on_fn(Topic::SignalUpdate, move |event| {
            if let SignalEvent::Updated(record) = event {
                callback(&record.name, &record.value);
            }
        })
    }

    /// Subscribe to new registrations
    pub fn on_register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SignalRecord) + Send + Sync + 'static,
    {
        self.events.on_fn(Topic::SignalRegister, move |event| {
            if let SignalEvent::Registered(record) = event {
                callback(record);
            }
        })
    }

    /// Subscribe to rejected calls
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SignalError) + Send + Sync + 'static,
    {
        self.events.on_fn(Topic::SignalError, move |event| {
            if let SignalEvent::Rejected(err) = event {
                callback(err);
            }
        })
    }
}
