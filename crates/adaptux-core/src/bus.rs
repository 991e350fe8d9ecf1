//! Named-topic publish/subscribe bus
//!
//! The bus is synchronous and re-entrant: [`EventBus::emit`] calls every
//! listener on the caller's stack, and a listener may itself emit on the same
//! bus. The listener list is copied before dispatch and no lock is held while
//! a listener runs, so registering or removing listeners from inside a
//! listener is allowed and takes effect on the next emit.
//!
//! ## Topics
//!
//! - `signal:register` - a signal was registered
//! - `signal:update` - a signal value changed
//! - `signal:error` - a registry operation was rejected
//! - `heuristic:update` - a batch of heuristic values changed
//! - `ui:update` - a UI channel key changed
//! - `adaptation` - the rule result changed
//! - `destroy` - the engine was torn down
//!
//! Any other string is a valid custom topic.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::subscription::Subscription;

/// Built-in topics published by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A signal was registered
    SignalRegister,
    /// A signal value was updated
    SignalUpdate,
    /// A registry operation was rejected
    SignalError,
    /// One or more heuristics produced a new value
    HeuristicUpdate,
    /// A UI channel key changed
    UiUpdate,
    /// The combined rule result changed
    Adaptation,
    /// The engine was destroyed
    Destroy,
}

impl Topic {
    /// Parse a topic from its wire name (e.g. `"signal:update"`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signal:register" => Some(Self::SignalRegister),
            "signal:update" => Some(Self::SignalUpdate),
            "signal:error" => Some(Self::SignalError),
            "heuristic:update" => Some(Self::HeuristicUpdate),
            "ui:update" => Some(Self::UiUpdate),
            "adaptation" => Some(Self::Adaptation),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }

    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignalRegister => "signal:register",
            Self::SignalUpdate => "signal:update",
            Self::SignalError => "signal:error",
            Self::HeuristicUpdate => "heuristic:update",
            Self::UiUpdate => "ui:update",
            Self::Adaptation => "adaptation",
            Self::Destroy => "destroy",
        }
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared listener callback
///
/// Listeners are compared by `Arc` identity, so registering the same `Arc`
/// twice on one topic keeps a single entry.
pub type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

type ListenerTable<P> = HashMap<String, Vec<Listener<P>>>;

/// Synchronous topic bus carrying payloads of type `P`
///
/// Cloning the bus yields another handle to the same listener table.
pub struct EventBus<P> {
    listeners: Arc<Mutex<ListenerTable<P>>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<P: 'static> EventBus<P> {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on `topic`
    ///
    /// Registration order is dispatch order. Adding an `Arc` that is already
    /// registered on the topic leaves the list unchanged; the returned handle
    /// still removes it.
    pub fn on(&self, topic: impl AsRef<str>, listener: Listener<P>) -> Subscription {
        let topic = topic.as_ref().to_string();
        {
            let mut table = self.listeners.lock();
            let list = table.entry(topic.clone()).or_default();
            if !list.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                list.push(Arc::clone(&listener));
            }
        }

        let table: Weak<Mutex<ListenerTable<P>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                remove_listener(&mut table.lock(), &topic, &listener);
            }
        })
    }

    /// Register a closure on `topic`
    pub fn on_fn<F>(&self, topic: impl AsRef<str>, f: F) -> Subscription
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.on(topic, Arc::new(f))
    }

    /// Remove a listener from `topic`; returns whether it was registered
    pub fn off(&self, topic: impl AsRef<str>, listener: &Listener<P>) -> bool {
        remove_listener(&mut self.listeners.lock(), topic.as_ref(), listener)
    }

    /// Dispatch `payload` to every listener of `topic`
    ///
    /// A topic without listeners is a no-op.
    pub fn emit(&self, topic: impl AsRef<str>, payload: &P) {
        let topic = topic.as_ref();
        let snapshot: Vec<Listener<P>> = match self.listeners.lock().get(topic) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };

        trace!(topic, listeners = snapshot.len(), "dispatching event");
        for listener in snapshot {
            listener(payload);
        }
    }

    /// Number of listeners registered on `topic`
    pub fn listener_count(&self, topic: impl AsRef<str>) -> usize {
        self.listeners
            .lock()
            .get(topic.as_ref())
            .map_or(0, Vec::len)
    }

    /// Remove every listener on every topic
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

fn remove_listener<P>(table: &mut ListenerTable<P>, topic: &str, listener: &Listener<P>) -> bool {
    let Some(list) = table.get_mut(topic) else {
        return false;
    };
    let before = list.len();
    list.retain(|l| !Arc::ptr_eq(l, listener));
    let removed = list.len() < before;
    if list.is_empty() {
        table.remove(topic);
    }
    removed
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.listeners.lock();
        let mut topics: Vec<_> = table.iter().map(|(t, l)| (t.clone(), l.len())).collect();
        topics.sort();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}
