//! Immutable-snapshot state store
//!
//! Each [`StateContainer::set_state`] merges a patch over the current
//! snapshot, stores the result as a new `Arc`, and then calls every
//! subscriber with it. Subscribers fire on every call, including an empty
//! patch. Readers holding an older `Arc` keep seeing that revision.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::signals::SignalMap;
use crate::subscription::Subscription;

/// A snapshot type that can absorb a patch
pub trait Mergeable: Clone + Send + Sync + 'static {
    /// Partial update
    type Patch;

    /// New snapshot with `patch` shallow-merged over `self`
    fn merge(&self, patch: Self::Patch) -> Self;
}

impl Mergeable for Map<String, Value> {
    type Patch = Map<String, Value>;

    fn merge(&self, patch: Self::Patch) -> Self {
        let mut next = self.clone();
        next.extend(patch);
        next
    }
}

/// Callback invoked with every new snapshot
pub type Subscriber<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

type SubscriberList<T> = Arc<Mutex<Vec<Subscriber<T>>>>;

/// Snapshot store with synchronous subscriber notification
pub struct StateContainer<T: Mergeable> {
    current: RwLock<Arc<T>>,
    revision: AtomicU64,
    subscribers: SubscriberList<T>,
}

impl<T: Mergeable> StateContainer<T> {
    /// Container holding `initial` as revision 0
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            revision: AtomicU64::new(0),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current snapshot
    pub fn get_state(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Merge `patch`, store the new snapshot and notify every subscriber
    pub fn set_state(&self, patch: T::Patch) -> Arc<T> {
        let next = {
            let mut current = self.current.write();
            let next = Arc::new(current.merge(patch));
            *current = Arc::clone(&next);
            next
        };
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;

        let subscribers = self.subscribers.lock().clone();
        debug!(revision, subscribers = subscribers.len(), "state updated");
        for subscriber in subscribers {
            subscriber(&next);
        }
        next
    }

    /// Register a subscriber
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let subscriber: Subscriber<T> = Arc::new(f);
        self.subscribers.lock().push(Arc::clone(&subscriber));

        let list: Weak<Mutex<Vec<Subscriber<T>>>> = Arc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.lock().retain(|s| !Arc::ptr_eq(s, &subscriber));
            }
        })
    }

    /// Number of `set_state` calls so far
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber
    pub fn clear_subscribers(&self) {
        self.subscribers.lock().clear();
    }
}

impl<T: Mergeable + fmt::Debug> fmt::Debug for StateContainer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContainer")
            .field("revision", &self.revision())
            .field("state", &self.get_state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Pipeline state: active profile, signal values and UI outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdaptState {
    /// Active profile
    pub profile: String,
    /// Latest signal values, heuristics included
    pub signals: SignalMap,
    /// Current UI outputs
    pub ui: Map<String, Value>,
}

impl AdaptState {
    /// Initial state for `profile`
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Self::default()
        }
    }
}

/// Fields to replace in an [`AdaptState`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptStatePatch {
    /// New profile
    pub profile: Option<String>,
    /// New signal map
    pub signals: Option<SignalMap>,
    /// New UI map
    pub ui: Option<Map<String, Value>>,
}

impl AdaptStatePatch {
    /// Patch that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the profile
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Replace the signal map
    pub fn with_signals(mut self, signals: SignalMap) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Replace the UI map
    pub fn with_ui(mut self, ui: Map<String, Value>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Whether the patch carries no field
    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && self.signals.is_none() && self.ui.is_none()
    }
}

impl Mergeable for AdaptState {
    type Patch = AdaptStatePatch;

    fn merge(&self, patch: Self::Patch) -> Self {
        Self {
            profile: patch.profile.unwrap_or_else(|| self.profile.clone()),
            signals: patch.signals.unwrap_or_else(|| self.signals.clone()),
            ui: patch.ui.unwrap_or_else(|| self.ui.clone()),
        }
    }
}
