//! Composition root
//!
//! An [`Engine`] owns one isolated pipeline. The wiring, all synchronous and
//! on the caller's stack:
//!
//! 1. A registry write patches the state's `signals`, runs a heuristics pass
//!    (unless one is already running) and republishes the write as
//!    `signal:register` / `signal:update` on the engine bus. Registry
//!    rejections are republished as `signal:error`.
//! 2. Every state change re-evaluates the rules, unless the rule inputs are
//!    unchanged since the last pass.
//! 3. Each key of the rule result is written into the [`UiChannel`] and a
//!    changed key is published as `ui:update`. Once the whole result is
//!    written, the channel is merged back into the state's `ui` in one patch.
//! 4. A changed rule result is published as `adaptation`.
//!
//! Step 3 feeds step 2 again. The loop settles once no UI key changes; more
//! than `max_propagation_depth` nested passes are cut off with a warning.
//!
//! Rule inputs are layered as `signals` (current signal values), `state`
//! (`profile` plus every current UI output), `context` (the latest emission
//! per signal type, overridden by [`Engine::set_context`] entries) and a root
//! layer holding the configured `features`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use adaptux_config::AdaptConfig;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::bus::{EventBus, Listener, Topic};
use crate::context::{primary_reading, SignalContext, SignalSnapshot, SignalSource};
use crate::error::{EngineError, SignalError};
use crate::heuristics::{Heuristic, HeuristicsEngine, HeuristicsState};
use crate::rules::{AdaptationResult, EvaluationState, RuleProcessor};
use crate::signals::{SignalRecord, SignalValue, SignalsRegistry};
use crate::state::{AdaptState, AdaptStatePatch, StateContainer};
use crate::subscription::Subscription;
use crate::ui_channel::UiChannel;

/// Resets a flag when dropped
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Decrements the propagation depth when dropped
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct EngineInner {
    config: AdaptConfig,
    bus: EventBus<Value>,
    registry: Arc<SignalsRegistry>,
    heuristics: HeuristicsEngine,
    rules: RuleProcessor,
    state: StateContainer<AdaptState>,
    ui: UiChannel,
    snapshot: Arc<SignalSnapshot>,
    context: RwLock<Map<String, Value>>,
    sources: Mutex<Vec<Box<dyn SignalSource>>>,
    internal: Mutex<Vec<Subscription>>,
    last_inputs: Mutex<Option<EvaluationState>>,
    heuristics_running: AtomicBool,
    writing_ui: AtomicBool,
    ui_dirty: AtomicBool,
    depth: AtomicUsize,
    destroyed: AtomicBool,
}

impl EngineInner {
    fn wire(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        let mut subs = Vec::with_capacity(5);

        let on_register = with_inner(&weak, |inner: &EngineInner, record: &SignalRecord| {
            inner.signal_stored(Topic::SignalRegister, &record.name, &record.value);
        });
        subs.push(inner.registry.on_register(on_register));

        let on_update = weak.clone();
        subs.push(inner.registry.on_update(move |name, value| {
            if let Some(inner) = on_update.upgrade() {
                inner.signal_stored(Topic::SignalUpdate, name, value);
            }
        }));

        let on_error = with_inner(&weak, |inner: &EngineInner, err: &SignalError| {
            let payload = serde_json::to_value(err).unwrap_or(Value::Null);
            inner.bus.emit(Topic::SignalError, &payload);
        });
        subs.push(inner.registry.on_error(on_error));

        let on_state = with_inner(&weak, |inner: &EngineInner, _: &Arc<AdaptState>| {
            inner.reevaluate();
        });
        subs.push(inner.state.subscribe(on_state));

        let on_ui = with_inner(&weak, |inner: &EngineInner, delta: &Map<String, Value>| {
            inner.ui_changed(delta);
        });
        subs.push(inner.ui.on_update_fn(on_ui));

        *inner.internal.lock() = subs;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn signal_stored(&self, topic: Topic, name: &str, value: &SignalValue) {
        if self.is_destroyed() {
            return;
        }
        self.state
            .set_state(AdaptStatePatch::new().with_signals(self.registry.get_all()));
        self.run_heuristics();
        self.bus
            .emit(topic, &json!({"name": name, "value": value.to_json()}));
    }

    fn run_heuristics(&self) {
        if self.heuristics_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let _running = FlagGuard(&self.heuristics_running);

        let state = HeuristicsState::new(self.registry.get_all())
            .with_profile(self.state.get_state().profile.clone());
        let changed = self.heuristics.evaluate(&state);
        if !changed.is_empty() {
            trace!(changed = changed.len(), "heuristics pass");
        }
    }

    fn evaluation_state(&self) -> EvaluationState {
        let current = self.state.get_state();

        let mut state = current.ui.clone();
        state.insert("profile".to_string(), Value::String(current.profile.clone()));

        let mut context = self.snapshot.get();
        context.extend(self.context.read().clone());

        EvaluationState {
            signals: Map::new(),
            state,
            context,
            root: self.config.features.clone(),
        }
        .with_signals(&current.signals)
    }

    fn reevaluate(&self) {
        if self.is_destroyed() {
            return;
        }

        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _depth = DepthGuard(&self.depth);
        if depth > self.config.max_propagation_depth {
            warn!(
                depth,
                max = self.config.max_propagation_depth,
                "propagation depth exceeded; keeping current ui values"
            );
            return;
        }

        let inputs = self.evaluation_state();
        {
            let mut last = self.last_inputs.lock();
            if last.as_ref() == Some(&inputs) {
                trace!(depth, "rule inputs unchanged");
                return;
            }
            *last = Some(inputs.clone());
        }

        let result = self.rules.evaluate(&inputs);
        if self.config.debug {
            debug!(depth, result = %serde_json::Value::Object(result.clone()), "rule pass");
        }

        // The whole result lands in the UI channel before the state sees it,
        // so one pass costs one level of depth however many keys it writes
        let owner = !self.writing_ui.swap(true, Ordering::SeqCst);
        {
            let _batch = owner.then(|| FlagGuard(&self.writing_ui));
            for (key, value) in result {
                self.ui.set(&key, value);
            }
        }
        if owner && self.ui_dirty.swap(false, Ordering::SeqCst) {
            self.sync_ui();
        }
    }

    fn ui_changed(&self, delta: &Map<String, Value>) {
        if self.is_destroyed() {
            return;
        }
        trace!(keys = ?delta.keys().collect::<Vec<_>>(), "ui changed");
        if self.writing_ui.load(Ordering::SeqCst) {
            self.ui_dirty.store(true, Ordering::SeqCst);
            return;
        }
        self.sync_ui();
    }

    fn sync_ui(&self) {
        self.state
            .set_state(AdaptStatePatch::new().with_ui(self.ui.get_all()));
    }

    fn ingest(&self, emitted: &Value) {
        if self.is_destroyed() {
            return;
        }
        let Some((name, reading)) = primary_reading(emitted) else {
            trace!("emission without a primary reading; snapshot only");
            return;
        };
        if !self.config.accepts_signal(name) {
            debug!(signal = name, "signal not declared in config; dropped");
            return;
        }

        // Rejections are already published on `signal:error`
        let _ = if self.registry.contains(name) {
            self.registry.update(name, reading.clone())
        } else {
            self.registry.register(name, reading.clone())
        };
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for source in self.sources.get_mut().iter_mut() {
            source.stop();
        }
    }
}

/// Adapt a callback over `Arc<EngineInner>` into one holding a `Weak`
fn with_inner<A: ?Sized + 'static, F>(
    weak: &Weak<EngineInner>,
    f: F,
) -> impl Fn(&A) + Send + Sync + 'static
where
    F: Fn(&EngineInner, &A) + Send + Sync + 'static,
{
    let weak = weak.clone();
    move |arg: &A| {
        if let Some(inner) = weak.upgrade() {
            f(&inner, arg);
        }
    }
}

/// One isolated decision pipeline
///
/// Cloning yields another handle to the same pipeline.
///
/// ```rust
/// use adaptux_config::AdaptConfig;
/// use adaptux_core::Engine;
/// use serde_json::json;
///
/// let config = AdaptConfig::new().with_rule(json!({
///     "when": {"signal": "focus", "op": "<", "value": 0.4},
///     "apply": {"ui": {"highlight": true}}
/// }));
/// let engine = Engine::new(config);
///
/// engine.register_signal("focus", 0.3).unwrap();
/// assert_eq!(engine.ui().get("highlight"), Some(json!(true)));
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build a pipeline from `config`
    pub fn new(config: AdaptConfig) -> Self {
        let bus: EventBus<Value> = EventBus::new();
        let registry = Arc::new(SignalsRegistry::new());
        let heuristics = HeuristicsEngine::new(Arc::clone(&registry), bus.clone());

        let rules = RuleProcessor::from_values(config.rules.iter());
        rules.bind_engine(Arc::new(bus.clone()));

        let ui_bus = bus.clone();
        let ui = UiChannel::with_emitter(move |topic, delta| ui_bus.emit(topic, delta));
        let state = StateContainer::new(AdaptState::new(config.profile.clone()));

        debug!(
            profile = %config.profile,
            rules = rules.len(),
            declared_signals = config.signals.len(),
            "engine created"
        );

        let inner = Arc::new(EngineInner {
            config,
            bus,
            registry,
            heuristics,
            rules,
            state,
            ui,
            snapshot: Arc::new(SignalSnapshot::new()),
            context: RwLock::new(Map::new()),
            sources: Mutex::new(Vec::new()),
            internal: Mutex::new(Vec::new()),
            last_inputs: Mutex::new(None),
            heuristics_running: AtomicBool::new(false),
            writing_ui: AtomicBool::new(false),
            ui_dirty: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });
        EngineInner::wire(&inner);

        Self { inner }
    }

    /// Configuration the engine was built from
    pub fn config(&self) -> &AdaptConfig {
        &self.inner.config
    }

    /// Current state snapshot
    pub fn get_state(&self) -> Arc<AdaptState> {
        self.inner.state.get_state()
    }

    /// Merge `patch` into the state and notify subscribers
    ///
    /// After [`Engine::destroy`] the patch is ignored and the current
    /// snapshot is returned.
    pub fn set_state(&self, patch: AdaptStatePatch) -> Arc<AdaptState> {
        if self.inner.is_destroyed() {
            debug!("set_state after destroy ignored");
            return self.get_state();
        }
        self.inner.state.set_state(patch)
    }

    /// Subscribe to state snapshots
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<AdaptState>) + Send + Sync + 'static,
    {
        self.inner.state.subscribe(f)
    }

    /// Listen on an engine bus topic
    pub fn on(&self, topic: impl AsRef<str>, listener: Listener<Value>) -> Subscription {
        self.inner.bus.on(topic, listener)
    }

    /// Listen on an engine bus topic with a closure
    pub fn on_fn<F>(&self, topic: impl AsRef<str>, f: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.bus.on_fn(topic, f)
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, topic: impl AsRef<str>, listener: &Listener<Value>) -> bool {
        self.inner.bus.off(topic, listener)
    }

    /// Publish on the engine bus
    pub fn emit(&self, topic: impl AsRef<str>, payload: &Value) {
        self.inner.bus.emit(topic, payload);
    }

    /// Register a signal and propagate it through the pipeline
    pub fn register_signal(
        &self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<SignalValue, EngineError> {
        if self.inner.is_destroyed() {
            debug!(signal = name, "register after destroy ignored");
            return Err(EngineError::Destroyed);
        }
        Ok(self.inner.registry.register(name, value)?)
    }

    /// Update a registered signal and propagate it through the pipeline
    pub fn update_signal(
        &self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<SignalValue, EngineError> {
        if self.inner.is_destroyed() {
            debug!(signal = name, "update after destroy ignored");
            return Err(EngineError::Destroyed);
        }
        Ok(self.inner.registry.update(name, value)?)
    }

    /// Context for a signal producer
    ///
    /// Emissions register their `type` as a signal on first sight and update
    /// it afterwards. When the config declares signal names, other types are
    /// dropped.
    pub fn signal_context(&self) -> SignalContext {
        let weak = Arc::downgrade(&self.inner);
        SignalContext::new(Arc::clone(&self.inner.snapshot), move |emitted| {
            if let Some(inner) = weak.upgrade() {
                inner.ingest(emitted);
            }
        })
    }

    /// Start `source` with a fresh context; it is stopped on destroy
    pub fn attach_source(&self, mut source: Box<dyn SignalSource>) -> Result<(), EngineError> {
        if self.inner.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        debug!(source = source.name(), "starting signal source");
        source.start(self.signal_context());
        self.inner.sources.lock().push(source);
        Ok(())
    }

    /// Add a heuristic after the existing ones
    pub fn register_heuristic(&self, heuristic: Arc<dyn Heuristic>) -> Result<(), EngineError> {
        if self.inner.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        Ok(self.inner.heuristics.register(heuristic)?)
    }

    /// Append a rule document; returns false when malformed or destroyed
    ///
    /// The rule takes part from the next evaluation on.
    pub fn add_rule(&self, doc: &Value) -> bool {
        if self.inner.is_destroyed() {
            debug!("add_rule after destroy ignored");
            return false;
        }
        let added = self.inner.rules.add_rule(doc);
        if added {
            *self.inner.last_inputs.lock() = None;
        }
        added
    }

    /// Remove every rule
    pub fn clear_rules(&self) {
        if self.inner.is_destroyed() {
            debug!("clear_rules after destroy ignored");
            return;
        }
        self.inner.rules.clear_rules();
        *self.inner.last_inputs.lock() = None;
    }

    /// Set a context entry visible to match conditions and re-evaluate
    pub fn set_context(&self, key: impl Into<String>, value: impl Into<Value>) {
        if self.inner.is_destroyed() {
            debug!("set_context after destroy ignored");
            return;
        }
        self.inner.context.write().insert(key.into(), value.into());
        self.inner.reevaluate();
    }

    /// Force a rule pass over the current inputs and return its result
    pub fn evaluate(&self) -> AdaptationResult {
        if !self.inner.is_destroyed() {
            *self.inner.last_inputs.lock() = None;
            self.inner.reevaluate();
        }
        self.inner.rules.last_result()
    }

    /// Signals registry
    pub fn signals(&self) -> &SignalsRegistry {
        &self.inner.registry
    }

    /// UI channel
    pub fn ui(&self) -> &UiChannel {
        &self.inner.ui
    }

    /// Rule processor
    pub fn rules(&self) -> &RuleProcessor {
        &self.inner.rules
    }

    /// Heuristics engine
    pub fn heuristics(&self) -> &HeuristicsEngine {
        &self.inner.heuristics
    }

    /// Latest emission per signal type
    pub fn snapshot(&self) -> &SignalSnapshot {
        &self.inner.snapshot
    }

    /// Result of the last rule pass that changed the output
    pub fn last_adaptation(&self) -> AdaptationResult {
        self.inner.rules.last_result()
    }

    /// Whether [`Engine::destroy`] has been called
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Tear the pipeline down
    ///
    /// Publishes `destroy`, stops attached sources, clears heuristics and
    /// detaches every listener. State and UI values stay readable. Calling it
    /// again does nothing.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        inner.bus.emit(Topic::Destroy, &Value::Null);

        let sources: Vec<_> = inner.sources.lock().drain(..).collect();
        for mut source in sources {
            debug!(source = source.name(), "stopping signal source");
            source.stop();
        }

        inner.heuristics.destroy();
        let internal: Vec<_> = inner.internal.lock().drain(..).collect();
        for sub in internal {
            sub.unsubscribe();
        }
        inner.state.clear_subscribers();
        inner.ui.clear_handlers();
        inner.bus.clear();
        debug!("engine destroyed");
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("profile", &self.inner.config.profile)
            .field("signals", &self.inner.registry.len())
            .field("rules", &self.inner.rules.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
