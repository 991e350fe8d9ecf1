//! Derived, smoothed signals
//!
//! A heuristic is a pure function of the latest signal snapshot and the
//! engine-owned [`HeuristicMemory`] (the last value each heuristic produced).
//! The [`HeuristicsEngine`] runs every heuristic in registration order, keeps
//! the memory, and feeds changed values back into the [`SignalsRegistry`] as
//! ordinary signals.
//!
//! Built-ins, all smoothed exponentially and clamped to `[0, 1]`:
//!
//! | Name | Input | Weight of new sample |
//! |------|-------|----------------------|
//! | `focusStability` | `focus` | 0.3 |
//! | `idlePattern` | `idle` | 0.2 |
//! | `scrollAggression` | `scroll` (delta / 100, capped at 1) | 0.3 |
//! | `interactionDensity` | share of active signals | 0.4 |
//!
//! A missing input yields the neutral value `0.5`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::bus::{EventBus, Topic};
use crate::error::HeuristicError;
use crate::signals::{SignalMap, SignalValue, SignalsRegistry};

/// Signal key that never counts towards interaction density
pub const INTERNAL_HEURISTICS_KEY: &str = "_internalHeuristics";

/// Neutral value for a heuristic without input
pub const NEUTRAL: f64 = 0.5;

/// Minimum numeric movement that counts as a change
pub const CHANGE_THRESHOLD: f64 = 0.01;

/// Snapshot handed to every heuristic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeuristicsState {
    /// Current signal values, heuristics included
    pub signals: SignalMap,
    /// Active profile, if any
    pub profile: Option<String>,
}

impl HeuristicsState {
    /// Snapshot over `signals` without a profile
    pub fn new(signals: SignalMap) -> Self {
        Self {
            signals,
            profile: None,
        }
    }

    /// Attach the active profile
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Last value produced by each heuristic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeuristicMemory {
    values: BTreeMap<String, SignalValue>,
}

impl HeuristicMemory {
    /// Empty memory (a cold start)
    pub fn new() -> Self {
        Self::default()
    }

    /// Previous value of `name`
    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.values.get(name)
    }

    /// Previous value of `name` as a number
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(SignalValue::as_number)
    }

    /// Store a value
    pub fn insert(&mut self, name: impl Into<String>, value: SignalValue) {
        self.values.insert(name.into(), value);
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Whether nothing has been remembered yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of every remembered value
    pub fn to_map(&self) -> SignalMap {
        self.values.clone()
    }
}

/// A derived signal
pub trait Heuristic: Send + Sync {
    /// Name of the signal this heuristic writes
    fn name(&self) -> &str;

    /// Compute the next value
    ///
    /// An `Err` skips this heuristic for the current pass only.
    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError>;
}

/// Closure-backed [`Heuristic`]
pub struct FnHeuristic<F> {
    name: String,
    f: F,
}

impl<F> FnHeuristic<F>
where
    F: Fn(&HeuristicsState, &HeuristicMemory) -> Result<SignalValue, HeuristicError>
        + Send
        + Sync,
{
    /// Wrap `f` under `name`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Heuristic for FnHeuristic<F>
where
    F: Fn(&HeuristicsState, &HeuristicMemory) -> Result<SignalValue, HeuristicError>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError> {
        (self.f)(state, memory)
    }
}

impl<F> fmt::Debug for FnHeuristic<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHeuristic").field("name", &self.name).finish()
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        NEUTRAL
    } else {
        x.clamp(0.0, 1.0)
    }
}

fn smooth(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    let prev = previous.filter(|p| !p.is_nan()).unwrap_or(NEUTRAL);
    clamp_unit(prev * (1.0 - alpha) + sample * alpha)
}

/// Variability of `focus` between passes
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusStability;

impl FocusStability {
    /// Signal name
    pub const NAME: &'static str = "focusStability";
}

impl Heuristic for FocusStability {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError> {
        let Some(focus) = state.signals.get("focus") else {
            return Ok(SignalValue::Number(NEUTRAL));
        };
        let current = focus.as_number();
        let previous = memory.number(Self::NAME);
        let variability = (current - previous.unwrap_or(current)).abs();
        Ok(SignalValue::Number(smooth(previous, variability, 0.3)))
    }
}

/// Burstiness of `idle` transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePattern;

impl IdlePattern {
    /// Signal name
    pub const NAME: &'static str = "idlePattern";
}

impl Heuristic for IdlePattern {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError> {
        let Some(idle) = state.signals.get("idle") else {
            return Ok(SignalValue::Number(NEUTRAL));
        };
        let current = idle.as_number();
        let previous = memory.number(Self::NAME);
        let transition = if current != previous.unwrap_or(current) {
            1.0
        } else {
            0.0
        };
        Ok(SignalValue::Number(smooth(previous, transition, 0.2)))
    }
}

/// Intensity of `scroll` movement
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollAggression;

impl ScrollAggression {
    /// Signal name
    pub const NAME: &'static str = "scrollAggression";
}

impl Heuristic for ScrollAggression {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError> {
        let Some(scroll) = state.signals.get("scroll") else {
            return Ok(SignalValue::Number(NEUTRAL));
        };
        let current = scroll.as_number();
        let previous = memory.number(Self::NAME);
        let delta = (current - previous.unwrap_or(current)).abs();
        let normalized = (delta / 100.0).min(1.0);
        Ok(SignalValue::Number(smooth(previous, normalized, 0.3)))
    }
}

/// Share of signals currently carrying activity
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionDensity;

impl InteractionDensity {
    /// Signal name
    pub const NAME: &'static str = "interactionDensity";
}

impl Heuristic for InteractionDensity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        state: &HeuristicsState,
        memory: &HeuristicMemory,
    ) -> Result<SignalValue, HeuristicError> {
        let (active, total) = state
            .signals
            .iter()
            .filter(|(name, _)| name.as_str() != INTERNAL_HEURISTICS_KEY)
            .fold((0usize, 0usize), |(active, total), (_, value)| {
                (active + usize::from(value.is_active()), total + 1)
            });

        let density = if total > 0 {
            active as f64 / total as f64
        } else {
            NEUTRAL
        };
        Ok(SignalValue::Number(smooth(
            memory.number(Self::NAME),
            density,
            0.4,
        )))
    }
}

/// The four built-in heuristics in evaluation order
pub fn builtin_heuristics() -> Vec<Arc<dyn Heuristic>> {
    vec![
        Arc::new(FocusStability),
        Arc::new(IdlePattern),
        Arc::new(ScrollAggression),
        Arc::new(InteractionDensity),
    ]
}

fn has_changed(previous: Option<&SignalValue>, next: &SignalValue) -> bool {
    match (previous, next) {
        (None, _) => true,
        (Some(SignalValue::Number(a)), SignalValue::Number(b)) => (b - a).abs() > CHANGE_THRESHOLD,
        (Some(prev), next) => prev != next,
    }
}

/// Runs heuristics and writes their results back as signals
pub struct HeuristicsEngine {
    heuristics: RwLock<Vec<Arc<dyn Heuristic>>>,
    memory: Mutex<HeuristicMemory>,
    registry: Arc<SignalsRegistry>,
    bus: EventBus<Value>,
}

impl HeuristicsEngine {
    /// Engine with the built-in heuristics, writing into `registry` and
    /// publishing `heuristic:update` on `bus`
    pub fn new(registry: Arc<SignalsRegistry>, bus: EventBus<Value>) -> Self {
        Self {
            heuristics: RwLock::new(builtin_heuristics()),
            memory: Mutex::new(HeuristicMemory::new()),
            registry,
            bus,
        }
    }

    /// Add a heuristic after the existing ones
    pub fn register(&self, heuristic: Arc<dyn Heuristic>) -> Result<(), HeuristicError> {
        let name = heuristic.name().to_string();
        if name.trim().is_empty() {
            return Err(HeuristicError::InvalidName);
        }

        let mut heuristics = self.heuristics.write();
        if heuristics.iter().any(|h| h.name() == name) {
            return Err(HeuristicError::Duplicate(name));
        }
        heuristics.push(heuristic);
        debug!(heuristic = %name, "registered heuristic");
        Ok(())
    }

    /// Run one pass and return the values that changed
    ///
    /// Each changed value is remembered, then registered (first time) or
    /// updated in the signals registry. A non-empty batch is published as
    /// `{"heuristics": {...}, "timestamp": <ms>}` on `heuristic:update`.
    pub fn evaluate(&self, state: &HeuristicsState) -> SignalMap {
        let heuristics = self.heuristics.read().clone();
        let mut changed = SignalMap::new();

        for heuristic in heuristics {
            let name = heuristic.name();
            let memory = self.memory.lock().clone();

            let next = match heuristic.evaluate(state, &memory) {
                Ok(value) => value,
                Err(err) => {
                    warn!(heuristic = %name, error = %err, "heuristic evaluation failed; skipping");
                    continue;
                }
            };

            if !has_changed(memory.get(name), &next) {
                continue;
            }
            self.memory.lock().insert(name, next.clone());
            changed.insert(name.to_string(), next.clone());

            let written = if self.registry.contains(name) {
                self.registry.update(name, next)
            } else {
                self.registry.register(name, next)
            };
            if let Err(err) = written {
                debug!(heuristic = %name, error = %err, "heuristic value not stored as signal");
            }
        }

        if !changed.is_empty() {
            let batch: Map<String, Value> = changed
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            self.bus.emit(
                Topic::HeuristicUpdate,
                &json!({
                    "heuristics": batch,
                    "timestamp": Utc::now().timestamp_millis(),
                }),
            );
        }
        changed
    }

    /// Last value of every heuristic that has produced one
    pub fn values(&self) -> SignalMap {
        self.memory.lock().to_map()
    }

    /// Registered heuristic names in evaluation order
    pub fn names(&self) -> Vec<String> {
        self.heuristics
            .read()
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Drop every heuristic and all memory
    ///
    /// Evaluating afterwards is allowed and starts cold with no heuristics.
    pub fn destroy(&self) {
        self.heuristics.write().clear();
        self.memory.lock().clear();
    }
}

impl fmt::Debug for HeuristicsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeuristicsEngine")
            .field("heuristics", &self.names())
            .field("memory", &*self.memory.lock())
            .finish()
    }
}
