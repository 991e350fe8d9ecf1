//! Engine wiring: feedback-loop termination, signal sources, teardown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adaptux_config::AdaptConfig;
use adaptux_core::{
    AdaptStatePatch, Engine, EngineError, FnHeuristic, HeuristicError, HeuristicMemory,
    HeuristicsState, SignalContext, SignalSource, SignalValue, Topic,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn record(engine: &Engine, topic: Topic) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = engine.on_fn(topic, move |payload| sink.lock().push(payload.clone()));
    seen
}

#[derive(Default)]
struct ScriptedSource {
    emissions: Vec<Value>,
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    ctx: Option<SignalContext>,
}

impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn start(&mut self, ctx: SignalContext) {
        self.started.fetch_add(1, Ordering::SeqCst);
        for emission in self.emissions.drain(..) {
            ctx.emit(emission);
        }
        self.ctx = Some(ctx);
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        self.ctx = None;
    }
}

#[test]
fn test_self_reinforcing_rule_reaches_fixed_point() {
    // The output feeds its own condition; dedup settles it after one round
    let engine = Engine::new(
        AdaptConfig::new()
            .with_rule(json!({"when": {"idle": true}, "apply": {"calm": true}}))
            .with_rule(json!({"when": {"calm": true}, "apply": {"dim": 0.5}})),
    );
    let ui_updates = record(&engine, Topic::UiUpdate);

    engine.register_signal("idle", true).unwrap();

    assert_eq!(
        Value::Object(engine.ui().get_all()),
        json!({"calm": true, "dim": 0.5})
    );
    // `dim` comes from the second pass, once `calm` is in the state
    let ui_updates = ui_updates.lock();
    assert_eq!(ui_updates.len(), 2);
    assert!(ui_updates.contains(&json!({"calm": true})));
    assert!(ui_updates.contains(&json!({"dim": 0.5})));
}

#[test]
fn test_wide_rule_output_still_reaches_fixed_point() {
    let apply: serde_json::Map<String, Value> =
        (0..40).map(|i| (format!("k{i:02}"), json!(true))).collect();
    let engine = Engine::new(
        AdaptConfig::new()
            .with_rule(json!({"when": {"page": "x"}, "apply": apply}))
            .with_rule(json!({"when": {"k39": true}, "apply": {"derived": true}})),
    );

    engine.set_context("page", "x");

    assert_eq!(engine.ui().get("k39"), Some(json!(true)));
    assert_eq!(engine.ui().get("derived"), Some(json!(true)));
    assert_eq!(engine.get_state().ui.len(), 41);
    assert_eq!(engine.last_adaptation().get("derived"), Some(&json!(true)));
}

#[test]
fn test_oscillating_rules_terminate() {
    let engine = Engine::new(
        AdaptConfig::new()
            .with_max_propagation_depth(10)
            .with_rule(json!({"when": {"armed": true}, "apply": {"phase": "on"}}))
            .with_rule(json!({"when": {"phase": "on"}, "apply": {"phase": "off"}})),
    );
    let adaptations = record(&engine, Topic::Adaptation);

    engine.register_signal("armed", true).unwrap();
    engine.update_signal("armed", false).unwrap();

    let phase = engine.get_state().ui.get("phase").cloned();
    assert!(matches!(phase.as_ref().and_then(Value::as_str), Some("on" | "off")));
    // Every adaptation came from a bounded stack of re-evaluations
    assert!(!adaptations.lock().is_empty());
    assert!(adaptations.lock().len() < 200);
}

#[test]
fn test_state_subscribers_fire_on_every_set_state() {
    let engine = Engine::new(AdaptConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _sub = engine.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.set_state(AdaptStatePatch::new());
    engine.set_state(AdaptStatePatch::new());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    engine.set_state(AdaptStatePatch::new().with_profile("low-vision"));
    assert_eq!(engine.get_state().profile, "low-vision");
}

#[test]
fn test_signal_events_are_republished() {
    let engine = Engine::new(AdaptConfig::new());
    let registered = record(&engine, Topic::SignalRegister);
    let updated = record(&engine, Topic::SignalUpdate);
    let heuristic_batches = record(&engine, Topic::HeuristicUpdate);

    engine.register_signal("idle", false).unwrap();
    engine.update_signal("idle", true).unwrap();

    let registered = registered.lock();
    assert_eq!(registered.last(), Some(&json!({"name": "idle", "value": false})));
    assert!(registered
        .iter()
        .any(|e| e["name"] == json!("interactionDensity")));
    assert!(updated
        .lock()
        .contains(&json!({"name": "idle", "value": true})));
    assert!(!heuristic_batches.lock().is_empty());
}

#[test]
fn test_context_emissions_register_then_update() {
    let engine = Engine::new(AdaptConfig::new().with_rule(json!({
        "when": {"scroll": {"$gt": 500}},
        "apply": {"stickyHeader": true}
    })));
    let ctx = engine.signal_context();

    ctx.emit(json!({"type": "scroll", "position": 120, "velocity": 0.4, "direction": "down"}));
    assert_eq!(engine.signals().get("scroll"), Some(SignalValue::Number(120.0)));
    assert_eq!(engine.ui().get("stickyHeader"), None);

    ctx.emit(json!({"type": "scroll", "position": 840, "velocity": 1.7, "direction": "down"}));
    assert_eq!(engine.signals().get("scroll"), Some(SignalValue::Number(840.0)));
    assert_eq!(engine.ui().get("stickyHeader"), Some(json!(true)));

    let snapshot = engine.snapshot().get();
    assert_eq!(snapshot["scroll"]["direction"], json!("down"));
    assert_eq!(snapshot["scroll"]["position"], json!(840));
}

#[test]
fn test_context_entries_are_rule_inputs() {
    let engine = Engine::new(
        AdaptConfig::new()
            .with_rule(json!({"when": {"locale": "de"}, "apply": {"hyphenate": true}}))
            .with_rule(json!({"when": {"idle": true}, "apply": {"calm": true}})),
    );
    engine.register_signal("idle", true).unwrap();

    engine.set_context("locale", "de");
    // Signals shadow context entries with the same key
    engine.set_context("idle", false);

    assert_eq!(engine.ui().get("hyphenate"), Some(json!(true)));
    assert_eq!(engine.ui().get("calm"), Some(json!(true)));
}

#[test]
fn test_undeclared_signal_types_are_dropped() {
    let engine = Engine::new(AdaptConfig::new().with_signals(["idle"]));
    let ctx = engine.signal_context();

    ctx.emit(json!({"type": "idle", "value": true}));
    ctx.emit(json!({"type": "scroll", "position": 10}));

    assert!(engine.signals().contains("idle"));
    assert!(!engine.signals().contains("scroll"));
    // The snapshot still records every typed emission
    assert!(engine.snapshot().get().contains_key("scroll"));
}

#[test]
fn test_invalid_emission_value_reports_error() {
    let engine = Engine::new(AdaptConfig::new());
    let errors = record(&engine, Topic::SignalError);

    engine
        .signal_context()
        .emit(json!({"type": "gaze", "value": {"x": 1, "y": 2}}));

    assert!(!engine.signals().contains("gaze"));
    assert_eq!(errors.lock()[0]["type"], json!("invalid-type"));
}

#[test]
fn test_custom_heuristic_feeds_rules() {
    let engine = Engine::new(AdaptConfig::new().with_rule(json!({
        "when": {"fatigue": "high"},
        "apply": {"breakReminder": true}
    })));
    let fatigue = FnHeuristic::new("fatigue", |state: &HeuristicsState, _: &HeuristicMemory| {
        let idle = state.signals.get("idle").is_some_and(SignalValue::is_active);
        Ok(SignalValue::from(if idle { "high" } else { "low" }))
    });
    engine.register_heuristic(Arc::new(fatigue)).unwrap();

    engine.register_signal("idle", false).unwrap();
    assert_eq!(engine.signals().get("fatigue"), Some(SignalValue::from("low")));

    engine.update_signal("idle", true).unwrap();
    assert_eq!(engine.signals().get("fatigue"), Some(SignalValue::from("high")));
    assert_eq!(engine.ui().get("breakReminder"), Some(json!(true)));

    let duplicate = FnHeuristic::new("fatigue", |_: &HeuristicsState, _: &HeuristicMemory| {
        Ok(SignalValue::Bool(false))
    });
    assert_eq!(
        engine.register_heuristic(Arc::new(duplicate)),
        Err(EngineError::Heuristic(HeuristicError::Duplicate("fatigue".into())))
    );
}

#[test]
fn test_add_and_clear_rules_at_runtime() {
    let engine = Engine::new(AdaptConfig::new());
    engine.register_signal("idle", true).unwrap();

    assert!(engine.add_rule(&json!({"when": {"idle": true}, "apply": {"ui": {"calm": true}}})));
    assert!(!engine.add_rule(&json!({"when": {"idle": true}})));
    assert_eq!(Value::Object(engine.evaluate()), json!({"calm": true}));

    engine.clear_rules();
    assert!(engine.rules().is_empty());
    assert!(engine.evaluate().is_empty());
}

#[test]
fn test_sources_start_and_stop_with_engine() {
    let engine = Engine::new(AdaptConfig::new());
    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));

    let source = ScriptedSource {
        emissions: vec![json!({"type": "idle", "value": true})],
        started: Arc::clone(&started),
        stopped: Arc::clone(&stopped),
        ..ScriptedSource::default()
    };
    engine.attach_source(Box::new(source)).unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(engine.signals().get("idle"), Some(SignalValue::Bool(true)));

    engine.destroy();
    engine.destroy();
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.attach_source(Box::new(ScriptedSource::default())),
        Err(EngineError::Destroyed)
    );
}

#[test]
fn test_destroy_freezes_pipeline() {
    let engine = Engine::new(AdaptConfig::new().with_rule(json!({
        "when": {"idle": true},
        "apply": {"calm": true}
    })));
    let ctx = engine.signal_context();
    engine.register_signal("idle", false).unwrap();
    let destroyed = record(&engine, Topic::Destroy);

    engine.destroy();
    let state_before = engine.get_state();

    ctx.emit(json!({"type": "idle", "value": true}));
    engine.set_context("page", "home");
    engine.clear_rules();
    let after = engine.set_state(AdaptStatePatch::new().with_profile("other"));

    assert_eq!(destroyed.lock().len(), 1);
    assert!(engine.is_destroyed());
    assert_eq!(engine.signals().get("idle"), Some(SignalValue::Bool(false)));
    assert_eq!(engine.rules().len(), 1);
    assert_eq!(after, state_before);
    assert_eq!(engine.get_state().profile, "default");
    assert_eq!(engine.update_signal("idle", true), Err(EngineError::Destroyed));
}
