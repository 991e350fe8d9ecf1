//! # adaptux core
//!
//! Reactive decision pipeline for adaptive user experiences.
//!
//! Low-level behavioral signals (idle state, scroll position, focus) are
//! stored in a [`SignalsRegistry`], smoothed into derived signals by the
//! [`HeuristicsEngine`], matched against a declarative rule tree by the
//! [`RuleProcessor`], and the resulting adaptations are written into a
//! deduplicating [`UiChannel`] that presentation code reads from.
//!
//! Everything runs synchronously on the caller's stack. The [`Engine`] wires
//! the components into one isolated pipeline; several engines can coexist in
//! one process.
//!
//! ## Quick Start
//!
//! ```rust
//! use adaptux_config::AdaptConfig;
//! use adaptux_core::{Engine, Topic};
//! use serde_json::json;
//!
//! let engine = Engine::new(AdaptConfig::new().with_rule(json!({
//!     "and": [
//!         {"when": {"signal": "focus", "op": "<", "value": 0.4}, "apply": {"ui": {"highlight": true}}},
//!         {"when": {"signal": "attention", "op": ">", "value": 0.6}, "apply": {"ui": {"emphasize": true}}}
//!     ]
//! })));
//!
//! let _sub = engine.on_fn(Topic::Adaptation, |result| println!("adaptation: {result}"));
//!
//! engine.register_signal("focus", 0.3).unwrap();
//! engine.register_signal("attention", 0.7).unwrap();
//!
//! assert_eq!(engine.ui().get("emphasize"), Some(json!(true)));
//! ```
//!
//! ## Modules
//!
//! - [`bus`] - named-topic publish/subscribe
//! - [`signals`] - signal values and the registry
//! - [`heuristics`] - derived signals and their memory
//! - [`rules`] - rule model, condition evaluation, processor
//! - [`state`] - snapshot store
//! - [`ui_channel`] - UI output sink
//! - [`context`] - producer interface
//! - [`engine`] - composition root

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod context;
pub mod engine;
pub mod error;
pub mod heuristics;
pub mod rules;
pub mod signals;
pub mod state;
pub mod subscription;
pub mod ui_channel;
pub mod value;

pub use bus::{EventBus, Listener, Topic};
pub use context::{SignalContext, SignalSnapshot, SignalSource};
pub use engine::Engine;
pub use error::{EngineError, HeuristicError, SignalError, SignalErrorKind};
pub use heuristics::{
    FnHeuristic, Heuristic, HeuristicMemory, HeuristicsEngine, HeuristicsState,
};
pub use rules::{AdaptationResult, AdaptationSink, EvaluationState, Rule, RuleProcessor};
pub use signals::{SignalEvent, SignalMap, SignalRecord, SignalValue, SignalsRegistry};
pub use state::{AdaptState, AdaptStatePatch, Mergeable, StateContainer};
pub use subscription::Subscription;
pub use ui_channel::UiChannel;
