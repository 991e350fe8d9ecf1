//! Rule processor with change-detected `adaptation` output

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use super::evaluator::{evaluate_rules, AdaptationResult, EvaluationState};
use super::model::Rule;
use crate::bus::{EventBus, Topic};
use crate::value::same_value;

/// Receiver of changed adaptation results
pub trait AdaptationSink: Send + Sync {
    /// Called once per pass whose result differs from the previous one
    fn emit_adaptation(&self, result: &AdaptationResult);
}

impl AdaptationSink for EventBus<Value> {
    fn emit_adaptation(&self, result: &AdaptationResult) {
        self.emit(Topic::Adaptation, &Value::Object(result.clone()));
    }
}

/// Evaluates the current rule list and remembers the last result
///
/// A bound sink is only called when a pass produces a result that differs by
/// value from the previous pass.
#[derive(Default)]
pub struct RuleProcessor {
    rules: RwLock<Vec<Rule>>,
    last_result: Mutex<AdaptationResult>,
    sink: RwLock<Option<Arc<dyn AdaptationSink>>>,
}

impl RuleProcessor {
    /// Processor over already-typed rules; invalid ones are dropped
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let rules: Vec<Rule> = rules
            .into_iter()
            .filter(|rule| {
                let keep = rule.is_valid();
                if !keep {
                    warn!(?rule, "dropping malformed rule");
                }
                keep
            })
            .collect();
        debug!(count = rules.len(), "rule processor ready");

        Self {
            rules: RwLock::new(rules),
            ..Self::default()
        }
    }

    /// Processor over raw rule documents
    pub fn from_values<'a>(docs: impl IntoIterator<Item = &'a Value>) -> Self {
        Self::new(docs.into_iter().map(Rule::from_value))
    }

    /// Route changed results to `sink`
    pub fn bind_engine(&self, sink: Arc<dyn AdaptationSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Evaluate every rule and return the merged output
    pub fn evaluate(&self, eval: &EvaluationState) -> AdaptationResult {
        let result = {
            let rules = self.rules.read();
            evaluate_rules(&rules, eval)
        };

        let changed = {
            let mut last = self.last_result.lock();
            let changed = !same_value(
                &Value::Object(last.clone()),
                &Value::Object(result.clone()),
            );
            if changed {
                *last = result.clone();
            }
            changed
        };

        if changed {
            debug!(keys = result.len(), "adaptation changed");
            let sink = self.sink.read().clone();
            if let Some(sink) = sink {
                sink.emit_adaptation(&result);
            }
        }
        result
    }

    /// Result of the last pass that changed the output
    pub fn last_result(&self) -> AdaptationResult {
        self.last_result.lock().clone()
    }

    /// Append a rule document; returns false when it is malformed
    pub fn add_rule(&self, doc: &Value) -> bool {
        self.add(Rule::from_value(doc))
    }

    /// Append a typed rule; returns false when it is [`Rule::Invalid`]
    pub fn add(&self, rule: Rule) -> bool {
        if !rule.is_valid() {
            warn!(?rule, "ignoring malformed rule");
            return false;
        }
        self.rules.write().push(rule);
        true
    }

    /// Remove every rule and forget the last result
    pub fn clear_rules(&self) {
        self.rules.write().clear();
        self.last_result.lock().clear();
    }

    /// Copy of the current rule list
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.read().clone()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl fmt::Debug for RuleProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleProcessor")
            .field("rules", &self.len())
            .field("last_result", &*self.last_result.lock())
            .field("bound", &self.sink.read().is_some())
            .finish()
    }
}
