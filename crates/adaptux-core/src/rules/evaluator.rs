//! Condition matching and output collection
//!
//! Resolution is a recursive descent over [`Rule`]: a simple rule holds when
//! its condition holds, `and` needs every member, `or` needs one. Output is
//! collected only from rules that resolved true. An `and` group merges the
//! output of each member; an `or` group contributes its first matching member
//! only. Top-level outputs merge in order, later keys overwriting earlier ones.

use serde_json::{Map, Value};
use tracing::trace;

use super::model::{Condition, Rule, SignalCondition, MATCH_OPERATORS};
use crate::signals::SignalMap;
use crate::value::{strict_equals, to_number};

/// Flat key/value output of a rule pass
pub type AdaptationResult = Map<String, Value>;

/// Everything a condition can look at
///
/// Match conditions probe `signals`, then `state`, then `context`, then
/// `root`; the first map holding the key wins. Signal conditions only look
/// at `signals`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationState {
    /// Current signal values
    pub signals: Map<String, Value>,
    /// Pipeline state (profile, ui)
    pub state: Map<String, Value>,
    /// Host-supplied context
    pub context: Map<String, Value>,
    /// Top-level fallbacks
    pub root: Map<String, Value>,
}

impl EvaluationState {
    /// Empty evaluation state
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the signals with a registry snapshot
    pub fn with_signals(mut self, signals: &SignalMap) -> Self {
        self.signals = signals
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        self
    }

    /// Set one signal
    pub fn with_signal(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.signals.insert(name.into(), value.into());
        self
    }

    /// Set one state entry
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Set one context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replace the top-level fallbacks
    pub fn with_root(mut self, root: Map<String, Value>) -> Self {
        self.root = root;
        self
    }

    /// First value found for `key`
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.signals
            .get(key)
            .or_else(|| self.state.get(key))
            .or_else(|| self.context.get(key))
            .or_else(|| self.root.get(key))
    }
}

fn signal_condition_holds(cond: &SignalCondition, eval: &EvaluationState) -> bool {
    let Some(actual) = eval.signals.get(&cond.signal) else {
        return false;
    };
    match cond.op {
        Some(op) => op.compare(Some(actual), cond.value.as_ref()),
        None => false,
    }
}

fn entry_holds(actual: Option<&Value>, expected: &Value) -> bool {
    if let Value::Object(ops) = expected {
        let present: Vec<_> = MATCH_OPERATORS
            .iter()
            .filter_map(|op| ops.get(*op).map(|bound| (*op, bound)))
            .collect();

        if !present.is_empty() {
            let actual = to_number(actual);
            return present.into_iter().all(|(op, bound)| {
                let bound = to_number(Some(bound));
                match op {
                    "$gt" => actual > bound,
                    "$lt" => actual < bound,
                    "$gte" => actual >= bound,
                    _ => actual <= bound,
                }
            });
        }
    }
    strict_equals(actual, expected)
}

/// Whether a condition holds
pub fn condition_holds(condition: &Condition, eval: &EvaluationState) -> bool {
    match condition {
        Condition::Signal(cond) => signal_condition_holds(cond, eval),
        Condition::Match(entries) => entries
            .iter()
            .all(|(key, expected)| entry_holds(eval.lookup(key), expected)),
    }
}

/// Resolve a rule to a boolean
pub fn resolve(rule: &Rule, eval: &EvaluationState) -> bool {
    match rule {
        Rule::Simple(simple) => condition_holds(&simple.when, eval),
        Rule::And(members) => members.iter().all(|m| resolve(m, eval)),
        Rule::Or(members) => members.iter().any(|m| resolve(m, eval)),
        Rule::Invalid(_) => false,
    }
}

/// Merge the output of a rule that resolved true into `out`
fn collect_into(rule: &Rule, eval: &EvaluationState, out: &mut AdaptationResult) {
    match rule {
        Rule::Simple(simple) => {
            out.extend(simple.apply.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Rule::And(members) => {
            for member in members.iter().filter(|m| resolve(m, eval)) {
                collect_into(member, eval, out);
            }
        }
        Rule::Or(members) => {
            if let Some(first) = members.iter().find(|m| resolve(m, eval)) {
                collect_into(first, eval, out);
            }
        }
        Rule::Invalid(_) => {}
    }
}

/// Output of a single rule, empty when it does not match
pub fn collect(rule: &Rule, eval: &EvaluationState) -> AdaptationResult {
    let mut out = AdaptationResult::new();
    if resolve(rule, eval) {
        collect_into(rule, eval, &mut out);
    }
    out
}

/// Combined output of `rules` in order
pub fn evaluate_rules(rules: &[Rule], eval: &EvaluationState) -> AdaptationResult {
    let mut result = AdaptationResult::new();
    for (index, rule) in rules.iter().enumerate() {
        let matched = resolve(rule, eval);
        trace!(index, kind = rule.kind(), matched, "rule resolved");
        if matched {
            collect_into(rule, eval, &mut result);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(doc: Value) -> Rule {
        Rule::from_value(&doc)
    }

    fn lt(signal: &str, value: f64, apply: Value) -> Value {
        json!({"when": {"signal": signal, "op": "<", "value": value}, "apply": {"ui": apply}})
    }

    fn gt(signal: &str, value: f64, apply: Value) -> Value {
        json!({"when": {"signal": signal, "op": ">", "value": value}, "apply": {"ui": apply}})
    }

    #[test]
    fn test_lookup_order() {
        let eval = EvaluationState::new()
            .with_signal("k", "signal")
            .with_state("k", "state")
            .with_state("s", "state")
            .with_context("c", "context")
            .with_context("s", "context")
            .with_root(json!({"r": "root", "c": "root"}).as_object().cloned().unwrap());

        assert_eq!(eval.lookup("k"), Some(&json!("signal")));
        assert_eq!(eval.lookup("s"), Some(&json!("state")));
        assert_eq!(eval.lookup("c"), Some(&json!("context")));
        assert_eq!(eval.lookup("r"), Some(&json!("root")));
        assert_eq!(eval.lookup("missing"), None);
    }

    #[test]
    fn test_signal_condition_ignores_other_maps() {
        let eval = EvaluationState::new().with_state("focus", 0.1);
        let r = rule(lt("focus", 0.4, json!({"highlight": true})));
        assert!(!resolve(&r, &eval));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let eval = EvaluationState::new().with_signal("focus", 0.1);
        let r = rule(json!({
            "when": {"signal": "focus", "op": "≈", "value": 0.1},
            "apply": {"x": 1}
        }));
        assert!(!resolve(&r, &eval));
    }

    #[test]
    fn test_match_operators_and_equality() {
        let eval = EvaluationState::new()
            .with_signal("focus", 0.6)
            .with_signal("idle", true)
            .with_state("profile", "default");

        let holds = |when: Value| {
            let Value::Object(when) = when else {
                unreachable!()
            };
            condition_holds(&Condition::Match(when), &eval)
        };

        assert!(holds(json!({"focus": {"$gt": 0.5}})));
        assert!(holds(json!({"focus": {"$gte": 0.6, "$lt": 1}})));
        assert!(!holds(json!({"focus": {"$gt": 0.5, "$lt": 0.55}})));
        assert!(holds(json!({"idle": true, "profile": "default"})));
        assert!(!holds(json!({"idle": "true"})));
        assert!(!holds(json!({"missing": {"$lt": 1}})));
        assert!(!holds(json!({"missing": null})));
        assert!(!holds(json!({"focus": {"eq": 0.6}})));
        assert!(holds(json!({})));
    }

    #[test]
    fn test_non_numeric_comparison_is_false() {
        let eval = EvaluationState::new().with_signal("mode", "reading");
        assert!(!resolve(&rule(gt("mode", 0.0, json!({"x": 1}))), &eval));
        assert!(!resolve(&rule(lt("mode", 0.0, json!({"x": 1}))), &eval));
    }

    #[test]
    fn test_and_group_merges_every_member() {
        let r = rule(json!({"and": [
            lt("focus", 0.4, json!({"highlight": true})),
            gt("attention", 0.6, json!({"emphasize": true}))
        ]}));

        let miss = EvaluationState::new()
            .with_signal("focus", 0.3)
            .with_signal("attention", 0.5);
        assert_eq!(collect(&r, &miss), AdaptationResult::new());

        let hit = EvaluationState::new()
            .with_signal("focus", 0.3)
            .with_signal("attention", 0.7);
        assert_eq!(
            Value::Object(collect(&r, &hit)),
            json!({"highlight": true, "emphasize": true})
        );
    }

    #[test]
    fn test_or_group_takes_first_match_only() {
        let r = rule(json!({"or": [
            gt("missing", 0.0, json!({"from": "absent"})),
            lt("focus", 0.4, json!({"from": "a", "a": 1})),
            lt("focus", 0.9, json!({"from": "b", "b": 1}))
        ]}));

        let eval = EvaluationState::new().with_signal("focus", 0.1);
        assert_eq!(
            Value::Object(collect(&r, &eval)),
            json!({"from": "a", "a": 1})
        );
    }

    #[test]
    fn test_nested_groups() {
        let r = rule(json!({"and": [
            {"or": [
                lt("focus", 0.2, json!({"tier": "low"})),
                lt("focus", 0.5, json!({"tier": "mid"}))
            ]},
            {"when": {"idle": false}, "apply": {"active": true}}
        ]}));

        let eval = EvaluationState::new()
            .with_signal("focus", 0.3)
            .with_signal("idle", false);
        assert_eq!(
            Value::Object(collect(&r, &eval)),
            json!({"tier": "mid", "active": true})
        );
    }

    #[test]
    fn test_later_rules_overwrite_earlier_keys() {
        let rules = vec![
            rule(json!({"when": {"idle": true}, "apply": {"color": "blue", "calm": true}})),
            rule(json!({"when": {"idle": true}, "apply": {"color": "grey"}})),
        ];
        let eval = EvaluationState::new().with_signal("idle", true);

        assert_eq!(
            Value::Object(evaluate_rules(&rules, &eval)),
            json!({"color": "grey", "calm": true})
        );
    }

    #[test]
    fn test_invalid_rules_do_not_break_the_pass() {
        let rules = vec![
            rule(json!(null)),
            rule(json!({"when": {"idle": true}})),
            rule(json!({"when": {"idle": true}, "apply": {"ok": 1}})),
        ];
        let eval = EvaluationState::new().with_signal("idle", true);

        assert_eq!(Value::Object(evaluate_rules(&rules, &eval)), json!({"ok": 1}));
    }

    #[test]
    fn test_empty_groups() {
        let eval = EvaluationState::new();
        assert!(resolve(&rule(json!({"and": []})), &eval));
        assert!(!resolve(&rule(json!({"or": []})), &eval));
        assert!(collect(&rule(json!({"and": []})), &eval).is_empty());
    }
}
