//! Typed rule tree
//!
//! Rule documents arrive as loosely shaped JSON. They are classified once,
//! at construction, into [`Rule`]; anything that is not a simple rule, an
//! `and` group or an `or` group becomes [`Rule::Invalid`] and never matches.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::value::{strict_equals, to_number};

/// Comparison operator of a legacy `{signal, op, value}` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
}

impl CompareOp {
    /// Parse an operator token
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Gte),
            "<=" => Some(Self::Lte),
            "===" => Some(Self::StrictEq),
            "!==" => Some(Self::StrictNe),
            _ => None,
        }
    }

    /// Operator token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
        }
    }

    /// Compare `actual` against `expected`
    ///
    /// Ordering operators coerce both sides to numbers, so anything without a
    /// numeric reading compares false. Equality operators never coerce.
    pub fn compare(&self, actual: Option<&Value>, expected: Option<&Value>) -> bool {
        let expected_num = || to_number(expected);
        match self {
            Self::Gt => to_number(actual) > expected_num(),
            Self::Lt => to_number(actual) < expected_num(),
            Self::Gte => to_number(actual) >= expected_num(),
            Self::Lte => to_number(actual) <= expected_num(),
            Self::StrictEq => expected.is_some_and(|e| strict_equals(actual, e)),
            Self::StrictNe => !expected.is_some_and(|e| strict_equals(actual, e)),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator keys accepted inside a match condition value
pub const MATCH_OPERATORS: [&str; 4] = ["$gt", "$lt", "$gte", "$lte"];

/// `{signal, op, value}` checked against the signals map only
#[derive(Debug, Clone, PartialEq)]
pub struct SignalCondition {
    /// Signal name
    pub signal: String,
    /// Operator; an unrecognized token never matches
    pub op: Option<CompareOp>,
    /// Right-hand side, absent when the document omits it
    pub value: Option<Value>,
}

/// The `when` part of a simple rule
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Single-signal comparison
    Signal(SignalCondition),
    /// Key → literal or `{ "$gt": n, ... }`, every entry must hold
    Match(Map<String, Value>),
}

impl Condition {
    /// Classify a `when` object
    ///
    /// An object whose keys are a subset of `signal`, `op` and `value`, with a
    /// string `signal` and an `op` present, is a signal condition; any other
    /// object is a match condition.
    pub fn from_map(when: &Map<String, Value>) -> Self {
        let signal_shaped = when
            .keys()
            .all(|k| matches!(k.as_str(), "signal" | "op" | "value"))
            && when.contains_key("op");

        match (signal_shaped, when.get("signal")) {
            (true, Some(Value::String(signal))) => Self::Signal(SignalCondition {
                signal: signal.clone(),
                op: when.get("op").and_then(Value::as_str).and_then(CompareOp::parse),
                value: when.get("value").cloned(),
            }),
            _ => Self::Match(when.clone()),
        }
    }
}

/// A condition with the payload merged into the result when it holds
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRule {
    /// Condition
    pub when: Condition,
    /// Flat key/value output
    pub apply: Map<String, Value>,
}

/// A node of the rule tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum Rule {
    /// `{when, apply}`
    Simple(SimpleRule),
    /// `{and: [...]}`: every member matches
    And(Vec<Rule>),
    /// `{or: [...]}`: at least one member matches
    Or(Vec<Rule>),
    /// Anything else; resolves to no match
    Invalid(Value),
}

impl Rule {
    /// Classify a rule document
    ///
    /// `and` is checked before `or`, and both before `when`/`apply`. An
    /// `apply` of the form `{"ui": {...}}` contributes the inner object.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Invalid(value.clone());
        };

        if let Some(members) = obj.get("and") {
            return match members.as_array() {
                Some(members) => Self::And(members.iter().map(Self::from_value).collect()),
                None => Self::Invalid(value.clone()),
            };
        }
        if let Some(members) = obj.get("or") {
            return match members.as_array() {
                Some(members) => Self::Or(members.iter().map(Self::from_value).collect()),
                None => Self::Invalid(value.clone()),
            };
        }

        match (obj.get("when"), obj.get("apply")) {
            (Some(Value::Object(when)), Some(Value::Object(apply))) => Self::Simple(SimpleRule {
                when: Condition::from_map(when),
                apply: unwrap_ui_payload(apply),
            }),
            _ => Self::Invalid(value.clone()),
        }
    }

    /// Simple rule from a condition and payload
    pub fn simple(when: Condition, apply: Map<String, Value>) -> Self {
        Self::Simple(SimpleRule { when, apply })
    }

    /// Whether the top-level shape was recognized
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Invalid(_) => "invalid",
        }
    }
}

impl From<Value> for Rule {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

fn unwrap_ui_payload(apply: &Map<String, Value>) -> Map<String, Value> {
    match (apply.len(), apply.get("ui")) {
        (1, Some(Value::Object(ui))) => ui.clone(),
        _ => apply.clone(),
    }
}
