//! Declarative rules: parsing, evaluation and the stateful processor

/// Condition matching, boolean groups and output collection
pub mod evaluator;
/// Typed rule tree parsed from rule documents
pub mod model;
/// Rule list holder with change-detected `adaptation` output
pub mod processor;

pub use evaluator::{
    collect, condition_holds, evaluate_rules, resolve, AdaptationResult, EvaluationState,
};
pub use model::{CompareOp, Condition, Rule, SignalCondition, SimpleRule};
pub use processor::{AdaptationSink, RuleProcessor};
