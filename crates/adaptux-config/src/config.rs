//! Normalized configuration schema for an adaptux pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile used when the user config omits one or supplies an unusable value
pub const DEFAULT_PROFILE: &str = "default";

/// Default bound on nested state → rules → UI → state re-entries
pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 32;

/// Normalized configuration consumed read-only by the engine
///
/// Every field has a default, so a partially specified document (or no
/// document at all) always yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptConfig {
    /// Active user profile name
    pub profile: String,

    /// Declared signal names; empty means "accept any signal"
    pub signals: Vec<String>,

    /// Raw rule documents, parsed into the typed rule model by the core
    pub rules: Vec<Value>,

    /// Styling options forwarded to presentation collaborators
    pub styling: Map<String, Value>,

    /// Feature switches forwarded to presentation collaborators
    pub features: Map<String, Value>,

    /// Log every rule pass and its result at `debug` level
    pub debug: bool,

    /// Maximum depth of nested propagation before the engine stops re-evaluating
    pub max_propagation_depth: usize,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            signals: Vec::new(),
            rules: Vec::new(),
            styling: Map::new(),
            features: Map::new(),
            debug: false,
            max_propagation_depth: DEFAULT_MAX_PROPAGATION_DEPTH,
        }
    }
}

impl AdaptConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the declared signal names
    pub fn with_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals = signals.into_iter().map(Into::into).collect();
        self
    }

    /// Set the raw rule documents
    pub fn with_rules(mut self, rules: Vec<Value>) -> Self {
        self.rules = rules;
        self
    }

    /// Append a single raw rule document
    pub fn with_rule(mut self, rule: Value) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the feature switches
    pub fn with_features(mut self, features: Map<String, Value>) -> Self {
        self.features = features;
        self
    }

    /// Set the propagation depth bound
    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth;
        self
    }

    /// Enable or disable debug diagnostics
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Whether `name` is accepted by the declared signal list
    ///
    /// An empty list accepts every signal.
    pub fn accepts_signal(&self, name: &str) -> bool {
        self.signals.is_empty() || self.signals.iter().any(|s| s == name)
    }
}
