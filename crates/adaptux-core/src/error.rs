//! Error types for the decision pipeline

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Why a registry operation was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalErrorKind {
    /// Name was empty or whitespace only
    InvalidName,
    /// Name was already registered
    Duplicate,
    /// Update targeted a name that was never registered
    Unknown,
    /// Value was not a finite number, boolean or string
    InvalidType,
}

impl SignalErrorKind {
    /// Wire tag used in `signal:error` payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidName => "invalid-name",
            Self::Duplicate => "duplicate",
            Self::Unknown => "unknown",
            Self::InvalidType => "invalid-type",
        }
    }
}

impl fmt::Display for SignalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected `register` or `update` call
///
/// Rejections leave the registry untouched and are published on the
/// `signal:error` topic; they are returned to the caller as well.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("signal '{name}' rejected: {kind}")]
pub struct SignalError {
    /// Rejection reason
    #[serde(rename = "type")]
    pub kind: SignalErrorKind,
    /// Name passed by the caller
    pub name: String,
    /// Value passed by the caller
    #[serde(rename = "attemptedValue")]
    pub attempted_value: Value,
}

impl SignalError {
    /// Create a rejection record
    pub fn new(kind: SignalErrorKind, name: impl Into<String>, attempted_value: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            attempted_value,
        }
    }
}

/// Heuristic registration and evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeuristicError {
    /// Heuristic name was empty
    #[error("Invalid heuristic: must have a non-empty name")]
    InvalidName,

    /// A heuristic with this name is already registered
    #[error("Heuristic \"{0}\" is already registered")]
    Duplicate(String),

    /// The heuristic could not produce a value for this pass
    #[error("Heuristic \"{name}\" evaluation failed: {message}")]
    Evaluation {
        /// Heuristic name
        name: String,
        /// Failure description
        message: String,
    },
}

impl HeuristicError {
    /// Create an evaluation failure
    pub fn evaluation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by [`crate::Engine`] operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine was destroyed; the call had no effect
    #[error("engine has been destroyed")]
    Destroyed,

    /// The registry rejected the signal
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// The heuristic could not be registered
    #[error(transparent)]
    Heuristic(#[from] HeuristicError),
}
