//! Evaluated build unit

use serde_json::Value as JsonValue;

use super::error::{display_path, EvalError};
use super::value::Value;

/// Result of evaluating a set of fragments
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    root: Value,
}

impl Instance {
    pub(crate) fn new(root: Value) -> Self {
        Self { root }
    }

    /// Root value, always a struct
    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Top-level field by label
    pub fn lookup(&self, label: &str) -> Option<&Value> {
        self.root.field(label)
    }

    /// Fail on the first value that is not fully resolved
    pub fn validate_concrete(&self) -> Result<(), EvalError> {
        if let Some(conflict) = self.root.first_conflict() {
            return Err(EvalError::Conflict {
                path: display_path(&conflict.path),
                message: conflict.message,
            });
        }
        match self.root.first_incomplete() {
            Some((path, message)) => Err(EvalError::Incomplete {
                path: display_path(&path),
                message,
            }),
            None => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<JsonValue, EvalError> {
        self.root.to_json()
    }
}
