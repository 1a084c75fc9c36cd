//! Evaluation errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("structural cycle at {path}")]
    Cycle { path: String },

    #[error("{path}: {message}")]
    Conflict { path: String, message: String },

    #[error("{path}: {message}")]
    Incomplete { path: String, message: String },

    #[error("cannot export {path}: {message}")]
    Export { path: String, message: String },
}

impl EvalError {
    pub(crate) fn export(path: &[String], message: impl Into<String>) -> Self {
        EvalError::Export {
            path: display_path(path),
            message: message.into(),
        }
    }

    /// Dotted path of the offending value
    pub fn path(&self) -> &str {
        match self {
            EvalError::Cycle { path }
            | EvalError::Conflict { path, .. }
            | EvalError::Incomplete { path, .. }
            | EvalError::Export { path, .. } => path,
        }
    }
}

/// Render a value path, `<root>` when empty
pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}
