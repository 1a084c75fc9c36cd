//! Multi-source template loader
//!
//! A [`Loader`] collects named fragments (the template body, the `context`
//! value and the user `parameter`) and evaluates them as one build unit. The
//! first failure while adding a fragment is latched: every later call is a
//! no-op and [`Loader::complete`] returns that error.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::ParseError;
use crate::eval::{self, EvalError, Instance};
use crate::parser::{self, File};

/// Fragment name of the template body
pub const TEMPLATE_FRAGMENT: &str = "-";
/// Fragment name of the ambient context
pub const CONTEXT_FRAGMENT: &str = "context";
/// Fragment name of the user parameters
pub const PARAMETER_FRAGMENT: &str = "parameter";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("invalid {fragment} fragment: {}", format_parse_errors(.errors))]
    Parse {
        fragment: String,
        source_text: String,
        errors: Vec<ParseError>,
    },

    #[error("cannot serialize {fragment}: {source}")]
    Marshal {
        fragment: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("evaluating [{}]: {source}", .fragments.join(", "))]
    Build {
        fragments: Vec<String>,
        #[source]
        source: EvalError,
    },

    #[error("incomplete value {source}")]
    Validate {
        #[source]
        source: EvalError,
    },
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl LoaderError {
    /// Render the error, with source context for syntax errors
    pub fn report(&self) -> String {
        match self {
            LoaderError::Parse {
                fragment,
                source_text,
                errors,
            } => errors
                .iter()
                .map(|e| e.format(source_text, fragment))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Loader {
    fragments: BTreeMap<String, File>,
    err: Option<LoaderError>,
}

impl Loader {
    /// Create a loader seeded with a `context` fragment
    pub fn new<T: Serialize + ?Sized>(context: &T) -> Self {
        Self::default().with_context(context)
    }

    /// Install the template body, replacing any previous one
    pub fn with_template(self, raw: &str) -> Self {
        self.install(TEMPLATE_FRAGMENT, raw.to_string())
    }

    /// Replace the `context` fragment
    pub fn with_context<T: Serialize + ?Sized>(self, context: &T) -> Self {
        self.install_value(CONTEXT_FRAGMENT, context)
    }

    /// Install or replace the `parameter` fragment
    pub fn with_params<T: Serialize + ?Sized>(self, params: &T) -> Self {
        self.install_value(PARAMETER_FRAGMENT, params)
    }

    /// The latched error, if any
    pub fn error(&self) -> Option<&LoaderError> {
        self.err.as_ref()
    }

    /// Names of the installed fragments, in evaluation order
    pub fn fragment_names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// Evaluate all fragments and check that the result is concrete
    pub fn complete(self) -> Result<Instance, LoaderError> {
        if let Some(err) = self.err {
            return Err(err);
        }

        let fragments: Vec<String> = self.fragments.keys().cloned().collect();
        debug!(?fragments, "evaluating build unit");

        let instance = eval::evaluate(self.fragments.values())
            .map_err(|source| LoaderError::Build { fragments, source })?;
        instance
            .validate_concrete()
            .map_err(|source| LoaderError::Validate { source })?;
        Ok(instance)
    }

    /// Serialize `value` as `key: <json>` and install it under `key`
    fn install_value<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        if self.err.is_some() {
            return self;
        }
        match serde_json::to_string(value) {
            Ok(json) => self.install(key, format!("{}: {}", key, json)),
            Err(source) => {
                self.err = Some(LoaderError::Marshal {
                    fragment: key.to_string(),
                    source,
                });
                self
            }
        }
    }

    fn install(mut self, key: &str, source: String) -> Self {
        if self.err.is_some() {
            return self;
        }
        match parser::parse(key, &source) {
            Ok(file) => {
                self.fragments.insert(key.to_string(), file);
            }
            Err(errors) => {
                self.err = Some(LoaderError::Parse {
                    fragment: key.to_string(),
                    source_text: source,
                    errors,
                });
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_complete_with_context_and_params() {
        let instance = Loader::new(&json!({"name": "front"}))
            .with_template("output: {name: context.name, replicas: parameter.n}")
            .with_params(&json!({"n": 3}))
            .complete()
            .expect("Should complete");
        assert_eq!(
            instance.lookup("output").unwrap().to_json().unwrap(),
            json!({"name": "front", "replicas": 3})
        );
    }

    #[test]
    fn test_fragments_are_key_ordered() {
        let loader = Loader::new(&json!({}))
            .with_params(&json!({}))
            .with_template("a: 1");
        let names: Vec<_> = loader.fragment_names().collect();
        assert_eq!(names, vec!["-", "context", "parameter"]);
    }

    #[test]
    fn test_replacing_a_fragment_keeps_the_last() {
        let instance = Loader::new(&json!({"name": "old"}))
            .with_template("output: {replicas: 1}")
            .with_template("output: {replicas: 2}")
            .with_context(&json!({"name": "new"}))
            .complete()
            .expect("Should complete");
        assert_eq!(
            instance.lookup("output").unwrap().to_json().unwrap(),
            json!({"replicas": 2})
        );
        assert_eq!(
            instance.lookup("context").unwrap().to_json().unwrap(),
            json!({"name": "new"})
        );
    }

    #[test]
    fn test_first_error_is_sticky() {
        let loader = Loader::new(&json!({}))
            .with_template("output: {")
            .with_template("output: {}")
            .with_params(&json!({"n": 1}));
        assert!(matches!(
            loader.error(),
            Some(LoaderError::Parse { fragment, .. }) if fragment == "-"
        ));
        let names: Vec<_> = loader.fragment_names().collect();
        assert_eq!(names, vec!["context"]);
        assert!(matches!(
            loader.complete(),
            Err(LoaderError::Parse { .. })
        ));
    }

    #[test]
    fn test_marshal_failure_is_latched() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON keys");
        let result = Loader::new(&bad).with_template("output: {}").complete();
        match result {
            Err(LoaderError::Marshal { fragment, .. }) => assert_eq!(fragment, "context"),
            other => panic!("Expected marshal error, got {:?}", other),
        }
    }

    #[test]
    fn test_conflict_is_build_error() {
        let err = Loader::new(&json!({}))
            .with_template("parameter: {n: int}\noutput: {n: parameter.n}")
            .with_params(&json!({"n": "three"}))
            .complete()
            .unwrap_err();
        match err {
            LoaderError::Build { fragments, source } => {
                assert_eq!(fragments, vec!["-", "context", "parameter"]);
                assert_eq!(source.path(), "parameter.n");
            }
            other => panic!("Expected build error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_parameter_is_validate_error() {
        let err = Loader::new(&json!({"name": "front"}))
            .with_template("output: {replicas: parameter.n}")
            .complete()
            .unwrap_err();
        match err {
            LoaderError::Validate { source } => assert_eq!(source.path(), "output.replicas"),
            other => panic!("Expected validate error, got {:?}", other),
        }
    }

    #[test]
    fn test_report_renders_source() {
        let err = Loader::new(&json!({}))
            .with_template("output: {\n  name: ]\n}")
            .complete()
            .unwrap_err();
        let report = err.report();
        assert!(report.contains("Unexpected"));
        assert!(report.contains("name:"));
    }
}
