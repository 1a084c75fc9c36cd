//! Compiler configuration
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! namespace = "staging"
//! definitions = ["defs/core.toml", "defs/traits.toml"]
//! pretty = false
//! ```
//!
//! Relative definition paths are resolved against the config file's
//! directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::template::{TemplateError, TemplateRegistry};

/// Errors that can occur when loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("namespace must not be empty")]
    EmptyNamespace,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Namespace stamped onto every resource
    pub namespace: String,
    /// Definition files, loaded in order
    pub definitions: Vec<PathBuf>,
    /// Pretty-print the manifest
    pub pretty: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            definitions: Vec::new(),
            pretty: true,
        }
    }
}

impl CompilerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(dir) = path.parent() {
            for def in &mut config.definitions {
                if def.is_relative() {
                    *def = dir.join(&*def);
                }
            }
        }
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = toml::from_str(content)?;
        if config.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Add a definitions file
    pub fn with_definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.definitions.push(path.into());
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Build a registry from all configured definition files
    pub fn registry(&self) -> Result<TemplateRegistry, TemplateError> {
        let mut registry = TemplateRegistry::new();
        for path in &self.definitions {
            registry.load_file(path)?;
        }
        Ok(registry)
    }
}
