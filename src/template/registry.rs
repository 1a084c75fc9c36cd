//! Registry of workload and trait definitions

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading or looking up definitions
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Definition not found in registry
    #[error("{kind} definition not found: {name}")]
    NotFound { kind: DefinitionKind, name: String },

    /// Duplicate definition
    #[error("duplicate {kind} definition: {name}")]
    Duplicate { kind: DefinitionKind, name: String },

    /// Neither or both of `template` and `template_file` given
    #[error("{kind} definition {name} needs exactly one of template or template_file")]
    InvalidSource { kind: DefinitionKind, name: String },

    /// File not found for file-based template
    #[error("template file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Error reading a definitions or template file
    #[error("error reading file {path}: {message}")]
    FileReadError { path: PathBuf, message: String },

    #[error("invalid definitions file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Workload,
    Trait,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Workload => f.write_str("workload"),
            DefinitionKind::Trait => f.write_str("trait"),
        }
    }
}

/// A stored template definition
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub name: String,
    pub kind: DefinitionKind,
    pub description: Option<String>,
    /// Template source text
    pub template: String,
    /// File the template was read from, for file-based definitions
    pub source_path: Option<PathBuf>,
}

impl TemplateDefinition {
    pub fn new(name: impl Into<String>, kind: DefinitionKind, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            template: template.into(),
            source_path: None,
        }
    }

    pub fn workload(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::Workload, template)
    }

    pub fn trait_def(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::Trait, template)
    }

    /// Check if this is a file-based definition
    pub fn is_file_based(&self) -> bool {
        self.source_path.is_some()
    }
}

/// TOML structure for deserializing definition files
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDefinitions {
    #[serde(default)]
    workloads: BTreeMap<String, TomlDefinition>,
    #[serde(default)]
    traits: BTreeMap<String, TomlDefinition>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDefinition {
    description: Option<String>,
    template: Option<String>,
    template_file: Option<String>,
}

/// Registry for storing workload and trait definitions
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    workloads: HashMap<String, TemplateDefinition>,
    traits: HashMap<String, TemplateDefinition>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition
    pub fn register(&mut self, def: TemplateDefinition) -> Result<(), TemplateError> {
        let table = match def.kind {
            DefinitionKind::Workload => &mut self.workloads,
            DefinitionKind::Trait => &mut self.traits,
        };
        if table.contains_key(&def.name) {
            return Err(TemplateError::Duplicate {
                kind: def.kind,
                name: def.name,
            });
        }
        table.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, kind: DefinitionKind, name: &str) -> Option<&TemplateDefinition> {
        match kind {
            DefinitionKind::Workload => self.workloads.get(name),
            DefinitionKind::Trait => self.traits.get(name),
        }
    }

    /// Look up a definition, failing with [`TemplateError::NotFound`]
    pub fn require(
        &self,
        kind: DefinitionKind,
        name: &str,
    ) -> Result<&TemplateDefinition, TemplateError> {
        self.get(kind, name).ok_or_else(|| TemplateError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    /// Get all definition names of one kind, sorted
    pub fn names(&self, kind: DefinitionKind) -> Vec<&str> {
        let table = match kind {
            DefinitionKind::Workload => &self.workloads,
            DefinitionKind::Trait => &self.traits,
        };
        let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.workloads.len() + self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load definitions from TOML, resolving `template_file` against the
    /// working directory
    pub fn load_str(&mut self, content: &str) -> Result<(), TemplateError> {
        self.load_toml(content, None)
    }

    /// Load definitions from a TOML file, resolving `template_file`
    /// relative to the file's directory
    pub fn load_file(&mut self, path: &Path) -> Result<(), TemplateError> {
        let content = read_file(path)?;
        self.load_toml(&content, path.parent())
    }

    fn load_toml(&mut self, content: &str, base: Option<&Path>) -> Result<(), TemplateError> {
        let parsed: TomlDefinitions = toml::from_str(content)?;

        let tables = [
            (DefinitionKind::Workload, parsed.workloads),
            (DefinitionKind::Trait, parsed.traits),
        ];
        for (kind, entries) in tables {
            for (name, entry) in entries {
                let (template, source_path) = match (entry.template, entry.template_file) {
                    (Some(template), None) => (template, None),
                    (None, Some(file)) => {
                        let path = resolve_against(base, &file);
                        (read_file(&path)?, Some(path))
                    }
                    _ => return Err(TemplateError::InvalidSource { kind, name }),
                };
                debug!(%kind, name = name.as_str(), file_based = source_path.is_some(), "registering definition");
                self.register(TemplateDefinition {
                    name,
                    kind,
                    description: entry.description,
                    template,
                    source_path,
                })?;
            }
        }
        Ok(())
    }
}

fn resolve_against(base: Option<&Path>, relative: &str) -> PathBuf {
    match base {
        Some(base) => base.join(relative),
        None => PathBuf::from(relative),
    }
}

fn read_file(path: &Path) -> Result<String, TemplateError> {
    if !path.exists() {
        return Err(TemplateError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| TemplateError::FileReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DEFINITIONS: &str = r#"
[workloads.webservice]
description = "Long running service"
template = 'output: {name: context.name}'

[traits.scaler]
template = 'patch: spec: replicas: parameter.replicas'
"#;

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(TemplateDefinition::workload("worker", "output: {}"))
            .expect("Should register");
        assert!(registry.get(DefinitionKind::Workload, "worker").is_some());
        assert!(registry.get(DefinitionKind::Trait, "worker").is_none());
    }

    #[test]
    fn test_registry_duplicate_error() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(TemplateDefinition::trait_def("scaler", "output: {}"))
            .expect("First register should succeed");
        let result = registry.register(TemplateDefinition::trait_def("scaler", "output: {}"));
        assert!(matches!(result, Err(TemplateError::Duplicate { .. })));
    }

    #[test]
    fn test_same_name_in_both_kinds() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(TemplateDefinition::workload("cron", "output: {}"))
            .unwrap();
        registry
            .register(TemplateDefinition::trait_def("cron", "output: {}"))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_inline_definitions() {
        let mut registry = TemplateRegistry::new();
        registry.load_str(DEFINITIONS).expect("Should load");

        let web = registry
            .require(DefinitionKind::Workload, "webservice")
            .expect("Should find webservice");
        assert_eq!(web.description.as_deref(), Some("Long running service"));
        assert_eq!(web.template, "output: {name: context.name}");
        assert!(!web.is_file_based());
        assert_eq!(registry.names(DefinitionKind::Trait), vec!["scaler"]);
    }

    #[test]
    fn test_require_missing_definition() {
        let registry = TemplateRegistry::new();
        let err = registry.require(DefinitionKind::Trait, "ingress").unwrap_err();
        assert_eq!(err.to_string(), "trait definition not found: ingress");
    }

    #[test]
    fn test_load_file_resolves_template_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("cue")).unwrap();
        fs::write(dir.path().join("cue/worker.cue"), "output: {kind: \"Job\"}").unwrap();
        fs::write(
            dir.path().join("defs.toml"),
            "[workloads.worker]\ntemplate_file = \"cue/worker.cue\"\n",
        )
        .unwrap();

        let mut registry = TemplateRegistry::new();
        registry
            .load_file(&dir.path().join("defs.toml"))
            .expect("Should load");
        let worker = registry.get(DefinitionKind::Workload, "worker").unwrap();
        assert_eq!(worker.template, "output: {kind: \"Job\"}");
        assert_eq!(
            worker.source_path.as_deref(),
            Some(dir.path().join("cue/worker.cue").as_path())
        );
    }

    #[test]
    fn test_missing_template_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("defs.toml"),
            "[traits.scaler]\ntemplate_file = \"nope.cue\"\n",
        )
        .unwrap();
        let mut registry = TemplateRegistry::new();
        let err = registry
            .load_file(&dir.path().join("defs.toml"))
            .unwrap_err();
        match err {
            TemplateError::FileNotFound { path } => assert_eq!(path, dir.path().join("nope.cue")),
            other => panic!("Expected missing file, got {:?}", other),
        }
    }

    #[test]
    fn test_definition_needs_one_source() {
        let mut registry = TemplateRegistry::new();
        let err = registry
            .load_str("[traits.scaler]\ndescription = \"no template\"\n")
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidSource { .. }));

        let err = registry
            .load_str("[traits.scaler]\ntemplate = \"a: 1\"\ntemplate_file = \"a.cue\"\n")
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidSource { .. }));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut registry = TemplateRegistry::new();
        let err = registry
            .load_str("[components.web]\ntemplate = \"a: 1\"\n")
            .unwrap_err();
        assert!(matches!(err, TemplateError::Toml(_)));
    }
}
