//! Application descriptor
//!
//! An [`Appfile`] names an application and lists its services (workloads).
//! Each service refers to a workload definition by type and carries its
//! attached traits. Descriptors are built programmatically or parsed from
//! TOML, in which case every type is resolved against a
//! [`TemplateRegistry`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::template::{
    complete_trait, complete_workload, DefinitionError, DefinitionKind, ProcessContext,
    TemplateError, TemplateRegistry,
};

#[derive(Error, Debug)]
pub enum AppfileError {
    #[error("error reading appfile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid appfile: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("application name must not be empty")]
    EmptyName,

    #[error("service #{index} has an empty name")]
    EmptyServiceName { index: usize },

    #[error("duplicate service name: {name}")]
    DuplicateService { name: String },

    #[error("service {service}: {source}")]
    UnknownType {
        service: String,
        #[source]
        source: TemplateError,
    },

    #[error("invalid properties for {service}: {source}")]
    Properties {
        service: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A trait attached to a workload
#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
    type_name: String,
    template: String,
    params: Option<JsonValue>,
}

impl Trait {
    pub fn new(type_name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            template: template.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: JsonValue) -> Self {
        self.params = Some(params);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> Option<&JsonValue> {
        self.params.as_ref()
    }

    /// Render this trait into the workload's context
    pub fn eval_context(&self, ctx: &mut ProcessContext) -> Result<(), DefinitionError> {
        complete_trait(ctx, &self.type_name, &self.template, self.params.as_ref())
    }
}

/// A named workload with its traits
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    name: String,
    type_name: String,
    template: String,
    params: Option<JsonValue>,
    traits: Vec<Trait>,
}

impl Workload {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            template: template.into(),
            params: None,
            traits: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: JsonValue) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        self.traits.push(t);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> Option<&JsonValue> {
        self.params.as_ref()
    }

    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    /// Render this workload into `ctx`, setting its base object
    pub fn eval_context(&self, ctx: &mut ProcessContext) -> Result<(), DefinitionError> {
        complete_workload(ctx, &self.type_name, &self.template, self.params.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appfile {
    name: String,
    services: Vec<Workload>,
}

/// TOML structure for deserializing appfiles
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlAppfile {
    name: String,
    #[serde(default)]
    services: Vec<TomlService>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlService {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    properties: Option<toml::Table>,
    #[serde(default)]
    traits: Vec<TomlTrait>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTrait {
    #[serde(rename = "type")]
    type_name: String,
    properties: Option<toml::Table>,
}

impl Appfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    pub fn with_service(mut self, workload: Workload) -> Self {
        self.services.push(workload);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workloads in declaration order
    pub fn services(&self) -> &[Workload] {
        &self.services
    }

    /// Load an appfile from disk
    pub fn from_file(path: &Path, registry: &TemplateRegistry) -> Result<Self, AppfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| AppfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, registry)
    }

    /// Parse a TOML appfile, resolving service and trait types
    pub fn parse(content: &str, registry: &TemplateRegistry) -> Result<Self, AppfileError> {
        let parsed: TomlAppfile = toml::from_str(content)?;
        if parsed.name.is_empty() {
            return Err(AppfileError::EmptyName);
        }

        let mut app = Appfile::new(parsed.name);
        let mut seen = HashSet::new();

        for (index, service) in parsed.services.into_iter().enumerate() {
            if service.name.is_empty() {
                return Err(AppfileError::EmptyServiceName { index });
            }
            if !seen.insert(service.name.clone()) {
                return Err(AppfileError::DuplicateService { name: service.name });
            }

            let definition = registry
                .require(DefinitionKind::Workload, &service.type_name)
                .map_err(|source| AppfileError::UnknownType {
                    service: service.name.clone(),
                    source,
                })?;
            let mut workload =
                Workload::new(&service.name, &service.type_name, &definition.template);
            if let Some(props) = &service.properties {
                workload = workload.with_params(properties(&service.name, props)?);
            }

            for t in &service.traits {
                let definition = registry
                    .require(DefinitionKind::Trait, &t.type_name)
                    .map_err(|source| AppfileError::UnknownType {
                        service: service.name.clone(),
                        source,
                    })?;
                let mut attached = Trait::new(&t.type_name, &definition.template);
                if let Some(props) = &t.properties {
                    attached = attached.with_params(properties(&service.name, props)?);
                }
                workload = workload.with_trait(attached);
            }

            app = app.with_service(workload);
        }
        Ok(app)
    }
}

fn properties(service: &str, table: &toml::Table) -> Result<JsonValue, AppfileError> {
    serde_json::to_value(table).map_err(|source| AppfileError::Properties {
        service: service.to_string(),
        source,
    })
}
