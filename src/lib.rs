//! Appfile Compiler - renders application descriptors into OAM resources
//!
//! An application lists workloads (services), each rendered from a workload
//! definition template and extended by trait templates. Templates are
//! written in a small unification based language; the result is one
//! `Component` per workload and an `ApplicationConfiguration` binding them
//! to their traits.
//!
//! # Example
//!
//! ```rust
//! use appfile_compiler::{compile, TemplateDefinition, TemplateRegistry};
//!
//! let mut registry = TemplateRegistry::new();
//! registry
//!     .register(TemplateDefinition::workload(
//!         "worker",
//!         "output: {kind: \"Job\", name: context.name}",
//!     ))
//!     .unwrap();
//!
//! let appfile = r#"
//! name = "batch"
//!
//! [[services]]
//! name = "nightly"
//! type = "worker"
//! "#;
//!
//! let (appconfig, components) = compile(appfile, &registry, "default").unwrap();
//! assert_eq!(appconfig.spec.components[0].component_name, "nightly");
//! assert_eq!(components[0].spec.workload["name"], "nightly");
//! ```

pub mod appfile;
pub mod builder;
pub mod config;
pub mod error;
pub mod eval;
pub mod loader;
pub mod parser;
pub mod template;

pub use appfile::{Appfile, AppfileError, Trait, Workload};
pub use builder::{
    build, ApplicationConfiguration, BuildError, Component, ErrorCategory, ManifestList,
    OAM_APPLICATION_LABEL,
};
pub use config::{CompilerConfig, ConfigError};
pub use error::ParseError;
pub use eval::{EvalError, Instance, Value};
pub use loader::{Loader, LoaderError};
pub use template::{
    DefinitionError, DefinitionKind, ProcessContext, TemplateDefinition, TemplateError,
    TemplateRegistry,
};

use thiserror::Error;

/// Errors that can occur during the compile pipeline
#[derive(Debug, Error)]
pub enum CompileError {
    /// Error loading the descriptor
    #[error("appfile error: {0}")]
    Appfile(#[from] AppfileError),

    /// Error rendering the application
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Error serializing the resources
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Parse a TOML appfile against `registry` and build it into `namespace`
pub fn compile(
    source: &str,
    registry: &TemplateRegistry,
    namespace: &str,
) -> Result<(ApplicationConfiguration, Vec<Component>), CompileError> {
    let app = Appfile::parse(source, registry)?;
    Ok(build(namespace, &app)?)
}

/// Compile and wrap the resources in a `v1/List`
pub fn compile_manifest(
    source: &str,
    registry: &TemplateRegistry,
    namespace: &str,
) -> Result<ManifestList, CompileError> {
    let (appconfig, components) = compile(source, registry, namespace)?;
    Ok(ManifestList::new(&appconfig, &components)?)
}
