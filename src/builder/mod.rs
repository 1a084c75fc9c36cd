//! Assembly of rendered workloads into OAM resources
//!
//! Every workload of an application is rendered into a fresh
//! [`ProcessContext`], followed by its traits in order. The base object
//! becomes the workload of a [`Component`]; the assists become the traits of
//! the workload's entry in the [`ApplicationConfiguration`]. Any failure
//! aborts the whole application.

mod resources;

pub use resources::{
    ApplicationConfiguration, ApplicationConfigurationComponent, ApplicationConfigurationSpec,
    Component, ComponentSpec, ComponentTrait, ManifestList, ObjectMeta, API_VERSION,
};

use std::fmt;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::appfile::Appfile;
use crate::loader::LoaderError;
use crate::template::{DefinitionError, ProcessContext};

/// Label carrying the application name on every produced resource
pub const OAM_APPLICATION_LABEL: &str = "application.oam.dev";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("workload {workload}: {source}")]
    Workload {
        workload: String,
        #[source]
        source: DefinitionError,
    },

    #[error("trait {trait_type} of workload {workload}: {source}")]
    Trait {
        workload: String,
        trait_type: String,
        #[source]
        source: DefinitionError,
    },

    #[error("workload {workload}: {message}")]
    Extraction { workload: String, message: String },

    #[error("workload {workload} rendered no output")]
    MissingBase { workload: String },
}

/// Coarse classification of build failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A fragment failed to parse
    Syntax,
    /// Fragments could not be unified into one value
    Assembly,
    /// The result was not fully concrete
    Unresolved,
    /// A rendered object has the wrong shape
    Extraction,
    /// Invalid arguments or unserializable inputs
    Input,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Assembly => "assembly",
            ErrorCategory::Unresolved => "unresolved",
            ErrorCategory::Extraction => "extraction",
            ErrorCategory::Input => "input",
        };
        f.write_str(name)
    }
}

impl BuildError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BuildError::EmptyNamespace => ErrorCategory::Input,
            BuildError::Workload { source, .. } | BuildError::Trait { source, .. } => {
                match source {
                    DefinitionError::Loader(LoaderError::Parse { .. }) => ErrorCategory::Syntax,
                    DefinitionError::Loader(LoaderError::Marshal { .. }) => ErrorCategory::Input,
                    DefinitionError::Loader(LoaderError::Build { .. })
                    | DefinitionError::PatchConflict { .. } => ErrorCategory::Assembly,
                    DefinitionError::Loader(LoaderError::Validate { .. }) => {
                        ErrorCategory::Unresolved
                    }
                    DefinitionError::MissingOutput
                    | DefinitionError::InvalidOutputs
                    | DefinitionError::PatchWithoutBase
                    | DefinitionError::Export { .. } => ErrorCategory::Extraction,
                }
            }
            BuildError::Extraction { .. } | BuildError::MissingBase { .. } => {
                ErrorCategory::Extraction
            }
        }
    }

    /// The loader error behind this failure, if any
    pub fn loader_error(&self) -> Option<&LoaderError> {
        match self {
            BuildError::Workload {
                source: DefinitionError::Loader(err),
                ..
            }
            | BuildError::Trait {
                source: DefinitionError::Loader(err),
                ..
            } => Some(err),
            _ => None,
        }
    }
}

/// Render every workload of `app` into resources in `namespace`
///
/// Returns the configuration and the components in workload order, or the
/// first error encountered.
#[instrument(skip(app), fields(app = app.name()))]
pub fn build(
    namespace: &str,
    app: &Appfile,
) -> Result<(ApplicationConfiguration, Vec<Component>), BuildError> {
    if namespace.is_empty() {
        return Err(BuildError::EmptyNamespace);
    }

    let mut appconfig = ApplicationConfiguration::new(app.name(), namespace);
    appconfig
        .metadata
        .labels
        .insert(OAM_APPLICATION_LABEL.to_string(), app.name().to_string());

    let mut components = Vec::with_capacity(app.services().len());
    for wl in app.services() {
        let mut ctx = ProcessContext::new(wl.name());
        wl.eval_context(&mut ctx)
            .map_err(|source| BuildError::Workload {
                workload: wl.name().to_string(),
                source,
            })?;
        for tr in wl.traits() {
            tr.eval_context(&mut ctx)
                .map_err(|source| BuildError::Trait {
                    workload: wl.name().to_string(),
                    trait_type: tr.type_name().to_string(),
                    source,
                })?;
        }

        let (mut component, mut binding) = generate_oam(&ctx)?;
        component.metadata.name = wl.name().to_string();
        binding.component_name = component.metadata.name.clone();
        component.metadata.namespace = namespace.to_string();
        component
            .metadata
            .labels
            .insert(OAM_APPLICATION_LABEL.to_string(), app.name().to_string());

        debug!(
            workload = wl.name(),
            traits = binding.traits.len(),
            "assembled component"
        );
        components.push(component);
        appconfig.spec.components.push(binding);
    }

    Ok((appconfig, components))
}

/// Turn the rendered objects of one workload into an unnamed component and
/// binding record
fn generate_oam(
    ctx: &ProcessContext,
) -> Result<(Component, ApplicationConfigurationComponent), BuildError> {
    let (base, assists) = ctx.output();
    let base = base.ok_or_else(|| BuildError::MissingBase {
        workload: ctx.name().to_string(),
    })?;
    if !base.is_object() {
        return Err(BuildError::Extraction {
            workload: ctx.name().to_string(),
            message: format!("output must be an object, got {}", base),
        });
    }

    let mut traits = Vec::with_capacity(assists.len());
    for assist in assists {
        if !assist.value.is_object() {
            return Err(BuildError::Extraction {
                workload: ctx.name().to_string(),
                message: format!(
                    "{} produced a non-object value {}",
                    assist.definition, assist.value
                ),
            });
        }
        traits.push(ComponentTrait {
            object: assist.value.clone(),
        });
    }

    Ok((
        Component::new(base.clone()),
        ApplicationConfigurationComponent {
            component_name: String::new(),
            traits,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Assist;
    use serde_json::json;

    #[test]
    fn test_generate_oam_requires_base() {
        let ctx = ProcessContext::new("front");
        assert!(matches!(
            generate_oam(&ctx),
            Err(BuildError::MissingBase { workload }) if workload == "front"
        ));
    }

    #[test]
    fn test_generate_oam_rejects_scalar_base() {
        let mut ctx = ProcessContext::new("front");
        ctx.set_base(json!("nginx"));
        let err = generate_oam(&ctx).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Extraction);
    }

    #[test]
    fn test_generate_oam_keeps_assist_order() {
        let mut ctx = ProcessContext::new("front");
        ctx.set_base(json!({"kind": "Deployment"}));
        for kind in ["Scaler", "Service", "Ingress"] {
            ctx.push_assist(Assist {
                definition: kind.to_lowercase(),
                name: None,
                value: json!({ "kind": kind }),
            });
        }
        let (component, binding) = generate_oam(&ctx).unwrap();
        assert_eq!(component.spec.workload, json!({"kind": "Deployment"}));
        let kinds: Vec<_> = binding
            .traits
            .iter()
            .map(|t| t.object["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["Scaler", "Service", "Ingress"]);
    }

    #[test]
    fn test_empty_namespace_is_rejected() {
        let err = build("", &Appfile::new("web")).unwrap_err();
        assert!(matches!(err, BuildError::EmptyNamespace));
        assert_eq!(err.category(), ErrorCategory::Input);
    }
}
