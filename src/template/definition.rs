//! Rendering of workload and trait templates into a [`ProcessContext`]
//!
//! A workload template must produce an `output`, which becomes the base
//! object. Either kind of template may produce named `outputs`, each of
//! which becomes an assist. A trait `output` becomes an assist and a trait
//! `patch` is unified into the base.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::eval::{display_path, EvalError, Instance, Value};
use crate::loader::{Loader, LoaderError};

use super::process::{Assist, ProcessContext};

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("template has no output")]
    MissingOutput,

    #[error("outputs must be a struct")]
    InvalidOutputs,

    #[error("patch conflicts with the workload output at {path}: {message}")]
    PatchConflict { path: String, message: String },

    #[error("patch requires a workload output")]
    PatchWithoutBase,

    #[error("cannot export {field}: {source}")]
    Export {
        field: String,
        #[source]
        source: EvalError,
    },
}

/// Render a workload template, setting the base of `ctx`
pub fn complete_workload(
    ctx: &mut ProcessContext,
    definition: &str,
    template: &str,
    params: Option<&JsonValue>,
) -> Result<(), DefinitionError> {
    debug!(workload = ctx.name(), definition, "rendering workload");
    let instance = load(ctx, template, params)?;

    let output = instance.lookup("output").ok_or(DefinitionError::MissingOutput)?;
    ctx.set_base(export("output", output)?);
    push_outputs(ctx, definition, &instance)
}

/// Render a trait template against the workload rendered so far
pub fn complete_trait(
    ctx: &mut ProcessContext,
    definition: &str,
    template: &str,
    params: Option<&JsonValue>,
) -> Result<(), DefinitionError> {
    debug!(workload = ctx.name(), definition, "rendering trait");
    let instance = load(ctx, template, params)?;

    if let Some(output) = instance.lookup("output") {
        ctx.push_assist(Assist {
            definition: definition.to_string(),
            name: None,
            value: export("output", output)?,
        });
    }
    push_outputs(ctx, definition, &instance)?;

    if let Some(patch) = instance.lookup("patch") {
        apply_patch(ctx, patch)?;
    }
    Ok(())
}

fn load(
    ctx: &ProcessContext,
    template: &str,
    params: Option<&JsonValue>,
) -> Result<Instance, DefinitionError> {
    let mut loader = Loader::new(&ctx.base_context()).with_template(template);
    if let Some(params) = params {
        loader = loader.with_params(params);
    }
    Ok(loader.complete()?)
}

fn push_outputs(
    ctx: &mut ProcessContext,
    definition: &str,
    instance: &Instance,
) -> Result<(), DefinitionError> {
    let Some(outputs) = instance.lookup("outputs") else {
        return Ok(());
    };
    if !outputs.is_struct() {
        return Err(DefinitionError::InvalidOutputs);
    }
    for (name, value) in outputs.fields() {
        ctx.push_assist(Assist {
            definition: definition.to_string(),
            name: Some(name.to_string()),
            value: export(&format!("outputs.{}", name), value)?,
        });
    }
    Ok(())
}

fn apply_patch(ctx: &mut ProcessContext, patch: &Value) -> Result<(), DefinitionError> {
    let base = ctx.base().ok_or(DefinitionError::PatchWithoutBase)?;
    let patched = Value::from(base).unify(patch);
    if let Some(conflict) = patched.first_conflict() {
        return Err(DefinitionError::PatchConflict {
            path: display_path(&conflict.path),
            message: conflict.message,
        });
    }
    ctx.set_base(export("patch", &patched)?);
    Ok(())
}

fn export(field: &str, value: &Value) -> Result<JsonValue, DefinitionError> {
    value.to_json().map_err(|source| DefinitionError::Export {
        field: field.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const WEBSERVICE: &str = r#"
parameter: {
    image: string
    port: *80 | int
}
output: {
    kind: "Deployment"
    metadata: name: context.name
    spec: {
        image: parameter.image
        port: parameter.port
    }
}
outputs: service: {
    kind: "Service"
    port: parameter.port
}
"#;

    fn rendered_front() -> ProcessContext {
        let mut ctx = ProcessContext::new("front");
        complete_workload(
            &mut ctx,
            "webservice",
            WEBSERVICE,
            Some(&json!({"image": "nginx"})),
        )
        .expect("Should render workload");
        ctx
    }

    #[test]
    fn test_workload_output_becomes_base() {
        let ctx = rendered_front();
        assert_eq!(
            ctx.base(),
            Some(&json!({
                "kind": "Deployment",
                "metadata": {"name": "front"},
                "spec": {"image": "nginx", "port": 80}
            }))
        );
    }

    #[test]
    fn test_workload_outputs_become_named_assists() {
        let ctx = rendered_front();
        assert_eq!(
            ctx.assists(),
            &[Assist {
                definition: "webservice".to_string(),
                name: Some("service".to_string()),
                value: json!({"kind": "Service", "port": 80}),
            }]
        );
    }

    #[test]
    fn test_workload_without_output_fails() {
        let mut ctx = ProcessContext::new("front");
        let err = complete_workload(&mut ctx, "empty", "outputs: {}", None).unwrap_err();
        assert!(matches!(err, DefinitionError::MissingOutput));
    }

    #[test]
    fn test_missing_required_parameter_fails() {
        let mut ctx = ProcessContext::new("front");
        let err = complete_workload(&mut ctx, "webservice", WEBSERVICE, None).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::Loader(LoaderError::Validate { .. })
        ));
    }

    #[test]
    fn test_trait_observes_workload_output() {
        let mut ctx = rendered_front();
        complete_trait(
            &mut ctx,
            "ingress",
            r#"output: {kind: "Ingress", backend: context.output.metadata.name, port: context.outputs.service.port}"#,
            None,
        )
        .expect("Should render trait");
        let (_, assists) = ctx.output();
        assert_eq!(
            assists[1].value,
            json!({"kind": "Ingress", "backend": "front", "port": 80})
        );
        assert_eq!(assists[1].name, None);
    }

    #[test]
    fn test_trait_patch_is_unified_into_base() {
        let mut ctx = rendered_front();
        complete_trait(
            &mut ctx,
            "scaler",
            "parameter: {replicas: int}\npatch: spec: replicas: parameter.replicas",
            Some(&json!({"replicas": 3})),
        )
        .expect("Should patch");
        assert_eq!(ctx.base().unwrap()["spec"]["replicas"], json!(3));
        assert_eq!(ctx.base().unwrap()["spec"]["image"], json!("nginx"));
    }

    #[test]
    fn test_conflicting_patch_fails() {
        let mut ctx = rendered_front();
        let err = complete_trait(&mut ctx, "bad", r#"patch: kind: "StatefulSet""#, None)
            .unwrap_err();
        match err {
            DefinitionError::PatchConflict { path, .. } => assert_eq!(path, "kind"),
            other => panic!("Expected patch conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_without_base_fails() {
        let mut ctx = ProcessContext::new("front");
        let err = complete_trait(&mut ctx, "scaler", "patch: {replicas: 1}", None).unwrap_err();
        assert!(matches!(err, DefinitionError::PatchWithoutBase));
    }

    #[test]
    fn test_scalar_outputs_is_rejected() {
        let mut ctx = rendered_front();
        let err = complete_trait(&mut ctx, "bad", "outputs: 1", None).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidOutputs));
    }
}
