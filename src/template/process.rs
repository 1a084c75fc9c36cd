//! Per-workload evaluation context

use serde_json::{Map, Value as JsonValue};

/// Auxiliary object produced while rendering a workload
#[derive(Debug, Clone, PartialEq)]
pub struct Assist {
    /// Definition that produced the object
    pub definition: String,
    /// Field name under `outputs`, `None` for an `output`
    pub name: Option<String>,
    pub value: JsonValue,
}

/// Accumulates the rendered objects of one workload and its traits
#[derive(Debug, Clone)]
pub struct ProcessContext {
    name: String,
    base: Option<JsonValue>,
    assists: Vec<Assist>,
}

impl ProcessContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            assists: Vec::new(),
        }
    }

    /// Name of the workload being rendered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value exposed to templates as `context`
    ///
    /// Holds the workload name, the base rendered so far as `output`, and
    /// the named assists rendered so far as `outputs`.
    pub fn base_context(&self) -> JsonValue {
        let mut ctx = Map::new();
        ctx.insert("name".to_string(), JsonValue::String(self.name.clone()));
        if let Some(base) = &self.base {
            ctx.insert("output".to_string(), base.clone());
        }

        let outputs: Map<String, JsonValue> = self
            .assists
            .iter()
            .filter_map(|a| a.name.as_ref().map(|n| (n.clone(), a.value.clone())))
            .collect();
        if !outputs.is_empty() {
            ctx.insert("outputs".to_string(), JsonValue::Object(outputs));
        }
        JsonValue::Object(ctx)
    }

    pub fn base(&self) -> Option<&JsonValue> {
        self.base.as_ref()
    }

    pub fn set_base(&mut self, base: JsonValue) {
        self.base = Some(base);
    }

    pub fn push_assist(&mut self, assist: Assist) {
        self.assists.push(assist);
    }

    pub fn assists(&self) -> &[Assist] {
        &self.assists
    }

    /// The base and the assists in the order they were produced
    pub fn output(&self) -> (Option<&JsonValue>, &[Assist]) {
        (self.base.as_ref(), &self.assists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_fresh_context_only_has_name() {
        let ctx = ProcessContext::new("front");
        assert_eq!(ctx.base_context(), json!({"name": "front"}));
        assert_eq!(ctx.output(), (None, &[][..]));
    }

    #[test]
    fn test_context_exposes_base_and_named_assists() {
        let mut ctx = ProcessContext::new("front");
        ctx.set_base(json!({"kind": "Deployment"}));
        ctx.push_assist(Assist {
            definition: "scaler".to_string(),
            name: None,
            value: json!({"kind": "Scaler"}),
        });
        ctx.push_assist(Assist {
            definition: "expose".to_string(),
            name: Some("service".to_string()),
            value: json!({"kind": "Service"}),
        });

        assert_eq!(
            ctx.base_context(),
            json!({
                "name": "front",
                "output": {"kind": "Deployment"},
                "outputs": {"service": {"kind": "Service"}}
            })
        );
        let (base, assists) = ctx.output();
        assert_eq!(base, Some(&json!({"kind": "Deployment"})));
        assert_eq!(assists.len(), 2);
        assert_eq!(assists[0].definition, "scaler");
    }
}
