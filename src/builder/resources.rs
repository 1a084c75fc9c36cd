//! Resource documents produced by the builder

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const API_VERSION: &str = "core.oam.dev/v1alpha2";
pub const COMPONENT_KIND: &str = "Component";
pub const APPLICATION_CONFIGURATION_KIND: &str = "ApplicationConfiguration";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Primary resource wrapping one rendered workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ComponentSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub workload: JsonValue,
}

impl Component {
    pub fn new(workload: JsonValue) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: COMPONENT_KIND.to_string(),
            metadata: ObjectMeta::default(),
            spec: ComponentSpec { workload },
        }
    }
}

/// Binds each component of an application to its traits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfiguration {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ApplicationConfigurationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfigurationSpec {
    pub components: Vec<ApplicationConfigurationComponent>,
}

impl ApplicationConfiguration {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: APPLICATION_CONFIGURATION_KIND.to_string(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                labels: BTreeMap::new(),
            },
            spec: ApplicationConfigurationSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfigurationComponent {
    pub component_name: String,
    pub traits: Vec<ComponentTrait>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTrait {
    #[serde(rename = "trait")]
    pub object: JsonValue,
}

/// `v1/List` holding the components followed by the configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub api_version: String,
    pub kind: String,
    pub items: Vec<JsonValue>,
}

impl ManifestList {
    pub fn new(
        appconfig: &ApplicationConfiguration,
        components: &[Component],
    ) -> Result<Self, serde_json::Error> {
        let mut items = Vec::with_capacity(components.len() + 1);
        for component in components {
            items.push(serde_json::to_value(component)?);
        }
        items.push(serde_json::to_value(appconfig)?);
        Ok(Self {
            api_version: "v1".to_string(),
            kind: "List".to_string(),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_component_serializes_camel_case() {
        let mut component = Component::new(json!({"kind": "Deployment"}));
        component.metadata.name = "front".to_string();
        component.metadata.namespace = "default".to_string();
        assert_eq!(
            serde_json::to_value(&component).unwrap(),
            json!({
                "apiVersion": "core.oam.dev/v1alpha2",
                "kind": "Component",
                "metadata": {"name": "front", "namespace": "default"},
                "spec": {"workload": {"kind": "Deployment"}}
            })
        );
    }

    #[test]
    fn test_trait_entry_uses_trait_key() {
        let binding = ApplicationConfigurationComponent {
            component_name: "front".to_string(),
            traits: vec![ComponentTrait {
                object: json!({"kind": "Scaler"}),
            }],
        };
        assert_eq!(
            serde_json::to_value(&binding).unwrap(),
            json!({"componentName": "front", "traits": [{"trait": {"kind": "Scaler"}}]})
        );
    }

    #[test]
    fn test_manifest_list_puts_configuration_last() {
        let appconfig = ApplicationConfiguration::new("web", "default");
        let components = vec![Component::new(json!({})), Component::new(json!({}))];
        let list = ManifestList::new(&appconfig, &components).unwrap();
        assert_eq!(list.items.len(), 3);
        assert_eq!(list.items[2]["kind"], json!("ApplicationConfiguration"));
    }
}
