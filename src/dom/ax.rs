//! Accessibility tree nodes as returned by `Accessibility.getFullAXTree`.

use crate::types::BackendNodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(rename = "backendDOMNodeId", default)]
    pub backend_dom_node_id: Option<BackendNodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxValue {
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

impl AxValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value_type: "string".to_string(),
            value: Some(Value::String(value.into())),
        }
    }

    fn as_text(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

impl AxNode {
    /// Lowercased role, e.g. `statictext` for Chrome's `StaticText`.
    pub fn role(&self) -> String {
        self.role
            .as_ref()
            .map(|v| v.as_text().to_lowercase())
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.name.as_ref().map(AxValue::as_text).unwrap_or_default()
    }

    pub fn value(&self) -> String {
        self.value.as_ref().map(AxValue::as_text).unwrap_or_default()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_text())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.property(name).as_deref() == Some("true")
    }

    /// A zero handle is what the protocol sends for nodes without a DOM backing.
    pub fn backend_id(&self) -> Option<BackendNodeId> {
        self.backend_dom_node_id.filter(|id| *id > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_protocol_shape() {
        let raw = r#"{
            "nodeId": "12",
            "ignored": false,
            "role": {"type": "role", "value": "StaticText"},
            "name": {"type": "computedString", "value": "  Sign in  "},
            "properties": [{"name": "focusable", "value": {"type": "booleanOrUndefined", "value": true}}],
            "childIds": ["13", "14"],
            "backendDOMNodeId": 77
        }"#;
        let node: AxNode = serde_json::from_str(raw).unwrap();
        assert_eq!(node.role(), "statictext");
        assert_eq!(node.name(), "Sign in");
        assert_eq!(node.child_ids, vec!["13", "14"]);
        assert_eq!(node.backend_id(), Some(77));
        assert!(node.flag("focusable"));
    }

    #[test]
    fn test_missing_fields_default() {
        let node: AxNode = serde_json::from_str(r#"{"nodeId": "1"}"#).unwrap();
        assert_eq!(node.role(), "");
        assert_eq!(node.name(), "");
        assert!(node.child_ids.is_empty());
        assert_eq!(node.backend_id(), None);
    }

    #[test]
    fn test_zero_backend_id_is_no_handle() {
        let node = AxNode {
            backend_dom_node_id: Some(0),
            ..Default::default()
        };
        assert_eq!(node.backend_id(), None);
    }
}
