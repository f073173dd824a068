//! Protocol commands sent through `Tab::call_method`.
//!
//! The generated command structs require every optional field, so the few
//! commands used here are declared directly with only the fields we send.

use crate::types::BackendNodeId;
use headless_chrome::protocol::cdp::types::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! command {
    ($ty:ident, $name:literal, $ret:ty) => {
        impl Method for $ty {
            const NAME: &'static str = $name;
            type ReturnObject = $ret;
        }
    };
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFullAxTree {}
command!(GetFullAxTree, "Accessibility.getFullAXTree", GetFullAxTreeReturn);

#[derive(Debug, Deserialize)]
pub struct GetFullAxTreeReturn {
    #[serde(default)]
    pub nodes: Vec<crate::dom::AxNode>,
}

#[derive(Debug, Serialize)]
pub struct AccessibilityDisable {}
command!(AccessibilityDisable, "Accessibility.disable", Value);

#[derive(Debug, Serialize)]
pub struct DomDisable {}
command!(DomDisable, "DOM.disable", Value);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollIntoViewIfNeeded {
    pub backend_node_id: BackendNodeId,
}
command!(ScrollIntoViewIfNeeded, "DOM.scrollIntoViewIfNeeded", Value);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxModel {
    pub backend_node_id: BackendNodeId,
}
command!(GetBoxModel, "DOM.getBoxModel", GetBoxModelReturn);

#[derive(Debug, Deserialize)]
pub struct GetBoxModelReturn {
    pub model: BoxModel,
}

#[derive(Debug, Deserialize)]
pub struct BoxModel {
    pub content: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct GetDocument {
    pub depth: i64,
    pub pierce: bool,
}
command!(GetDocument, "DOM.getDocument", GetDocumentReturn);

#[derive(Debug, Deserialize)]
pub struct GetDocumentReturn {
    pub root: DomNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub backend_node_id: BackendNodeId,
    #[serde(default)]
    pub local_name: String,
    /// Flat `[name, value, name, value, ...]` list.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .chunks(2)
            .find(|pair| pair.first().map(String::as_str) == Some(name))
            .and_then(|pair| pair.get(1).cloned())
    }

    /// `type` attribute of every `<input>` in this subtree.
    pub fn input_types(&self) -> Vec<(BackendNodeId, String)> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.local_name == "input" {
                if let Some(input_type) = node.attribute("type") {
                    found.push((node.backend_node_id, input_type));
                }
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNode {
    pub backend_node_id: BackendNodeId,
}
command!(ResolveNode, "DOM.resolveNode", ResolveNodeReturn);

#[derive(Debug, Deserialize)]
pub struct ResolveNodeReturn {
    pub object: RemoteObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Focus {
    pub backend_node_id: BackendNodeId,
}
command!(Focus, "DOM.focus", Value);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFileInputFiles {
    pub files: Vec<String>,
    pub backend_node_id: BackendNodeId,
}
command!(SetFileInputFiles, "DOM.setFileInputFiles", Value);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgument {
    pub value: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOn {
    pub function_declaration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<i64>,
    pub arguments: Vec<CallArgument>,
    pub return_by_value: bool,
    pub await_promise: bool,
}
command!(CallFunctionOn, "Runtime.callFunctionOn", EvaluateReturn);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    pub return_by_value: bool,
    pub await_promise: bool,
}
command!(Evaluate, "Runtime.evaluate", EvaluateReturn);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateReturn {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMouseEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub x: f64,
    pub y: f64,
    pub button: &'static str,
    pub buttons: u32,
    pub click_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
}
command!(DispatchMouseEvent, "Input.dispatchMouseEvent", Value);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchKeyEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub modifiers: u32,
    pub key: String,
    pub code: String,
    pub windows_virtual_key_code: u32,
    pub native_virtual_key_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
command!(DispatchKeyEvent, "Input.dispatchKeyEvent", Value);

#[derive(Debug, Serialize)]
pub struct InsertText {
    pub text: String,
}
command!(InsertText, "Input.insertText", Value);

#[derive(Debug, Serialize)]
pub struct GetFrameTree {}
command!(GetFrameTree, "Page.getFrameTree", GetFrameTreeReturn);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFrameTreeReturn {
    pub frame_tree: FrameTree,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    pub frame: FrameDescriptor,
    #[serde(default)]
    pub child_frames: Vec<FrameTree>,
}

#[derive(Debug, Deserialize)]
pub struct FrameDescriptor {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

impl FrameTree {
    /// Frames in document order, main frame first.
    pub fn flatten(&self) -> Vec<&FrameDescriptor> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            out.push(&tree.frame);
            stack.extend(tree.child_frames.iter().rev());
        }
        out
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIsolatedWorld {
    pub frame_id: String,
    pub world_name: String,
    // Protocol spelling.
    #[serde(rename = "grantUniveralAccess")]
    pub grant_universal_access: bool,
}
command!(CreateIsolatedWorld, "Page.createIsolatedWorld", CreateIsolatedWorldReturn);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIsolatedWorldReturn {
    pub execution_context_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_function_on_omits_absent_target() {
        let cmd = CallFunctionOn {
            function_declaration: "function () { return 1 }".into(),
            object_id: Some("obj-1".into()),
            execution_context_id: None,
            arguments: vec![CallArgument { value: serde_json::json!({"a": 1}) }],
            return_by_value: true,
            await_promise: true,
        };
        let raw = serde_json::to_value(&cmd).unwrap();
        assert_eq!(raw["objectId"], "obj-1");
        assert!(raw.get("executionContextId").is_none());
        assert_eq!(raw["arguments"][0]["value"]["a"], 1);
    }

    #[test]
    fn test_frame_tree_flattens_in_document_order() {
        let raw = serde_json::json!({
            "frameTree": {
                "frame": {"id": "main", "url": "https://a.test/"},
                "childFrames": [
                    {"frame": {"id": "f1", "url": "https://a.test/1"},
                     "childFrames": [{"frame": {"id": "f1a", "url": "https://a.test/1a"}}]},
                    {"frame": {"id": "f2", "url": "https://a.test/2"}}
                ]
            }
        });
        let tree: GetFrameTreeReturn = serde_json::from_value(raw).unwrap();
        let ids: Vec<_> = tree.frame_tree.flatten().iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec!["main", "f1", "f1a", "f2"]);
    }

    #[test]
    fn test_document_input_types() {
        let raw = serde_json::json!({
            "root": {
                "backendNodeId": 1, "localName": "",
                "children": [{
                    "backendNodeId": 2, "localName": "form",
                    "attributes": ["id", "login"],
                    "children": [
                        {"backendNodeId": 3, "localName": "input", "attributes": ["name", "user"]},
                        {"backendNodeId": 4, "localName": "input", "attributes": ["name", "pw", "type", "password"]},
                        {"backendNodeId": 5, "localName": "input", "attributes": ["type", "email"]}
                    ]
                }]
            }
        });
        let document: GetDocumentReturn = serde_json::from_value(raw).unwrap();
        assert_eq!(
            document.root.input_types(),
            vec![(4, "password".to_string()), (5, "email".to_string())]
        );
        assert_eq!(document.root.children[0].attribute("id").as_deref(), Some("login"));
    }
}
