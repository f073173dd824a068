use crate::dom::AxNode;
use crate::errors::Result;
use crate::types::{BackendNodeId, FrameInfo, KeyEvent, MouseEvent, Quad};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// One tab and the protocol session attached to it.
///
/// Every call is a single bounded protocol round-trip; callers compose them
/// into interactions and waits.
#[async_trait]
pub trait PageTrait: Send + Sync {
    /// Stable identity of the underlying page (target id). Registries are
    /// scoped to it.
    fn page_id(&self) -> String;

    /// Cheap round-trip proving the protocol session still answers
    async fn ping(&self) -> Result<()>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Start a navigation and wait for the document to commit
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate an expression in the main frame, awaiting promises and
    /// returning the value as JSON
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>>;

    /// Child frames in document order, indexed from 1
    async fn child_frames(&self) -> Result<Vec<FrameInfo>>;

    /// Call `function` inside frame `frame_index` (0 is the main frame) with
    /// `args` passed as one structured argument
    async fn call_in_frame(&self, frame_index: usize, function: &str, args: Value)
        -> Result<Value>;

    async fn scroll_into_view(&self, node: BackendNodeId) -> Result<()>;

    /// Content quad of the node, `None` when it has no layout box
    async fn box_model(&self, node: BackendNodeId) -> Result<Option<Quad>>;

    /// Script object id for the node, `None` when it cannot be resolved
    async fn resolve_node(&self, node: BackendNodeId) -> Result<Option<String>>;

    /// Call `function` with `this` bound to `object_id`
    async fn call_function_on(&self, object_id: &str, function: &str, args: Vec<Value>)
        -> Result<Value>;

    /// `type` attribute of every `<input>` in the main document, in one
    /// round-trip
    async fn input_types(&self) -> Result<HashMap<BackendNodeId, String>>;

    async fn focus_node(&self, node: BackendNodeId) -> Result<()>;

    async fn set_file_input_files(&self, node: BackendNodeId, files: Vec<String>) -> Result<()>;

    async fn dispatch_mouse(&self, event: MouseEvent) -> Result<()>;

    async fn dispatch_key(&self, event: KeyEvent) -> Result<()>;

    /// Composition-style text insertion at the focused element
    async fn insert_text(&self, text: &str) -> Result<()>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn bring_to_front(&self) -> Result<()>;

    /// Stop the protocol domains this session enabled
    async fn detach(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
