use crate::browser::keys::KeyCombo;
use crate::core::PageTrait;
use crate::dom::{Element, ElementTarget, Registry};
use crate::errors::{BrowserAgentError, Result};
use crate::types::{BackendNodeId, MouseEvent, Point, Viewport};
use crate::utils::javascript::{ELEMENT_CLICK_SCRIPT, FRAME_ACTION_SCRIPT, SELECT_OPTION_SCRIPT};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SCROLL_SETTLE_MS: u64 = 100;

/// Ways to click a main-frame element, tried in order until one lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    Pointer,
    Script,
    FocusEnter,
}

impl ClickStrategy {
    pub const ORDER: [ClickStrategy; 3] = [
        ClickStrategy::Pointer,
        ClickStrategy::Script,
        ClickStrategy::FocusEnter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ClickStrategy::Pointer => "pointer",
            ClickStrategy::Script => "script",
            ClickStrategy::FocusEnter => "focus+enter",
        }
    }

    /// `Ok(false)` means this strategy does not apply to the node; only a
    /// lost session is an error.
    pub async fn attempt<P: PageTrait>(&self, page: &P, node: BackendNodeId) -> Result<bool> {
        let outcome = match self {
            ClickStrategy::Pointer => match element_center(page, node).await? {
                Some(point) => pointer_click(page, point).await.map(|_| true),
                None => Ok(false),
            },
            ClickStrategy::Script => match page.resolve_node(node).await? {
                Some(object_id) => page
                    .call_function_on(&object_id, ELEMENT_CLICK_SCRIPT, vec![])
                    .await
                    .map(|_| true),
                None => Ok(false),
            },
            ClickStrategy::FocusEnter => match page.focus_node(node).await {
                Ok(()) => press(page, &KeyCombo::parse("Enter")?).await.map(|_| true),
                Err(e) => Err(e),
            },
        };
        tolerate(outcome, self.label())
    }
}

/// Ways to put keyboard focus on a main-frame element before text input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusStrategy {
    Pointer,
    FocusNode,
}

impl FocusStrategy {
    pub const ORDER: [FocusStrategy; 2] = [FocusStrategy::Pointer, FocusStrategy::FocusNode];

    pub async fn attempt<P: PageTrait>(&self, page: &P, node: BackendNodeId) -> Result<bool> {
        let outcome = match self {
            FocusStrategy::Pointer => match element_center(page, node).await? {
                Some(point) => pointer_click(page, point).await.map(|_| true),
                None => Ok(false),
            },
            FocusStrategy::FocusNode => page.focus_node(node).await.map(|_| true),
        };
        tolerate(outcome, "focus")
    }
}

fn tolerate(outcome: Result<bool>, what: &str) -> Result<bool> {
    match outcome {
        Err(e) if e.is_session_lost() => Err(e),
        Err(e) => {
            debug!("{} strategy failed: {}", what, e);
            Ok(false)
        }
        ok => ok,
    }
}

/// Scrolls the node into view and returns its center, `None` when it has no
/// usable geometry.
pub async fn element_center<P: PageTrait>(page: &P, node: BackendNodeId) -> Result<Option<Point>> {
    match page.scroll_into_view(node).await {
        Ok(()) => tokio::time::sleep(Duration::from_millis(SCROLL_SETTLE_MS)).await,
        Err(e) if e.is_session_lost() => return Err(e),
        Err(e) => debug!("scroll into view failed for node {}: {}", node, e),
    }
    Ok(page.box_model(node).await?.and_then(|quad| quad.center()))
}

async fn pointer_click<P: PageTrait>(page: &P, point: Point) -> Result<()> {
    page.dispatch_mouse(MouseEvent::moved(point)).await?;
    page.dispatch_mouse(MouseEvent::pressed(point)).await?;
    page.dispatch_mouse(MouseEvent::released(point)).await
}

async fn press<P: PageTrait>(page: &P, combo: &KeyCombo) -> Result<()> {
    for event in combo.events() {
        page.dispatch_key(event).await?;
    }
    Ok(())
}

fn shown_text(element: &Element, text: &str) -> String {
    if element.is_password() {
        "*".repeat(text.chars().count().min(8))
    } else {
        format!("{:?}", text)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrameActionReply {
    ok: bool,
    error: Option<String>,
}

/// Acts on elements of the current registry. Every lookup is scoped to the
/// page the registry was built for.
pub struct InteractionEngine<'a, P: PageTrait> {
    page: &'a P,
    registry: &'a Registry,
}

impl<'a, P: PageTrait> InteractionEngine<'a, P> {
    pub fn new(page: &'a P, registry: &'a Registry) -> Self {
        Self { page, registry }
    }

    pub fn lookup(&self, reference: u32) -> Result<&'a Element> {
        self.registry.resolve(reference, &self.page.page_id())
    }

    async fn frame_action(&self, element: &Element, action: &str, value: Option<&str>, label: Option<&str>) -> Result<()> {
        let ElementTarget::Frame { index, selector } = &element.target else {
            return Err(BrowserAgentError::ElementUnresolvable(format!(
                "[{}] is not a frame element",
                element.reference
            )));
        };
        let args = json!({ "selector": selector, "action": action, "value": value, "label": label });
        let raw = self.page.call_in_frame(*index, FRAME_ACTION_SCRIPT, args).await?;
        let reply: FrameActionReply = serde_json::from_value(raw).unwrap_or_default();
        if reply.ok {
            Ok(())
        } else {
            Err(BrowserAgentError::ElementUnresolvable(format!(
                "[{}] in frame {}: {}",
                element.reference,
                index,
                reply.error.unwrap_or_else(|| "no reply".to_string())
            )))
        }
    }

    async fn focus(&self, element: &Element) -> Result<()> {
        match element.target {
            ElementTarget::Node(node) => {
                for strategy in FocusStrategy::ORDER {
                    if strategy.attempt(self.page, node).await? {
                        return Ok(());
                    }
                }
                Err(BrowserAgentError::ElementUnresolvable(format!(
                    "could not focus [{}] {}",
                    element.reference,
                    element.describe()
                )))
            }
            ElementTarget::Frame { .. } => self.frame_action(element, "focus", None, None).await,
        }
    }

    pub async fn click(&self, reference: u32) -> Result<String> {
        let element = self.lookup(reference)?;
        let method = match element.target {
            ElementTarget::Node(node) => {
                let mut landed = None;
                for strategy in ClickStrategy::ORDER {
                    if strategy.attempt(self.page, node).await? {
                        landed = Some(strategy.label());
                        break;
                    }
                }
                landed.ok_or_else(|| {
                    BrowserAgentError::ElementUnresolvable(format!(
                        "could not click [{}] {}",
                        reference,
                        element.describe()
                    ))
                })?
            }
            ElementTarget::Frame { .. } => {
                self.frame_action(element, "click", None, None).await?;
                "frame"
            }
        };
        debug!("clicked [{}] via {}", reference, method);
        Ok(format!("Clicked [{}] {} ({})", reference, element.describe(), method))
    }

    pub async fn fill(&self, reference: u32, text: &str) -> Result<String> {
        let element = self.lookup(reference)?;
        match element.target {
            ElementTarget::Node(_) => {
                self.focus(element).await?;
                press(self.page, &KeyCombo::parse("Control+a")?).await?;
                press(self.page, &KeyCombo::parse("Delete")?).await?;
            }
            ElementTarget::Frame { .. } => self.frame_action(element, "clear", None, None).await?,
        }
        self.page.insert_text(text).await?;
        Ok(format!("Filled [{}] {} with {}", reference, element.describe(), shown_text(element, text)))
    }

    pub async fn type_text(&self, reference: u32, text: &str) -> Result<String> {
        let element = self.lookup(reference)?;
        self.focus(element).await?;
        self.page.insert_text(text).await?;
        Ok(format!("Typed {} into [{}] {}", shown_text(element, text), reference, element.describe()))
    }

    pub async fn hover(&self, reference: u32) -> Result<String> {
        let element = self.lookup(reference)?;
        match element.target {
            ElementTarget::Node(node) => {
                let point = element_center(self.page, node).await?.ok_or_else(|| {
                    BrowserAgentError::ElementUnresolvable(format!("no coordinates for [{}]", reference))
                })?;
                self.page.dispatch_mouse(MouseEvent::moved(point)).await?;
            }
            ElementTarget::Frame { .. } => self.frame_action(element, "hover", None, None).await?,
        }
        Ok(format!("Hovering over [{}] {}", reference, element.describe()))
    }

    /// Selects by option value when `value` is given, otherwise by visible label.
    pub async fn select_option(&self, reference: u32, value: Option<&str>, label: Option<&str>) -> Result<String> {
        let element = self.lookup(reference)?;
        let wanted = value.or(label).ok_or_else(|| {
            BrowserAgentError::InvalidParams("selectOption needs value=... or text=...".to_string())
        })?;
        let label = if value.is_some() { None } else { label };

        match element.target {
            ElementTarget::Node(node) => {
                let object_id = self.page.resolve_node(node).await?.ok_or_else(|| {
                    BrowserAgentError::ElementUnresolvable(format!("could not resolve [{}]", reference))
                })?;
                let args = vec![
                    value.map_or(Value::Null, |v| Value::String(v.to_string())),
                    label.map_or(Value::Null, |l| Value::String(l.to_string())),
                ];
                let matched = self.page.call_function_on(&object_id, SELECT_OPTION_SCRIPT, args).await?;
                if matched != Value::Bool(true) {
                    return Err(BrowserAgentError::InvalidParams(format!(
                        "no option {:?} in [{}]",
                        wanted, reference
                    )));
                }
            }
            ElementTarget::Frame { .. } => self.frame_action(element, "select", value, label).await?,
        }
        Ok(format!("Selected {:?} in [{}] {}", wanted, reference, element.describe()))
    }

    pub async fn upload_file(&self, reference: u32, path: &Path) -> Result<String> {
        let element = self.lookup(reference)?;
        if !tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(BrowserAgentError::FileNotFound(path.display().to_string()));
        }
        let absolute = tokio::fs::canonicalize(path).await?;

        let ElementTarget::Node(node) = element.target else {
            return Err(BrowserAgentError::ElementUnresolvable(format!(
                "[{}] is inside a frame; file inputs there cannot be set",
                reference
            )));
        };
        self.page
            .set_file_input_files(node, vec![absolute.display().to_string()])
            .await?;
        Ok(format!("Uploaded {} to [{}]", absolute.display(), reference))
    }
}

pub async fn press_key<P: PageTrait>(page: &P, key: &str) -> Result<String> {
    let combo = KeyCombo::parse(key)?;
    press(page, &combo).await?;
    Ok(format!("Pressed {}", key))
}

pub async fn scroll<P: PageTrait>(page: &P, viewport: Viewport, direction: &str, amount: i64) -> Result<String> {
    let delta = match direction.to_ascii_lowercase().as_str() {
        "down" => amount as f64,
        "up" => -(amount as f64),
        other => {
            return Err(BrowserAgentError::InvalidParams(format!(
                "scroll direction must be up or down, got '{}'",
                other
            )))
        }
    };
    page.dispatch_mouse(MouseEvent::wheel(viewport.center(), delta)).await?;
    tokio::time::sleep(Duration::from_millis(SCROLL_SETTLE_MS)).await;
    Ok(format!("Scrolled {} {}px", direction.to_ascii_lowercase(), amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Element;
    use crate::testing::FakePage;
    use crate::types::{KeyEventKind, MouseEventKind, Quad};

    fn registry_for(page: &FakePage, elements: Vec<Element>) -> Registry {
        let mut registry = Registry::new(page.page_id());
        for el in elements {
            registry.push(el);
        }
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_uses_pointer_events_at_center() {
        let page = FakePage::new("https://a.test/");
        page.set_box(7, Quad::from_rect(100.0, 200.0, 50.0, 20.0));
        let registry = registry_for(&page, vec![Element::new(0, "button", "Go", ElementTarget::Node(7))]);

        let msg = InteractionEngine::new(&page, &registry).click(1).await.unwrap();
        assert!(msg.contains("(pointer)"));

        let kinds: Vec<_> = page.mouse_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![MouseEventKind::Moved, MouseEventKind::Pressed, MouseEventKind::Released]);
        assert_eq!(page.mouse_events()[1].point, Point { x: 125.0, y: 210.0 });
        assert_eq!(page.mouse_events()[1].buttons, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_falls_back_to_script_then_focus_enter() {
        let page = FakePage::new("https://a.test/");
        page.set_resolvable(8, true);
        let registry = registry_for(
            &page,
            vec![
                Element::new(0, "link", "Scripted", ElementTarget::Node(8)),
                Element::new(0, "link", "Keyboard", ElementTarget::Node(9)),
            ],
        );
        let engine = InteractionEngine::new(&page, &registry);

        assert!(engine.click(1).await.unwrap().contains("(script)"));
        assert!(page.mouse_events().is_empty());

        assert!(engine.click(2).await.unwrap().contains("(focus+enter)"));
        let keys = page.key_events();
        assert_eq!(keys.len(), 2);
        assert_eq!((keys[0].kind, keys[0].key_code), (KeyEventKind::KeyDown, 13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_with_no_strategy_is_unresolvable() {
        let page = FakePage::new("https://a.test/");
        page.set_focusable(9, false);
        let registry = registry_for(&page, vec![Element::new(0, "link", "Ghost", ElementTarget::Node(9))]);

        let err = InteractionEngine::new(&page, &registry).click(1).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::ElementUnresolvable(_)));
    }

    #[tokio::test]
    async fn test_unknown_ref_fails_fast_without_input() {
        let page = FakePage::new("https://a.test/");
        let registry = registry_for(&page, vec![Element::new(0, "button", "Go", ElementTarget::Node(7))]);

        let err = InteractionEngine::new(&page, &registry).click(999).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::RefNotFound(999)));
        assert!(page.mouse_events().is_empty());
    }

    #[tokio::test]
    async fn test_registry_of_another_page_resolves_nothing() {
        let page = FakePage::new("https://a.test/");
        let mut registry = Registry::new("some-other-page");
        registry.push(Element::new(0, "button", "Go", ElementTarget::Node(7)));

        let err = InteractionEngine::new(&page, &registry).click(1).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::RefNotFound(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_clears_then_inserts_text() {
        let page = FakePage::new("https://a.test/");
        page.set_box(3, Quad::from_rect(10.0, 10.0, 100.0, 20.0));
        page.set_value(3, "old");
        let registry = registry_for(&page, vec![Element::new(0, "textbox", "Email", ElementTarget::Node(3))]);

        InteractionEngine::new(&page, &registry).fill(1, "alice").await.unwrap();
        assert_eq!(page.value_of(3), "alice");

        let keys: Vec<_> = page
            .key_events()
            .into_iter()
            .filter(|k| k.kind == KeyEventKind::KeyDown)
            .map(|k| (k.key, k.modifiers))
            .collect();
        assert_eq!(keys, vec![("a".to_string(), 2), ("Delete".to_string(), 0)]);
        assert_eq!(page.inserted_text(), vec!["alice"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_appends_without_clearing() {
        let page = FakePage::new("https://a.test/");
        page.set_value(3, "hello");
        let registry = registry_for(&page, vec![Element::new(0, "textbox", "Note", ElementTarget::Node(3))]);

        InteractionEngine::new(&page, &registry).type_text(1, " world").await.unwrap();
        assert_eq!(page.value_of(3), "hello world");
        assert!(page.key_events().is_empty());
    }

    #[tokio::test]
    async fn test_frame_click_passes_selector_as_argument() {
        let page = FakePage::new("https://mail.test/");
        page.add_frame(
            "https://mail.test/compose",
            json!([{ "role": "button", "name": "Send", "selector": "button[aria-label=\"Send\"]" }]),
        );
        let registry = registry_for(
            &page,
            vec![Element::new(
                0,
                "button",
                "Send",
                ElementTarget::Frame {
                    index: 1,
                    selector: "button[aria-label=\"Send\"]".to_string(),
                },
            )],
        );

        let msg = InteractionEngine::new(&page, &registry).click(1).await.unwrap();
        assert!(msg.contains("(frame)"));

        let calls = page.frame_calls();
        assert_eq!(calls[0].0, 1);
        assert_eq!(calls[0].2["selector"], "button[aria-label=\"Send\"]");
        assert_eq!(calls[0].2["action"], "click");
        assert!(page.mouse_events().is_empty());
    }

    #[tokio::test]
    async fn test_select_option_by_label() {
        let page = FakePage::new("https://a.test/");
        page.set_resolvable(4, true);
        page.set_options(4, &[("us", "United States"), ("fr", "France")]);
        let registry = registry_for(&page, vec![Element::new(0, "combobox", "Country", ElementTarget::Node(4))]);
        let engine = InteractionEngine::new(&page, &registry);

        engine.select_option(1, None, Some("France")).await.unwrap();
        assert_eq!(page.value_of(4), "fr");

        engine.select_option(1, Some("us"), None).await.unwrap();
        assert_eq!(page.value_of(4), "us");

        let err = engine.select_option(1, Some("de"), None).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_upload_checks_file_exists() {
        let page = FakePage::new("https://a.test/");
        let registry = registry_for(&page, vec![Element::new(0, "button", "Choose file", ElementTarget::Node(5))]);
        let engine = InteractionEngine::new(&page, &registry);

        let err = engine.upload_file(1, Path::new("/definitely/missing.pdf")).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::FileNotFound(_)));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cv.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        engine.upload_file(1, &file).await.unwrap();

        let uploads = page.uploaded_files(5);
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].ends_with("cv.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_directions() {
        let page = FakePage::new("https://a.test/");
        scroll(&page, Viewport::default(), "up", 600).await.unwrap();
        let wheel = &page.mouse_events()[0];
        assert_eq!(wheel.kind, MouseEventKind::Wheel);
        assert_eq!(wheel.delta_y, -600.0);
        assert_eq!(wheel.point, Point { x: 683.0, y: 384.0 });

        assert!(scroll(&page, Viewport::default(), "sideways", 10).await.is_err());
    }

    fn compose_frame(page: &FakePage) -> Registry {
        page.add_frame(
            "https://mail.test/compose",
            json!([
                { "role": "textbox", "name": "Subject", "selector": "#subject" },
                { "role": "button", "name": "Send", "selector": "body > button" },
            ]),
        );
        let in_frame = |role: &str, name: &str, selector: &str| {
            Element::new(
                0,
                role,
                name,
                ElementTarget::Frame {
                    index: 1,
                    selector: selector.to_string(),
                },
            )
        };
        registry_for(
            page,
            vec![
                in_frame("textbox", "Subject", "#subject"),
                in_frame("button", "Send", "body > button"),
                in_frame("button", "Gone", "#gone"),
            ],
        )
    }

    #[tokio::test]
    async fn test_frame_fill_clears_before_inserting() {
        let page = FakePage::new("https://mail.test/");
        let registry = compose_frame(&page);
        page.set_frame_value(1, "#subject", "Re: old draft");

        let msg = InteractionEngine::new(&page, &registry).fill(1, "Lunch?").await.unwrap();
        assert_eq!(msg, "Filled [1] Textbox: \"Subject\" with \"Lunch?\"");
        assert_eq!(page.frame_value(1, "#subject").as_deref(), Some("Lunch?"));

        let actions: Vec<_> = page.frame_calls().iter().map(|c| c.2["action"].clone()).collect();
        assert_eq!(actions, vec![json!("clear")]);
        assert_eq!(page.inserted_text(), vec!["Lunch?"]);
    }

    #[tokio::test]
    async fn test_frame_type_focuses_and_appends() {
        let page = FakePage::new("https://mail.test/");
        let registry = compose_frame(&page);
        page.set_frame_value(1, "#subject", "Hello");

        InteractionEngine::new(&page, &registry).type_text(1, " there").await.unwrap();
        assert_eq!(page.frame_value(1, "#subject").as_deref(), Some("Hello there"));
        assert_eq!(page.frame_calls()[0].2["action"], "focus");
    }

    #[tokio::test]
    async fn test_frame_hover_targets_its_selector() {
        let page = FakePage::new("https://mail.test/");
        let registry = compose_frame(&page);

        let msg = InteractionEngine::new(&page, &registry).hover(2).await.unwrap();
        assert_eq!(msg, "Hovering over [2] Button: \"Send\"");
        assert_eq!(page.frame_hovered(), Some((1, "body > button".to_string())));
        assert!(page.mouse_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_moves_pointer_to_center() {
        let page = FakePage::new("https://a.test/");
        page.set_box(4, Quad::from_rect(0.0, 0.0, 40.0, 40.0));
        let registry = registry_for(&page, vec![Element::new(0, "menuitem", "Account", ElementTarget::Node(4))]);

        let msg = InteractionEngine::new(&page, &registry).hover(1).await.unwrap();
        assert!(msg.starts_with("Hovering over [1]"));
        let events = page.mouse_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MouseEventKind::Moved);
        assert_eq!(events[0].point, Point { x: 20.0, y: 20.0 });
    }

    #[tokio::test]
    async fn test_failed_frame_action_is_an_error() {
        let page = FakePage::new("https://mail.test/");
        let registry = compose_frame(&page);
        page.fail_frame_action(1, "body > button", "element is detached");
        let engine = InteractionEngine::new(&page, &registry);

        let err = engine.click(2).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::ElementUnresolvable(_)));
        assert!(err.to_string().contains("element is detached"));

        let err = engine.fill(3, "x").await.unwrap_err();
        assert!(err.to_string().contains("no element matches #gone"));
        assert!(page.inserted_text().is_empty());
    }
}
