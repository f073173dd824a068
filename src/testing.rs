//! Scripted stand-ins for the browser seams.
//!
//! `FakePage` keeps a small model of one tab: the accessibility tree per URL,
//! layout boxes, input values, focus, child frames and history. It records
//! every input event so tests can assert on exactly what reached the page.
//! `FakeBrowser` owns a list of such tabs and counts launches and teardowns.

use crate::core::{BrowserTrait, Config, PageTrait};
use crate::dom::iframe::FRAME_SCAN_SCRIPT;
use crate::dom::{AxNode, AxValue};
use crate::errors::{BrowserAgentError, Result};
use crate::types::{BackendNodeId, FrameInfo, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, Point, Quad};
use crate::utils::javascript::{
    DISMISS_BANNERS_SCRIPT, ELEMENT_CLICK_SCRIPT, FRAME_ACTION_SCRIPT, FRAME_TEXT_SCRIPT, HISTORY_BACK_SCRIPT,
    HISTORY_FORWARD_SCRIPT, LOAD_STATE_PROBE, SELECTOR_PRESENT_SCRIPT, SELECT_OPTION_SCRIPT,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_PAGE: AtomicUsize = AtomicUsize::new(1);

pub fn ax_node(id: &str, role: &str, name: &str, backend: Option<BackendNodeId>, children: &[&str]) -> AxNode {
    AxNode {
        node_id: id.to_string(),
        role: Some(AxValue {
            value_type: "role".to_string(),
            value: Some(Value::String(role.to_string())),
        }),
        name: (!name.is_empty()).then(|| AxValue::string(name)),
        child_ids: children.iter().map(|c| c.to_string()).collect(),
        backend_dom_node_id: backend,
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default)]
struct Site {
    title: String,
    nodes: Vec<AxNode>,
}

type Sites = Arc<Mutex<HashMap<String, Site>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct PageState {
    id: String,
    url: String,
    title: String,
    nodes: Vec<AxNode>,
    tree_fails: bool,
    tree_stalls: bool,
    fail_next_navigation: bool,
    history: Vec<String>,
    history_pos: usize,

    ready_state: String,
    pending: u64,

    boxes: HashMap<BackendNodeId, Quad>,
    values: HashMap<BackendNodeId, String>,
    attributes: HashMap<(BackendNodeId, String), String>,
    resolvable: HashSet<BackendNodeId>,
    unfocusable: HashSet<BackendNodeId>,
    options: HashMap<BackendNodeId, Vec<(String, String)>>,
    click_targets: HashMap<BackendNodeId, String>,
    uploads: HashMap<BackendNodeId, Vec<String>>,
    focused: Option<BackendNodeId>,
    select_all: bool,

    frames: Vec<(FrameInfo, Value)>,
    frame_texts: HashMap<usize, String>,
    frame_calls: Vec<(usize, String, Value)>,
    frame_focused: Option<(usize, String)>,
    frame_values: HashMap<(usize, String), String>,
    frame_hovered: Option<(usize, String)>,
    frame_failures: HashMap<(usize, String), String>,
    selector_probes: HashMap<String, usize>,
    banner: bool,

    mouse_events: Vec<MouseEvent>,
    key_events: Vec<KeyEvent>,
    inserted: Vec<String>,
    detached: usize,
    input_type_calls: usize,
    closed: bool,
}

impl PageState {
    fn go(&mut self, url: &str, sites: &Sites) {
        self.history.truncate(self.history_pos + 1);
        self.history.push(url.to_string());
        self.history_pos = self.history.len() - 1;
        self.load(url, sites);
    }

    fn load(&mut self, url: &str, sites: &Sites) {
        self.url = url.to_string();
        let site = lock(sites).get(url).cloned().unwrap_or_default();
        self.title = site.title;
        self.nodes = site.nodes;
        self.values.clear();
        self.focused = None;
        self.frame_focused = None;
        self.select_all = false;
    }

    fn node_at(&self, point: Point) -> Option<BackendNodeId> {
        self.boxes.iter().find_map(|(id, quad)| {
            let xs = quad.0.iter().step_by(2);
            let ys = quad.0.iter().skip(1).step_by(2);
            let (min_x, max_x) = xs.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
            let (min_y, max_y) = ys.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
            (point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y).then_some(*id)
        })
    }

    fn frame_has(&self, index: usize, selector: &str) -> bool {
        index
            .checked_sub(1)
            .and_then(|i| self.frames.get(i))
            .and_then(|(_, scan)| scan.as_array())
            .is_some_and(|found| found.iter().any(|el| el["selector"] == selector))
    }

    fn focus_frame(&mut self, key: (usize, String)) {
        self.focused = None;
        self.select_all = false;
        self.frame_focused = Some(key);
    }

    fn activate(&mut self, node: BackendNodeId, sites: &Sites) {
        self.focused = Some(node);
        self.frame_focused = None;
        if let Some(target) = self.click_targets.get(&node).cloned() {
            self.go(&target, sites);
        }
    }
}

/// One scripted tab. Clones share the tab; `reattached` clones get a fresh
/// protocol session.
#[derive(Debug, Clone)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
    sites: Sites,
    session_alive: Arc<AtomicBool>,
}

impl FakePage {
    pub const SCREENSHOT_BYTES: &'static [u8] = b"\x89PNG\r\n\x1a\nfake";

    pub fn new(url: &str) -> Self {
        Self::with_sites(url, Arc::new(Mutex::new(HashMap::new())))
    }

    fn with_sites(url: &str, sites: Sites) -> Self {
        let mut state = PageState {
            id: format!("page-{}", NEXT_PAGE.fetch_add(1, Ordering::SeqCst)),
            ready_state: "complete".to_string(),
            ..Default::default()
        };
        state.go(url, &sites);
        Self {
            state: Arc::new(Mutex::new(state)),
            sites,
            session_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn sibling(&self, url: &str) -> Self {
        Self::with_sites(url, self.sites.clone())
    }

    /// Same tab, new protocol session.
    pub fn reattached(&self) -> Self {
        Self {
            state: self.state.clone(),
            sites: self.sites.clone(),
            session_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        lock(&self.state)
    }

    fn alive(&self) -> Result<()> {
        if self.state().closed {
            return Err(BrowserAgentError::ProtocolSessionLost("target closed".to_string()));
        }
        if !self.session_alive.load(Ordering::SeqCst) {
            return Err(BrowserAgentError::ProtocolSessionLost("connection closed".to_string()));
        }
        Ok(())
    }

    pub fn add_site(&self, url: &str, title: &str, nodes: Vec<AxNode>) {
        lock(&self.sites).insert(
            url.to_string(),
            Site {
                title: title.to_string(),
                nodes: nodes.clone(),
            },
        );
        let mut state = self.state();
        if state.url == url {
            state.title = title.to_string();
            state.nodes = nodes;
        }
    }

    pub fn set_tree(&self, nodes: Vec<AxNode>) {
        let (url, title) = {
            let state = self.state();
            (state.url.clone(), state.title.clone())
        };
        self.add_site(&url, &title, nodes);
    }

    pub fn set_tree_failing(&self, failing: bool) {
        self.state().tree_fails = failing;
    }

    /// The tree fetch never answers.
    pub fn stall_tree(&self) {
        self.state().tree_stalls = true;
    }

    pub fn fail_next_navigation(&self) {
        self.state().fail_next_navigation = true;
    }

    pub fn set_url(&self, url: &str) {
        self.state().url = url.to_string();
    }

    pub fn set_load_state(&self, ready_state: &str, pending: u64) {
        let mut state = self.state();
        state.ready_state = ready_state.to_string();
        state.pending = pending;
    }

    pub fn set_box(&self, node: BackendNodeId, quad: Quad) {
        self.state().boxes.insert(node, quad);
    }

    pub fn set_value(&self, node: BackendNodeId, value: &str) {
        self.state().values.insert(node, value.to_string());
    }

    pub fn value_of(&self, node: BackendNodeId) -> String {
        self.state().values.get(&node).cloned().unwrap_or_default()
    }

    pub fn set_attribute(&self, node: BackendNodeId, name: &str, value: &str) {
        self.state().attributes.insert((node, name.to_string()), value.to_string());
    }

    pub fn set_resolvable(&self, node: BackendNodeId, resolvable: bool) {
        let mut state = self.state();
        if resolvable {
            state.resolvable.insert(node);
        } else {
            state.resolvable.remove(&node);
        }
    }

    pub fn set_focusable(&self, node: BackendNodeId, focusable: bool) {
        let mut state = self.state();
        if focusable {
            state.unfocusable.remove(&node);
        } else {
            state.unfocusable.insert(node);
        }
    }

    pub fn set_options(&self, node: BackendNodeId, options: &[(&str, &str)]) {
        self.state().options.insert(
            node,
            options.iter().map(|(v, l)| (v.to_string(), l.to_string())).collect(),
        );
    }

    /// Activating `node` (click or Enter) navigates to `url`.
    pub fn on_click_navigate(&self, node: BackendNodeId, url: &str) {
        self.state().click_targets.insert(node, url.to_string());
    }

    /// Appends a child frame whose element scan answers `scan`. Frames are
    /// indexed from 1 in insertion order.
    pub fn add_frame(&self, url: &str, scan: Value) {
        let mut state = self.state();
        let index = state.frames.len() + 1;
        state.frames.push((
            FrameInfo {
                index,
                url: url.to_string(),
            },
            scan,
        ));
    }

    /// Value of the field `selector` names in frame `index`.
    pub fn frame_value(&self, index: usize, selector: &str) -> Option<String> {
        self.state().frame_values.get(&(index, selector.to_string())).cloned()
    }

    pub fn set_frame_value(&self, index: usize, selector: &str, value: &str) {
        self.state()
            .frame_values
            .insert((index, selector.to_string()), value.to_string());
    }

    pub fn frame_hovered(&self) -> Option<(usize, String)> {
        self.state().frame_hovered.clone()
    }

    /// The in-frame action on `selector` answers `{ok: false, error}`.
    pub fn fail_frame_action(&self, index: usize, selector: &str, error: &str) {
        self.state()
            .frame_failures
            .insert((index, selector.to_string()), error.to_string());
    }

    pub fn set_frame_text(&self, index: usize, text: &str) {
        self.state().frame_texts.insert(index, text.to_string());
    }

    /// The selector probe answers true from the `probes`-th call on.
    pub fn set_selector_present_after(&self, selector: &str, probes: usize) {
        self.state().selector_probes.insert(selector.to_string(), probes.max(1));
    }

    pub fn show_consent_banner(&self) {
        self.state().banner = true;
    }

    pub fn banner_visible(&self) -> bool {
        self.state().banner
    }

    /// Drops this handle's protocol session; the tab itself stays open.
    pub fn kill_session(&self) {
        self.session_alive.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn frame_calls(&self) -> Vec<(usize, String, Value)> {
        self.state().frame_calls.clone()
    }

    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.state().mouse_events.clone()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.state().key_events.clone()
    }

    pub fn inserted_text(&self) -> Vec<String> {
        self.state().inserted.clone()
    }

    pub fn uploaded_files(&self, node: BackendNodeId) -> Vec<String> {
        self.state().uploads.get(&node).cloned().unwrap_or_default()
    }

    pub fn input_type_calls(&self) -> usize {
        self.state().input_type_calls
    }

    pub fn detach_count(&self) -> usize {
        self.state().detached
    }
}

#[async_trait]
impl PageTrait for FakePage {
    fn page_id(&self) -> String {
        self.state().id.clone()
    }

    async fn ping(&self) -> Result<()> {
        self.alive()
    }

    async fn url(&self) -> Result<String> {
        self.alive()?;
        Ok(self.state().url.clone())
    }

    async fn title(&self) -> Result<String> {
        self.alive()?;
        Ok(self.state().title.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.alive()?;
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_navigation) {
            return Err(BrowserAgentError::NavigationTimeout(url.to_string()));
        }
        state.go(url, &self.sites);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.alive()?;
        let mut state = self.state();
        if expression == LOAD_STATE_PROBE {
            return Ok(json!({
                "readyState": state.ready_state,
                "resources": 4,
                "pending": state.pending,
            }));
        }
        if expression == DISMISS_BANNERS_SCRIPT {
            return Ok(Value::Bool(std::mem::take(&mut state.banner)));
        }
        if expression == HISTORY_BACK_SCRIPT && state.history_pos > 0 {
            state.history_pos -= 1;
            let url = state.history[state.history_pos].clone();
            state.load(&url, &self.sites);
        } else if expression == HISTORY_FORWARD_SCRIPT && state.history_pos + 1 < state.history.len() {
            state.history_pos += 1;
            let url = state.history[state.history_pos].clone();
            state.load(&url, &self.sites);
        }
        Ok(Value::Null)
    }

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>> {
        self.alive()?;
        let stalled = self.state().tree_stalls;
        if stalled {
            std::future::pending::<()>().await;
        }
        let state = self.state();
        if state.tree_fails {
            return Err(BrowserAgentError::ChromeError("Accessibility.getFullAXTree failed".to_string()));
        }
        Ok(state
            .nodes
            .iter()
            .cloned()
            .map(|mut node| {
                if let Some(value) = node.backend_dom_node_id.and_then(|id| state.values.get(&id)) {
                    node.value = Some(AxValue::string(value.clone()));
                }
                node
            })
            .collect())
    }

    async fn child_frames(&self) -> Result<Vec<FrameInfo>> {
        self.alive()?;
        Ok(self.state().frames.iter().map(|(info, _)| info.clone()).collect())
    }

    async fn call_in_frame(&self, frame_index: usize, function: &str, args: Value) -> Result<Value> {
        self.alive()?;
        let mut state = self.state();
        state.frame_calls.push((frame_index, function.to_string(), args.clone()));
        if frame_index > state.frames.len() {
            return Err(BrowserAgentError::JavaScriptFailed(format!("no frame {}", frame_index)));
        }

        if function == FRAME_SCAN_SCRIPT {
            return Ok(match frame_index {
                0 => Value::Array(vec![]),
                i => state.frames[i - 1].1.clone(),
            });
        }
        if function == FRAME_TEXT_SCRIPT {
            return Ok(Value::String(
                state.frame_texts.get(&frame_index).cloned().unwrap_or_default(),
            ));
        }
        if function == FRAME_ACTION_SCRIPT {
            let selector = args["selector"].as_str().unwrap_or_default().to_string();
            let key = (frame_index, selector.clone());
            if let Some(error) = state.frame_failures.get(&key) {
                return Ok(json!({ "ok": false, "error": error }));
            }
            if !state.frame_has(frame_index, &selector) {
                return Ok(json!({ "ok": false, "error": format!("no element matches {}", selector) }));
            }
            match args["action"].as_str().unwrap_or_default() {
                "click" | "focus" => state.focus_frame(key),
                "clear" => {
                    state.frame_values.insert(key.clone(), String::new());
                    state.focus_frame(key);
                }
                "hover" => state.frame_hovered = Some(key),
                "select" => {
                    let picked = args["value"].as_str().or(args["label"].as_str()).unwrap_or_default();
                    state.frame_values.insert(key, picked.to_string());
                }
                _ => {}
            }
            return Ok(json!({ "ok": true }));
        }
        if function == SELECTOR_PRESENT_SCRIPT {
            let selector = args["selector"].as_str().unwrap_or_default().to_string();
            return Ok(Value::Bool(match state.selector_probes.get_mut(&selector) {
                Some(remaining) if *remaining <= 1 => true,
                Some(remaining) => {
                    *remaining -= 1;
                    false
                }
                None => false,
            }));
        }
        Ok(Value::Null)
    }

    async fn scroll_into_view(&self, _node: BackendNodeId) -> Result<()> {
        self.alive()
    }

    async fn box_model(&self, node: BackendNodeId) -> Result<Option<Quad>> {
        self.alive()?;
        Ok(self.state().boxes.get(&node).cloned())
    }

    async fn resolve_node(&self, node: BackendNodeId) -> Result<Option<String>> {
        self.alive()?;
        Ok(self
            .state()
            .resolvable
            .contains(&node)
            .then(|| format!("node-{}", node)))
    }

    async fn call_function_on(&self, object_id: &str, function: &str, args: Vec<Value>) -> Result<Value> {
        self.alive()?;
        let node: BackendNodeId = object_id
            .strip_prefix("node-")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| BrowserAgentError::JavaScriptFailed(format!("unknown object {}", object_id)))?;
        let mut state = self.state();

        if function == ELEMENT_CLICK_SCRIPT {
            state.activate(node, &self.sites);
            return Ok(Value::Bool(true));
        }
        if function == SELECT_OPTION_SCRIPT {
            let value = args.first().and_then(Value::as_str);
            let label = args.get(1).and_then(Value::as_str);
            let chosen = state.options.get(&node).and_then(|options| {
                options
                    .iter()
                    .find(|(v, l)| match value {
                        Some(value) => v == value,
                        None => Some(l.as_str()) == label,
                    })
                    .map(|(v, _)| v.clone())
            });
            return Ok(Value::Bool(match chosen {
                Some(v) => {
                    state.values.insert(node, v);
                    true
                }
                None => false,
            }));
        }
        Ok(Value::Null)
    }

    async fn input_types(&self) -> Result<HashMap<BackendNodeId, String>> {
        self.alive()?;
        let mut state = self.state();
        state.input_type_calls += 1;
        Ok(state
            .attributes
            .iter()
            .filter(|((_, name), _)| name == "type")
            .map(|((node, _), value)| (*node, value.clone()))
            .collect())
    }

    async fn focus_node(&self, node: BackendNodeId) -> Result<()> {
        self.alive()?;
        let mut state = self.state();
        if state.unfocusable.contains(&node) {
            return Err(BrowserAgentError::ElementUnresolvable(format!("node {} is not focusable", node)));
        }
        state.focused = Some(node);
        state.frame_focused = None;
        Ok(())
    }

    async fn set_file_input_files(&self, node: BackendNodeId, files: Vec<String>) -> Result<()> {
        self.alive()?;
        self.state().uploads.entry(node).or_default().extend(files);
        Ok(())
    }

    async fn dispatch_mouse(&self, event: MouseEvent) -> Result<()> {
        self.alive()?;
        let mut state = self.state();
        if event.kind == MouseEventKind::Pressed {
            if let Some(node) = state.node_at(event.point) {
                state.activate(node, &self.sites);
            }
        }
        state.mouse_events.push(event);
        Ok(())
    }

    async fn dispatch_key(&self, event: KeyEvent) -> Result<()> {
        self.alive()?;
        let mut state = self.state();
        if event.kind == KeyEventKind::KeyDown {
            match event.key.as_str() {
                "a" if event.modifiers & crate::browser::keys::MODIFIER_CONTROL != 0 => state.select_all = true,
                "Delete" | "Backspace" => {
                    if let Some(node) = state.focused {
                        let select_all = std::mem::take(&mut state.select_all);
                        let value = state.values.entry(node).or_default();
                        if select_all {
                            value.clear();
                        } else {
                            value.pop();
                        }
                    }
                }
                "Enter" => {
                    if let Some(node) = state.focused {
                        state.activate(node, &self.sites);
                    }
                }
                _ => {}
            }
        }
        state.key_events.push(event);
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.alive()?;
        let mut state = self.state();
        if let Some(node) = state.focused {
            let select_all = std::mem::take(&mut state.select_all);
            let value = state.values.entry(node).or_default();
            if select_all {
                value.clear();
            }
            value.push_str(text);
        } else if let Some(key) = state.frame_focused.clone() {
            state.frame_values.entry(key).or_default().push_str(text);
        }
        state.inserted.push(text.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.alive()?;
        Ok(Self::SCREENSHOT_BYTES.to_vec())
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.alive()
    }

    async fn detach(&self) -> Result<()> {
        self.state().detached += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    running: bool,
    tabs: Vec<FakePage>,
    launches: usize,
    closes: usize,
    shutdowns: usize,
    ping_fails: bool,
    launch_error: Option<String>,
}

/// Scripted browser process. Clones share state so a test can keep a handle
/// after moving one into a session.
#[derive(Debug, Clone)]
pub struct FakeBrowser {
    state: Arc<Mutex<BrowserState>>,
    initial: FakePage,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrowserState::default())),
            initial: FakePage::new("about:blank"),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        lock(&self.state)
    }

    /// The tab the first launch opens, scriptable before launch.
    pub fn initial_page(&self) -> FakePage {
        self.initial.clone()
    }

    pub fn add_site(&self, url: &str, title: &str, nodes: Vec<AxNode>) {
        self.initial.add_site(url, title, nodes);
    }

    pub fn open_tabs(&self) -> Vec<FakePage> {
        self.state().tabs.iter().filter(|t| !t.is_closed()).cloned().collect()
    }

    pub fn set_ping_failing(&self, failing: bool) {
        self.state().ping_fails = failing;
    }

    pub fn fail_launch(&self, message: &str) {
        self.state().launch_error = Some(message.to_string());
    }

    pub fn launches(&self) -> usize {
        self.state().launches
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }
}

#[async_trait]
impl BrowserTrait for FakeBrowser {
    type TabHandle = FakePage;

    async fn launch(&mut self, _config: &Config) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = state.launch_error.clone() {
            return Err(BrowserAgentError::LaunchFailed(message));
        }
        let first = if state.launches == 0 {
            self.initial.clone()
        } else {
            self.initial.sibling("about:blank")
        };
        state.tabs = vec![first];
        state.running = true;
        state.ping_fails = false;
        state.launches += 1;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state().running
    }

    async fn ping(&self) -> Result<()> {
        let state = self.state();
        if !state.running {
            return Err(BrowserAgentError::BrowserNotLaunched);
        }
        if state.ping_fails {
            return Err(BrowserAgentError::ProtocolSessionLost("browser endpoint gone".to_string()));
        }
        Ok(())
    }

    async fn tabs(&self) -> Result<Vec<FakePage>> {
        if !self.is_running() {
            return Err(BrowserAgentError::BrowserNotLaunched);
        }
        Ok(self.open_tabs())
    }

    async fn new_tab(&self) -> Result<FakePage> {
        let mut state = self.state();
        if !state.running {
            return Err(BrowserAgentError::BrowserNotLaunched);
        }
        let tab = self.initial.sibling("about:blank");
        state.tabs.push(tab.clone());
        Ok(tab)
    }

    async fn reattach(&self, tab: &FakePage) -> Result<FakePage> {
        if tab.is_closed() || self.state().ping_fails {
            return Err(BrowserAgentError::ProtocolSessionLost("target closed".to_string()));
        }
        let fresh = tab.reattached();
        let mut state = self.state();
        for slot in state.tabs.iter_mut() {
            if slot.page_id() == fresh.page_id() {
                *slot = fresh.clone();
            }
        }
        Ok(fresh)
    }

    async fn close(&mut self) -> Result<()> {
        let tabs = self.open_tabs();
        for tab in tabs {
            tab.close().await?;
        }
        self.state().closes += 1;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let mut state = self.state();
        state.running = false;
        state.tabs.clear();
        state.shutdowns += 1;
        Ok(())
    }
}
