use crate::browser::cdp;
use crate::core::{BrowserTrait, Config, PageTrait, TimeoutConfig};
use crate::dom::AxNode;
use crate::errors::{BrowserAgentError, Result};
use crate::types::{
    BackendNodeId, FrameInfo, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind, Quad,
};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::types::Method;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const ISOLATED_WORLD: &str = "browser_act";

/// headless_chrome reports through anyhow; keep session loss distinct and
/// file everything else under the driver.
fn driver_error(err: anyhow::Error) -> BrowserAgentError {
    match BrowserAgentError::from(err) {
        BrowserAgentError::AnyhowError(msg) => BrowserAgentError::ChromeError(msg),
        other => other,
    }
}

async fn blocking<T, F>(timeout_ms: u64, what: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Err(_) => Err(BrowserAgentError::ActionTimeout(what.to_string())),
        Ok(Err(join)) => Err(BrowserAgentError::ChromeError(join.to_string())),
        Ok(Ok(result)) => result.map_err(driver_error),
    }
}

/// Chrome over the DevTools protocol, with a persistent profile directory.
pub struct ChromeBrowser {
    browser: Option<Arc<Browser>>,
    config: Config,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self {
            browser: None,
            config: Config::default(),
        }
    }

    fn handle(&self) -> Result<Arc<Browser>> {
        self.browser
            .clone()
            .ok_or(BrowserAgentError::BrowserNotLaunched)
    }

    async fn wrap(&self, tab: Arc<Tab>) -> Result<ChromeTab> {
        let browser = &self.config.browser;
        let stealth = browser.stealth;
        let user_agent = browser.user_agent.clone();
        let navigation_ms = self.config.timeouts.navigation_ms;
        let prepared = tab.clone();

        blocking(self.config.timeouts.protocol_ms, "tab setup", move || {
            prepared.set_default_timeout(Duration::from_millis(navigation_ms));
            if stealth {
                prepared.enable_stealth_mode()?;
            }
            if let Some(ua) = user_agent.as_deref() {
                prepared.set_user_agent(ua, Some("en-US,en"), None)?;
            }
            Ok(())
        })
        .await?;

        Ok(ChromeTab::new(tab, &self.config.timeouts))
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type TabHandle = ChromeTab;

    async fn launch(&mut self, config: &Config) -> Result<()> {
        self.config = config.clone();
        let browser_config = config.browser.clone();

        let launched = blocking(config.timeouts.navigation_ms, "browser launch", move || {
            let window_size = format!(
                "--window-size={},{}",
                browser_config.viewport.width, browser_config.viewport.height
            );
            let mut args: Vec<&OsStr> = vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new(&window_size),
            ];
            for arg in &browser_config.args {
                args.push(OsStr::new(arg));
            }

            let options = LaunchOptions::default_builder()
                .headless(browser_config.headless)
                .sandbox(false)
                .window_size(Some((
                    browser_config.viewport.width,
                    browser_config.viewport.height,
                )))
                .user_data_dir(Some(browser_config.profile_dir.clone()))
                .path(browser_config.executable.clone())
                .idle_browser_timeout(Duration::from_millis(browser_config.idle_timeout_ms))
                .args(args)
                .build()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            let browser = Browser::new(options)?;
            let initial = browser.wait_for_initial_tab()?;
            Ok((browser, initial))
        })
        .await
        .map_err(|e| BrowserAgentError::LaunchFailed(e.to_string()))?;

        let (browser, initial) = launched;
        self.browser = Some(Arc::new(browser));
        self.wrap(initial).await?;
        info!(
            "Chrome launched (headless={}, profile={})",
            config.browser.headless,
            config.browser.profile_dir.display()
        );
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn ping(&self) -> Result<()> {
        let browser = self.handle()?;
        blocking(self.config.timeouts.health_check_ms, "browser ping", move || {
            browser.get_version().map(|_| ())
        })
        .await
    }

    async fn tabs(&self) -> Result<Vec<ChromeTab>> {
        let browser = self.handle()?;
        let tabs = browser
            .get_tabs()
            .lock()
            .map_err(|e| BrowserAgentError::ChromeError(e.to_string()))?
            .clone();
        Ok(tabs
            .into_iter()
            .map(|tab| ChromeTab::new(tab, &self.config.timeouts))
            .collect())
    }

    async fn new_tab(&self) -> Result<ChromeTab> {
        let browser = self.handle()?;
        let tab = blocking(self.config.timeouts.protocol_ms, "new tab", move || browser.new_tab()).await?;
        debug!("opened tab {}", tab.get_target_id());
        self.wrap(tab).await
    }

    /// headless_chrome keeps one attached session per target, so this looks
    /// the target up again and re-runs tab setup on a fresh handle with no
    /// cached frame contexts. It is a cheap retry: a target that really lost
    /// its session fails the caller's ping and falls through to another tab
    /// or a relaunch.
    async fn reattach(&self, tab: &ChromeTab) -> Result<ChromeTab> {
        let target = tab.page_id();
        let found = self
            .tabs()
            .await?
            .into_iter()
            .find(|t| t.page_id() == target)
            .ok_or_else(|| BrowserAgentError::ProtocolSessionLost(format!("tab {} is gone", target)))?;
        self.wrap(found.tab).await
    }

    async fn close(&mut self) -> Result<()> {
        for tab in self.tabs().await? {
            if let Err(e) = tab.close().await {
                debug!("closing tab {} failed: {}", tab.page_id(), e);
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        // Dropping the last handle stops the child process.
        self.browser = None;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ChromeTab {
    tab: Arc<Tab>,
    timeouts: TimeoutConfig,
    worlds: Arc<Mutex<HashMap<String, i64>>>,
}

impl ChromeTab {
    fn new(tab: Arc<Tab>, timeouts: &TimeoutConfig) -> Self {
        Self {
            tab,
            timeouts: timeouts.clone(),
            worlds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn worlds(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.worlds.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn frame_context(&self, frame_id: &str) -> Result<i64> {
        let cached = self.worlds().get(frame_id).copied();
        if let Some(context) = cached {
            return Ok(context);
        }
        let world = self
            .quick(
                "isolated world",
                cdp::CreateIsolatedWorld {
                    frame_id: frame_id.to_string(),
                    world_name: ISOLATED_WORLD.to_string(),
                    grant_universal_access: true,
                },
            )
            .await?;
        self.worlds().insert(frame_id.to_string(), world.execution_context_id);
        Ok(world.execution_context_id)
    }

    async fn call_in_context(&self, context: i64, function: &str, args: Value) -> Result<Value> {
        let result = self
            .call(
                self.timeouts.frame_script_ms,
                "frame script",
                cdp::CallFunctionOn {
                    function_declaration: function.to_string(),
                    object_id: None,
                    execution_context_id: Some(context),
                    arguments: vec![cdp::CallArgument { value: args }],
                    return_by_value: true,
                    await_promise: true,
                },
            )
            .await?;
        Self::script_value(result)
    }

    async fn call<C>(&self, timeout_ms: u64, what: &'static str, command: C) -> Result<C::ReturnObject>
    where
        C: Method + serde::Serialize + std::fmt::Debug + Send + 'static,
        C::ReturnObject: Send + 'static,
    {
        let tab = self.tab.clone();
        blocking(timeout_ms, what, move || tab.call_method(command)).await
    }

    async fn quick<C>(&self, what: &'static str, command: C) -> Result<C::ReturnObject>
    where
        C: Method + serde::Serialize + std::fmt::Debug + Send + 'static,
        C::ReturnObject: Send + 'static,
    {
        self.call(self.timeouts.protocol_ms, what, command).await
    }

    fn script_value(result: cdp::EvaluateReturn) -> Result<Value> {
        if let Some(exception) = result.exception_details {
            return Err(BrowserAgentError::JavaScriptFailed(exception.message()));
        }
        Ok(result.result.value.unwrap_or(Value::Null))
    }

    async fn frame_id(&self, frame_index: usize) -> Result<String> {
        let tree = self.quick("frame tree", cdp::GetFrameTree {}).await?;
        tree.frame_tree
            .flatten()
            .get(frame_index)
            .map(|f| f.id.clone())
            .ok_or_else(|| BrowserAgentError::ElementUnresolvable(format!("frame {} no longer exists", frame_index)))
    }
}

/// Node-scoped queries answer "no such thing" for detached or layout-less
/// nodes; only a dead session is a real failure there.
fn absent_unless_lost<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_session_lost() => Err(e),
        Err(e) => {
            debug!("node query failed: {}", e);
            Ok(None)
        }
    }
}

#[async_trait]
impl PageTrait for ChromeTab {
    fn page_id(&self) -> String {
        self.tab.get_target_id().clone()
    }

    async fn ping(&self) -> Result<()> {
        self.call(
            self.timeouts.health_check_ms,
            "health check",
            cdp::Evaluate {
                expression: "1".to_string(),
                return_by_value: true,
                await_promise: false,
            },
        )
        .await
        .map(|_| ())
    }

    async fn url(&self) -> Result<String> {
        match self.evaluate("window.location.href").await {
            Ok(Value::String(url)) => Ok(url),
            _ => Ok(self.tab.get_url()),
        }
    }

    async fn title(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(self.timeouts.protocol_ms, "title", move || tab.get_title()).await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let target = url.to_string();
        debug!("navigate {}", url);
        blocking(self.timeouts.navigation_ms, "navigation", move || {
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            BrowserAgentError::ActionTimeout(_) => BrowserAgentError::NavigationTimeout(url.to_string()),
            other => other,
        })
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .quick(
                "script",
                cdp::Evaluate {
                    expression: expression.to_string(),
                    return_by_value: true,
                    await_promise: true,
                },
            )
            .await?;
        Self::script_value(result)
    }

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>> {
        let tree = self
            .call(self.timeouts.ax_tree_ms, "accessibility tree", cdp::GetFullAxTree {})
            .await?;
        Ok(tree.nodes)
    }

    async fn child_frames(&self) -> Result<Vec<FrameInfo>> {
        let tree = self.quick("frame tree", cdp::GetFrameTree {}).await?;
        Ok(tree
            .frame_tree
            .flatten()
            .into_iter()
            .enumerate()
            .skip(1)
            .map(|(index, frame)| FrameInfo {
                index,
                url: frame.url.clone(),
            })
            .collect())
    }

    async fn call_in_frame(&self, frame_index: usize, function: &str, args: Value) -> Result<Value> {
        let frame_id = self.frame_id(frame_index).await?;
        let context = self.frame_context(&frame_id).await?;
        match self.call_in_context(context, function, args.clone()).await {
            // A navigated frame drops its contexts; build a new world once.
            Err(BrowserAgentError::ChromeError(msg)) => {
                debug!("frame {} context {} is stale: {}", frame_id, context, msg);
                self.worlds().remove(&frame_id);
                let context = self.frame_context(&frame_id).await?;
                self.call_in_context(context, function, args).await
            }
            result => result,
        }
    }

    async fn scroll_into_view(&self, node: BackendNodeId) -> Result<()> {
        self.quick("scroll into view", cdp::ScrollIntoViewIfNeeded { backend_node_id: node })
            .await
            .map(|_| ())
    }

    async fn box_model(&self, node: BackendNodeId) -> Result<Option<Quad>> {
        let model = absent_unless_lost(self.quick("box model", cdp::GetBoxModel { backend_node_id: node }).await)?;
        Ok(model.map(|m| Quad(m.model.content)))
    }

    async fn resolve_node(&self, node: BackendNodeId) -> Result<Option<String>> {
        let resolved = absent_unless_lost(self.quick("resolve node", cdp::ResolveNode { backend_node_id: node }).await)?;
        Ok(resolved.and_then(|r| r.object.object_id))
    }

    async fn call_function_on(&self, object_id: &str, function: &str, args: Vec<Value>) -> Result<Value> {
        let result = self
            .quick(
                "element script",
                cdp::CallFunctionOn {
                    function_declaration: function.to_string(),
                    object_id: Some(object_id.to_string()),
                    execution_context_id: None,
                    arguments: args.into_iter().map(|value| cdp::CallArgument { value }).collect(),
                    return_by_value: true,
                    await_promise: true,
                },
            )
            .await?;
        Self::script_value(result)
    }

    async fn input_types(&self) -> Result<HashMap<BackendNodeId, String>> {
        let document = self
            .quick("document", cdp::GetDocument { depth: -1, pierce: false })
            .await?;
        Ok(document.root.input_types().into_iter().collect())
    }

    async fn focus_node(&self, node: BackendNodeId) -> Result<()> {
        self.quick("focus", cdp::Focus { backend_node_id: node }).await.map(|_| ())
    }

    async fn set_file_input_files(&self, node: BackendNodeId, files: Vec<String>) -> Result<()> {
        self.quick(
            "file input",
            cdp::SetFileInputFiles {
                files,
                backend_node_id: node,
            },
        )
        .await
        .map(|_| ())
    }

    async fn dispatch_mouse(&self, event: MouseEvent) -> Result<()> {
        let event_type = match event.kind {
            MouseEventKind::Moved => "mouseMoved",
            MouseEventKind::Pressed => "mousePressed",
            MouseEventKind::Released => "mouseReleased",
            MouseEventKind::Wheel => "mouseWheel",
        };
        let wheel = event.kind == MouseEventKind::Wheel;
        self.quick(
            "mouse event",
            cdp::DispatchMouseEvent {
                event_type,
                x: event.point.x,
                y: event.point.y,
                button: match event.button {
                    MouseButton::None => "none",
                    MouseButton::Left => "left",
                },
                buttons: event.buttons,
                click_count: event.click_count,
                delta_x: wheel.then_some(event.delta_x),
                delta_y: wheel.then_some(event.delta_y),
            },
        )
        .await
        .map(|_| ())
    }

    async fn dispatch_key(&self, event: KeyEvent) -> Result<()> {
        let event_type = match (event.kind, &event.text) {
            (KeyEventKind::KeyDown, Some(_)) => "keyDown",
            (KeyEventKind::KeyDown, None) => "rawKeyDown",
            (KeyEventKind::KeyUp, _) => "keyUp",
        };
        self.quick(
            "key event",
            cdp::DispatchKeyEvent {
                event_type,
                modifiers: event.modifiers,
                key: event.key,
                code: event.code,
                windows_virtual_key_code: event.key_code,
                native_virtual_key_code: event.key_code,
                text: event.text,
            },
        )
        .await
        .map(|_| ())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.quick("insert text", cdp::InsertText { text: text.to_string() })
            .await
            .map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let tab = self.tab.clone();
        blocking(self.timeouts.navigation_ms, "screenshot", move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
        .map_err(|e| BrowserAgentError::ScreenshotFailed(e.to_string()))
    }

    async fn bring_to_front(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(self.timeouts.protocol_ms, "activate tab", move || tab.activate().map(|_| ())).await
    }

    async fn detach(&self) -> Result<()> {
        self.quick("accessibility disable", cdp::AccessibilityDisable {}).await?;
        self.quick("dom disable", cdp::DomDisable {}).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(self.timeouts.protocol_ms, "close tab", move || tab.close(false).map(|_| ())).await
    }
}
