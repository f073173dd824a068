use crate::actions::base::{Action, ActionKind, ActionParams};
use crate::browser::interaction::{press_key, scroll, InteractionEngine};
use crate::browser::navigation::{LoadState, NavigationManager};
use crate::browser::session::SessionManager;
use crate::core::{BrowserTrait, Config, PageTrait};
use crate::dom::processor::fetch_tree;
use crate::dom::{extract_page_text, Registry, SnapshotBuilder};
use crate::errors::{BrowserAgentError, Result};
use crate::utils::javascript::{
    FRAME_TEXT_SCRIPT, HISTORY_BACK_SCRIPT, HISTORY_FORWARD_SCRIPT, SELECTOR_PRESENT_SCRIPT,
};
use crate::utils::{truncate_chars, JavaScriptRunner, ScreenshotManager};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EMPTY_TEXT: &str = "(empty page — no content detected)";
const WAIT_FOR_POLL_MS: u64 = 250;

struct DispatchState<B: BrowserTrait> {
    session: SessionManager<B>,
    registry: Registry,
}

/// The single entry point: `act(action, params)` in, text out.
///
/// Calls are serialized; the lock also covers launch so concurrent first calls
/// start one browser. Every answer except `close` and unknown actions ends
/// with a snapshot rebuilt after the action, which replaces the registry.
pub struct Dispatcher<B: BrowserTrait> {
    state: Mutex<DispatchState<B>>,
}

impl<B: BrowserTrait> Dispatcher<B> {
    pub fn new(browser: B, config: Config) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                session: SessionManager::new(browser, config),
                registry: Registry::default(),
            }),
        }
    }

    /// Runs one action given as a JSON params object. Never fails: errors come
    /// back as text.
    pub async fn act(&self, action: &str, params: Value) -> String {
        let Some(kind) = ActionKind::parse(action) else {
            return format!(
                "Error: unknown action '{}'. Valid actions: {}",
                action,
                ActionKind::vocabulary()
            );
        };
        let parsed = match params {
            Value::Null => Ok(ActionParams::default()),
            other => serde_json::from_value::<ActionParams>(other)
                .map_err(|e| BrowserAgentError::InvalidParams(format!("invalid params: {}", e))),
        };
        self.dispatch(kind, parsed).await
    }

    pub async fn act_with(&self, action: &str, params: ActionParams) -> String {
        match ActionKind::parse(action) {
            Some(kind) => self.dispatch(kind, Ok(params)).await,
            None => self.act(action, Value::Null).await,
        }
    }

    async fn dispatch(&self, kind: ActionKind, params: Result<ActionParams>) -> String {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        info!(action = kind.name(), "act");

        if kind == ActionKind::Close {
            state.session.close_all().await;
            state.registry = Registry::default();
            return "Browser closed.".to_string();
        }

        let page = match state.session.get_page().await {
            Ok(page) => page,
            Err(e) => return format!("Error: {}", e),
        };

        let message = match params.and_then(|p| Action::from_params(kind, &p)) {
            Ok(action) => match execute(&mut state.session, &state.registry, &page, action).await {
                Ok(message) => message,
                Err(e) => {
                    debug!("{} failed: {}", kind.name(), e);
                    format!("Error: {}", e)
                }
            },
            Err(e) => format!("Error: {}", e),
        };

        let snapshot = refresh(state).await;
        match (message.is_empty(), snapshot) {
            (true, Ok(snapshot)) => snapshot,
            (false, Ok(snapshot)) => format!("{}\n\n{}", message, snapshot),
            (_, Err(e)) => format!("{}\n\n(snapshot unavailable: {})", message, e)
                .trim_start()
                .to_string(),
        }
    }
}

async fn refresh<B: BrowserTrait>(state: &mut DispatchState<B>) -> Result<String> {
    let page = state.session.get_page().await?;
    let tabs = state.session.tab_infos().await;
    let config = state.session.config();
    let (registry, snapshot) = SnapshotBuilder::new(config.snapshot.clone())
        .capture(&page, tabs, &config.timeouts)
        .await;
    debug!("snapshot: {} elements, truncated={}", registry.len(), snapshot.truncated);
    state.registry = registry;
    Ok(snapshot.render())
}

async fn settled<P: PageTrait>(page: &P, url_before: &str, message: String) -> String {
    if NavigationManager::settle_after_interaction(page, url_before).await {
        let url = page.url().await.unwrap_or_default();
        format!("{} → navigated to {}", message, url)
    } else {
        message
    }
}

async fn execute<B: BrowserTrait>(
    session: &mut SessionManager<B>,
    registry: &Registry,
    page: &B::TabHandle,
    action: Action,
) -> Result<String> {
    let config = session.config().clone();
    let engine = InteractionEngine::new(page, registry);

    match action {
        Action::Navigate { url } => navigate(page, &url, &config).await,
        Action::Snapshot => Ok(String::new()),
        Action::GetText => Ok(page_text(page, &config).await),
        Action::Click { reference } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine.click(reference).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::Fill { reference, text } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine.fill(reference, &text).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::Type { reference, text } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine.type_text(reference, &text).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::Press { key } => {
            let before = page.url().await.unwrap_or_default();
            let message = press_key(page, &key).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::Hover { reference } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine.hover(reference).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::SelectOption { reference, value, label } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine
                .select_option(reference, value.as_deref(), label.as_deref())
                .await?;
            Ok(settled(page, &before, message).await)
        }
        Action::UploadFile { reference, path } => {
            let before = page.url().await.unwrap_or_default();
            let message = engine.upload_file(reference, &path).await?;
            Ok(settled(page, &before, message).await)
        }
        Action::Scroll { direction, amount } => scroll(page, config.browser.viewport, &direction, amount).await,
        Action::Wait { seconds } => {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok(format!("Waited {}s", seconds))
        }
        Action::WaitFor { selector, url, seconds } => wait_for(page, selector, url, seconds).await,
        Action::Screenshot => {
            let path = ScreenshotManager::save_to_dir(page, &config.paths.screenshot_dir).await?;
            Ok(format!("Screenshot saved to {}", path.display()))
        }
        Action::Back => history(page, HISTORY_BACK_SCRIPT, "back", &config).await,
        Action::Forward => history(page, HISTORY_FORWARD_SCRIPT, "forward", &config).await,
        Action::NewTab { url } => {
            let tab = session.new_tab().await?;
            match url {
                Some(url) => navigate(&tab, &url, &config).await.map(|m| format!("Opened new tab. {}", m)),
                None => Ok("Opened new tab".to_string()),
            }
        }
        Action::SwitchTab { index } => {
            let tab = session.switch_tab(index).await?;
            Ok(format!("Switched to tab [{}]: {}", index, tab.url().await.unwrap_or_default()))
        }
        Action::CloseTab => {
            let tab = session.close_tab().await?;
            Ok(format!("Closed tab. Now on {}", tab.url().await.unwrap_or_default()))
        }
        // Handled before a page is acquired.
        Action::Close => Ok("Browser closed.".to_string()),
    }
}

async fn navigate<P: PageTrait>(page: &P, url: &str, config: &Config) -> Result<String> {
    info!("navigating to {}", url);
    let note = match page.navigate(url).await {
        Ok(()) => String::new(),
        Err(e) if e.is_recoverable() => {
            warn!("navigation to {} did not finish: {}", url, e);
            " (page still loading)".to_string()
        }
        Err(e) => return Err(e),
    };
    NavigationManager::settle(page, config.timeouts.settle_ms).await;
    if JavaScriptRunner::dismiss_banners(page).await {
        debug!("dismissed a consent banner");
        NavigationManager::settle(page, 1000).await;
    }
    Ok(format!("Navigated to {}{}", url, note))
}

async fn history<P: PageTrait>(page: &P, script: &str, direction: &str, config: &Config) -> Result<String> {
    let before = page.url().await.unwrap_or_default();
    page.evaluate(script).await?;
    if let Err(e) = NavigationManager::wait_for_url_change(page, &before, config.timeouts.history_ms).await {
        debug!("history {} left the url unchanged: {}", direction, e);
        return Ok(format!("Went {}: no page in history", direction));
    }
    NavigationManager::settle(page, config.timeouts.settle_ms).await;
    Ok(format!("Went {} to {}", direction, page.url().await.unwrap_or_default()))
}

async fn wait_for<P: PageTrait>(
    page: &P,
    selector: Option<String>,
    url: Option<String>,
    seconds: f64,
) -> Result<String> {
    let timeout_ms = (seconds * 1000.0) as u64;
    if let Some(selector) = selector {
        let found = JavaScriptRunner::wait_for_condition(
            page,
            SELECTOR_PRESENT_SCRIPT,
            json!({ "selector": selector }),
            timeout_ms,
            WAIT_FOR_POLL_MS,
        )
        .await?;
        return Ok(if found {
            format!("Found {}", selector)
        } else {
            format!("Timed out after {}s waiting for {}", seconds, selector)
        });
    }
    if let Some(pattern) = url {
        let matched = NavigationManager::wait_for_url(page, &pattern, timeout_ms).await?;
        return Ok(if matched {
            format!("URL matches {}", pattern)
        } else {
            format!("Timed out after {}s waiting for URL {}", seconds, pattern)
        });
    }
    match NavigationManager::wait_for_load_state(page, LoadState::NetworkIdle, timeout_ms).await {
        Ok(()) => Ok("Page is idle".to_string()),
        Err(e) if e.is_recoverable() => Ok(format!("Page still busy after {}s", seconds)),
        Err(e) => Err(e),
    }
}

async fn page_text<P: PageTrait>(page: &P, config: &Config) -> String {
    let nodes = fetch_tree(page, &config.timeouts).await;
    let mut sections = Vec::new();
    let ax_text = extract_page_text(&nodes, config.snapshot.text_limit);
    if !ax_text.is_empty() {
        sections.push(ax_text);
    }

    let frames = page.child_frames().await.unwrap_or_default();
    for frame in frames {
        let args = json!({ "limit": config.snapshot.text_limit });
        match page.call_in_frame(frame.index, FRAME_TEXT_SCRIPT, args).await {
            Ok(Value::String(text)) if !text.trim().is_empty() => {
                sections.push(format!("── Frame [{}] ──\n{}", frame.index, text.trim()));
            }
            Ok(_) => {}
            Err(e) => debug!("frame {} text failed: {}", frame.index, e),
        }
    }

    if sections.is_empty() {
        return EMPTY_TEXT.to_string();
    }
    truncate_chars(&sections.join("\n\n"), config.snapshot.merged_text_limit)
}
