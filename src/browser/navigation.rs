use crate::core::PageTrait;
use crate::errors::{BrowserAgentError, Result};
use crate::utils::javascript::LOAD_STATE_PROBE;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const POLL_INTERVAL_MS: u64 = 100;
/// Resource count must hold still this long to count as network idle.
const IDLE_WINDOW_MS: u64 = 500;
const DOM_FALLBACK_MS: u64 = 1000;
const RENDER_TICK_MS: u64 = 300;
const POST_ACTION_PAUSE_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    NetworkIdle,
    DomContentLoaded,
    Fallback,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LoadProbe {
    ready_state: String,
    resources: u64,
    pending: u64,
}

pub struct NavigationManager;

impl NavigationManager {
    pub async fn wait_for_load_state<P: PageTrait>(
        page: &P,
        state: LoadState,
        timeout_ms: u64,
    ) -> Result<()> {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(timeout_ms);
        let mut last_count: Option<u64> = None;
        let mut quiet_since = start;

        loop {
            match page.evaluate(LOAD_STATE_PROBE).await {
                Ok(raw) => {
                    let probe: LoadProbe = serde_json::from_value(raw).unwrap_or_default();
                    let now = Instant::now();
                    match state {
                        LoadState::DomContentLoaded => {
                            if probe.ready_state == "interactive" || probe.ready_state == "complete" {
                                return Ok(());
                            }
                        }
                        LoadState::NetworkIdle => {
                            if last_count != Some(probe.resources) || probe.pending > 0 {
                                last_count = Some(probe.resources);
                                quiet_since = now;
                            }
                            if probe.ready_state == "complete"
                                && now.duration_since(quiet_since) >= Duration::from_millis(IDLE_WINDOW_MS)
                            {
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => debug!("load probe failed: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(BrowserAgentError::ActionTimeout(format!("{:?}", state)));
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Best-effort settle: network idle, then DOM content loaded, then one
    /// short render tick. Never fails.
    pub async fn settle<P: PageTrait>(page: &P, timeout_ms: u64) -> SettleOutcome {
        let outcome = match Self::wait_for_load_state(page, LoadState::NetworkIdle, timeout_ms).await {
            Ok(()) => SettleOutcome::NetworkIdle,
            Err(e) => {
                debug!("network idle not reached: {}", e);
                match Self::wait_for_load_state(page, LoadState::DomContentLoaded, DOM_FALLBACK_MS).await {
                    Ok(()) => SettleOutcome::DomContentLoaded,
                    Err(_) => SettleOutcome::Fallback,
                }
            }
        };
        // Client-side frameworks get one frame to render.
        tokio::time::sleep(Duration::from_millis(RENDER_TICK_MS)).await;
        outcome
    }

    pub async fn wait_for_navigation_settle<P: PageTrait>(page: &P) -> SettleOutcome {
        if let Err(e) = Self::wait_for_load_state(page, LoadState::DomContentLoaded, 5000).await {
            debug!("DOM content not loaded after navigation: {}", e);
        }
        Self::settle(page, 3000).await
    }

    /// Pause after an interaction, then settle according to whether the URL
    /// moved. Returns whether it did.
    pub async fn settle_after_interaction<P: PageTrait>(page: &P, url_before: &str) -> bool {
        tokio::time::sleep(Duration::from_millis(POST_ACTION_PAUSE_MS)).await;
        let navigated = match page.url().await {
            Ok(url) => url != url_before,
            Err(_) => false,
        };
        if navigated {
            Self::wait_for_navigation_settle(page).await;
        } else {
            Self::settle(page, 2000).await;
        }
        navigated
    }

    pub async fn wait_for_url_change<P: PageTrait>(page: &P, before: &str, timeout_ms: u64) -> Result<String> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match page.url().await {
                Ok(url) if url != before => return Ok(url),
                Ok(_) => {}
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => debug!("url probe failed: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserAgentError::ActionTimeout("url change".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    pub async fn wait_for_url<P: PageTrait>(page: &P, pattern: &str, timeout_ms: u64) -> Result<bool> {
        let matcher = UrlPattern::new(pattern)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Ok(url) = page.url().await {
                if matcher.matches(&url) {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}

/// URL glob: `**` spans anything, `*` stays within one path segment. A
/// pattern without wildcards matches any URL containing it.
#[derive(Debug)]
pub struct UrlPattern {
    regex: Option<Regex>,
    literal: String,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains('*') {
            return Ok(Self {
                regex: None,
                literal: pattern.to_string(),
            });
        }

        let mut source = String::from("^");
        for (i, part) in pattern.split("**").enumerate() {
            if i > 0 {
                source.push_str(".*");
            }
            let segments: Vec<String> = part.split('*').map(regex::escape).collect();
            source.push_str(&segments.join("[^/]*"));
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| BrowserAgentError::InvalidParams(format!("bad url pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            regex: Some(regex),
            literal: pattern.to_string(),
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(url),
            None => url.contains(&self.literal),
        }
    }
}
