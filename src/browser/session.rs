use crate::core::{BrowserTrait, Config, PageTrait};
use crate::errors::{BrowserAgentError, Result};
use crate::types::TabInfo;
use crate::utils::with_timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owns the one browser process and the active tab.
///
/// Nothing is launched until the first [`get_page`](Self::get_page). Every
/// later call proves the active protocol session still answers and quietly
/// re-establishes it when it does not; the browser is only relaunched when
/// the browser endpoint itself is gone.
pub struct SessionManager<B: BrowserTrait> {
    browser: B,
    config: Config,
    active: Option<B::TabHandle>,
    session_id: Option<String>,
}

impl<B: BrowserTrait> SessionManager<B> {
    pub fn new(browser: B, config: Config) -> Self {
        Self {
            browser,
            config,
            active: None,
            session_id: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_launched(&self) -> bool {
        self.browser.is_running()
    }

    async fn launch(&mut self) -> Result<B::TabHandle> {
        let profile_dir = &self.config.browser.profile_dir;
        tokio::fs::create_dir_all(profile_dir).await.map_err(|e| {
            BrowserAgentError::LaunchFailed(format!("profile dir {}: {}", profile_dir.display(), e))
        })?;

        self.browser.launch(&self.config).await?;
        let session_id = Uuid::new_v4().to_string();
        info!(
            session_id = %session_id,
            profile = %profile_dir.display(),
            headless = self.config.browser.headless,
            "browser launched"
        );
        self.session_id = Some(session_id);

        let page = self.first_or_new_tab().await?;
        self.active = Some(page.clone());
        Ok(page)
    }

    async fn first_or_new_tab(&self) -> Result<B::TabHandle> {
        match self.browser.tabs().await?.into_iter().last() {
            Some(tab) => Ok(tab),
            None => self.browser.new_tab().await,
        }
    }

    async fn healthy(&self, page: &B::TabHandle) -> bool {
        match with_timeout(self.config.timeouts.health_check_ms, "health check", page.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("protocol session unhealthy: {}", e);
                false
            }
        }
    }

    /// The active page with a live protocol session, launching the browser on
    /// first use.
    pub async fn get_page(&mut self) -> Result<B::TabHandle> {
        if !self.browser.is_running() {
            return self.launch().await;
        }

        let Some(active) = self.active.clone() else {
            let page = self.first_or_new_tab().await?;
            self.active = Some(page.clone());
            return Ok(page);
        };
        if self.healthy(&active).await {
            return Ok(active);
        }

        match self.browser.reattach(&active).await {
            Ok(page) => {
                if self.healthy(&page).await {
                    info!("protocol session re-established on {}", page.page_id());
                    self.active = Some(page.clone());
                    return Ok(page);
                }
                debug!("reattached session did not answer");
            }
            Err(e) => debug!("reattach failed: {}", e),
        }

        if self.browser.ping().await.is_ok() {
            let page = self.first_or_new_tab().await?;
            info!("active page gone, continuing on {}", page.page_id());
            self.active = Some(page.clone());
            return Ok(page);
        }

        warn!("browser endpoint gone, relaunching");
        self.active = None;
        if let Err(e) = self.browser.shutdown().await {
            warn!("shutdown of dead browser failed: {}", e);
        }
        self.launch().await
    }

    pub async fn tab_infos(&self) -> Vec<TabInfo> {
        let tabs = match self.browser.tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                debug!("tab listing failed: {}", e);
                return Vec::new();
            }
        };
        let active_id = self.active.as_ref().map(PageTrait::page_id);

        let mut infos = Vec::with_capacity(tabs.len());
        for (index, tab) in tabs.iter().enumerate() {
            infos.push(TabInfo {
                index,
                url: tab.url().await.unwrap_or_default(),
                active: active_id.as_deref() == Some(tab.page_id().as_str()),
            });
        }
        infos
    }

    async fn activate(&mut self, tab: B::TabHandle) -> Result<B::TabHandle> {
        let tab = if self.healthy(&tab).await {
            tab
        } else {
            self.browser.reattach(&tab).await?
        };
        if let Err(e) = tab.bring_to_front().await {
            debug!("bring to front failed: {}", e);
        }
        self.active = Some(tab.clone());
        Ok(tab)
    }

    pub async fn new_tab(&mut self) -> Result<B::TabHandle> {
        self.get_page().await?;
        let tab = self.browser.new_tab().await?;
        info!("opened tab {}", tab.page_id());
        self.activate(tab).await
    }

    pub async fn switch_tab(&mut self, index: usize) -> Result<B::TabHandle> {
        self.get_page().await?;
        let tabs = self.browser.tabs().await?;
        let last = tabs.len().saturating_sub(1);
        let tab = tabs
            .into_iter()
            .nth(index)
            .ok_or(BrowserAgentError::TabIndexOutOfRange { index, last })?;
        self.activate(tab).await
    }

    /// Closes the active tab and activates the last remaining one, opening a
    /// blank tab when none is left.
    pub async fn close_tab(&mut self) -> Result<B::TabHandle> {
        let page = self.get_page().await?;
        page.close().await?;
        self.active = None;
        info!("closed tab {}", page.page_id());

        let next = match self.browser.tabs().await?.into_iter().last() {
            Some(tab) => tab,
            None => self.browser.new_tab().await?,
        };
        self.activate(next).await
    }

    /// Ordered teardown: detach the protocol session, close the pages, stop
    /// the browser. Each step's failure is logged and the next step still runs.
    pub async fn close_all(&mut self) {
        if let Some(page) = self.active.take() {
            if let Err(e) = page.detach().await {
                warn!("detaching protocol session failed: {}", e);
            }
        }
        if self.browser.is_running() {
            if let Err(e) = self.browser.close().await {
                warn!("closing pages failed: {}", e);
            }
            if let Err(e) = self.browser.shutdown().await {
                warn!("stopping browser failed: {}", e);
            }
        }
        if let Some(session_id) = self.session_id.take() {
            info!(session_id = %session_id, "browser session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBrowser;

    fn manager(browser: &FakeBrowser) -> (SessionManager<FakeBrowser>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.browser.profile_dir = dir.path().join("profile");
        (SessionManager::new(browser.clone(), config), dir)
    }

    #[tokio::test]
    async fn test_launches_lazily_once() {
        let browser = FakeBrowser::new();
        let (mut session, dir) = manager(&browser);
        assert_eq!(browser.launches(), 0);
        assert!(session.session_id().is_none());

        let first = session.get_page().await.unwrap();
        let second = session.get_page().await.unwrap();
        assert_eq!(first.page_id(), second.page_id());
        assert_eq!(browser.launches(), 1);
        assert!(session.session_id().is_some());
        assert!(dir.path().join("profile").is_dir());
    }

    #[tokio::test]
    async fn test_dead_session_is_reattached_without_relaunch() {
        let browser = FakeBrowser::new();
        let (mut session, _dir) = manager(&browser);
        let page = session.get_page().await.unwrap();
        page.kill_session();
        assert!(page.ping().await.is_err());

        let recovered = session.get_page().await.unwrap();
        assert_eq!(recovered.page_id(), page.page_id());
        tokio_test::assert_ok!(recovered.ping().await);
        assert_eq!(browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_closed_page_moves_to_another_tab() {
        let browser = FakeBrowser::new();
        let (mut session, _dir) = manager(&browser);
        let page = session.get_page().await.unwrap();
        page.close().await.unwrap();

        let next = session.get_page().await.unwrap();
        assert_ne!(next.page_id(), page.page_id());
        assert_eq!(browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_dead_browser_is_relaunched() {
        let browser = FakeBrowser::new();
        let (mut session, _dir) = manager(&browser);
        let page = session.get_page().await.unwrap();
        let first_id = session.session_id().map(str::to_string);

        page.kill_session();
        browser.set_ping_failing(true);
        session.get_page().await.unwrap();

        assert_eq!(browser.launches(), 2);
        assert_eq!(browser.shutdowns(), 1);
        assert_ne!(session.session_id().map(str::to_string), first_id);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let browser = FakeBrowser::new();
        browser.fail_launch("no chrome binary");
        let (mut session, _dir) = manager(&browser);

        let err = session.get_page().await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_tabs_switch_and_close() {
        let browser = FakeBrowser::new();
        let (mut session, _dir) = manager(&browser);
        let first = session.get_page().await.unwrap();
        let second = session.new_tab().await.unwrap();

        let infos = session.tab_infos().await;
        assert_eq!(infos.len(), 2);
        assert!(!infos[0].active && infos[1].active);

        let switched = session.switch_tab(0).await.unwrap();
        assert_eq!(switched.page_id(), first.page_id());

        let err = session.switch_tab(5).await.unwrap_err();
        assert!(matches!(err, BrowserAgentError::TabIndexOutOfRange { index: 5, last: 1 }));

        let remaining = session.close_tab().await.unwrap();
        assert_eq!(remaining.page_id(), second.page_id());
        assert_eq!(browser.open_tabs().len(), 1);
    }

    #[tokio::test]
    async fn test_close_all_runs_every_step() {
        let browser = FakeBrowser::new();
        let (mut session, _dir) = manager(&browser);
        let page = session.get_page().await.unwrap();

        session.close_all().await;
        assert_eq!(page.detach_count(), 1);
        assert_eq!(browser.closes(), 1);
        assert_eq!(browser.shutdowns(), 1);
        assert!(!session.is_launched());
        assert!(session.session_id().is_none());

        session.get_page().await.unwrap();
        assert_eq!(browser.launches(), 2);
    }
}
