use crate::core::{Config, PageTrait};
use crate::errors::Result;
use async_trait::async_trait;

/// Process-level driver: one browser with a persistent profile and its tabs.
#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type TabHandle: PageTrait + Clone + 'static;

    /// Launch the browser process with the configured profile directory
    async fn launch(&mut self, config: &Config) -> Result<()>;

    /// Check if browser is still running
    fn is_running(&self) -> bool;

    /// Cheap round-trip against the browser endpoint itself
    async fn ping(&self) -> Result<()>;

    /// Open tabs in creation order
    async fn tabs(&self) -> Result<Vec<Self::TabHandle>>;

    /// Create a new tab/page
    async fn new_tab(&self) -> Result<Self::TabHandle>;

    /// Attach a fresh protocol session to an existing tab
    async fn reattach(&self, tab: &Self::TabHandle) -> Result<Self::TabHandle>;

    /// Close every page and the browser context
    async fn close(&mut self) -> Result<()>;

    /// Stop the underlying browser process
    async fn shutdown(&mut self) -> Result<()>;
}
