use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserAgentError {
    #[error("ref [{0}] not found. Run snapshot to refresh the element list.")]
    RefNotFound(u32),

    #[error("Element could not be resolved: {0}")]
    ElementUnresolvable(String),

    #[error("Protocol session lost: {0}")]
    ProtocolSessionLost(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Timed out waiting for {0}")]
    ActionTimeout(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Tab index {index} out of range (0-{last})")]
    TabIndexOutOfRange { index: usize, last: usize },

    #[error("{0}")]
    InvalidParams(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chrome error: {0}")]
    ChromeError(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, BrowserAgentError>;

impl BrowserAgentError {
    /// Timeouts on bounded waits are best-effort: the page is usually still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BrowserAgentError::NavigationTimeout(_) | BrowserAgentError::ActionTimeout(_)
        )
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, BrowserAgentError::ProtocolSessionLost(_))
    }
}

// headless_chrome reports everything as anyhow::Error; a closed transport means
// the protocol session is gone rather than the command being wrong.
impl From<anyhow::Error> for BrowserAgentError {
    fn from(err: anyhow::Error) -> Self {
        #[cfg(feature = "chrome")]
        if err
            .downcast_ref::<headless_chrome::browser::ConnectionClosed>()
            .is_some()
        {
            return BrowserAgentError::ProtocolSessionLost(err.to_string());
        }
        BrowserAgentError::AnyhowError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_recoverable() {
        assert!(BrowserAgentError::NavigationTimeout("x".into()).is_recoverable());
        assert!(BrowserAgentError::ActionTimeout("x".into()).is_recoverable());
        assert!(!BrowserAgentError::RefNotFound(3).is_recoverable());
        assert!(!BrowserAgentError::ProtocolSessionLost("x".into()).is_recoverable());
    }

    #[test]
    fn test_ref_not_found_message_asks_for_snapshot() {
        let msg = BrowserAgentError::RefNotFound(999).to_string();
        assert!(msg.contains("[999]"));
        assert!(msg.contains("snapshot"));
    }

    #[test]
    fn test_plain_anyhow_error_is_not_session_loss() {
        let err: BrowserAgentError = anyhow::anyhow!("Node is detached").into();
        assert!(!err.is_session_lost());
        assert!(matches!(err, BrowserAgentError::AnyhowError(_)));
    }
}
