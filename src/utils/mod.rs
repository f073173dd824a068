pub mod javascript;
pub mod screenshot;

use crate::errors::{BrowserAgentError, Result};
use std::future::Future;
use std::time::Duration;

pub use javascript::JavaScriptRunner;
pub use screenshot::ScreenshotManager;

/// Bounds `fut` by `timeout_ms`; elapsing is reported as `ActionTimeout(what)`.
pub async fn with_timeout<T, F>(timeout_ms: u64, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
        .await
        .map_err(|_| BrowserAgentError::ActionTimeout(what.to_string()))?
}

/// Cuts `text` to at most `width` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_chars("ééééé", 4), "é...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_reports_what_elapsed() {
        let result: Result<()> = with_timeout(50, "the tree", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(BrowserAgentError::ActionTimeout(what)) => assert_eq!(what, "the tree"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
