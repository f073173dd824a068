use crate::core::PageTrait;
use crate::errors::{BrowserAgentError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub struct ScreenshotManager;

impl ScreenshotManager {
    /// `shot_YYYYmmdd_HHMMSS.png`
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("shot_{}.png", at.format("%Y%m%d_%H%M%S"))
    }

    /// Captures the viewport as PNG into `dir`, creating it if needed.
    pub async fn save_to_dir<P: PageTrait>(page: &P, dir: &Path) -> Result<PathBuf> {
        let bytes = page.screenshot().await?;
        if bytes.is_empty() {
            return Err(BrowserAgentError::ScreenshotFailed("empty image".to_string()));
        }
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name(Local::now()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(ScreenshotManager::file_name(at), "shot_20240309_140507.png");
    }

    #[tokio::test]
    async fn test_save_to_dir_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shots");
        let page = FakePage::new("https://a.test/");

        let path = ScreenshotManager::save_to_dir(&page, &target).await.unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(std::fs::read(&path).unwrap(), FakePage::SCREENSHOT_BYTES);
    }
}
