use crate::errors::Result;
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub snapshot: SnapshotConfig,
    pub timeouts: TimeoutConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
    pub executable: Option<PathBuf>,
    /// Hide automation flags (`navigator.webdriver` and friends) on every tab.
    pub stealth: bool,
    /// Persistent user-data directory so cookies and logins survive restarts.
    pub profile_dir: PathBuf,
    pub idle_timeout_ms: u64,
}

/// Caps protecting the caller's context budget. All of them are enforced while
/// the tree is walked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub max_chars: usize,
    pub max_elements: usize,
    pub line_width: usize,
    pub max_indent: usize,
    pub max_frame_elements: usize,
    pub text_limit: usize,
    pub merged_text_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub protocol_ms: u64,
    pub ax_tree_ms: u64,
    pub health_check_ms: u64,
    pub frame_script_ms: u64,
    pub navigation_ms: u64,
    pub settle_ms: u64,
    pub history_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub screenshot_dir: PathBuf,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".browser-act")
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            args: vec![],
            executable: None,
            stealth: true,
            profile_dir: data_dir().join("profile"),
            idle_timeout_ms: 300_000,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            max_elements: 80,
            line_width: 200,
            max_indent: 6,
            max_frame_elements: 50,
            text_limit: 4000,
            merged_text_limit: 6000,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            protocol_ms: 5000,
            ax_tree_ms: 10_000,
            health_check_ms: 3000,
            frame_script_ms: 5000,
            navigation_ms: 30_000,
            settle_ms: 4000,
            history_ms: 10_000,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: data_dir().join("screenshots"),
        }
    }
}
