pub mod browser;
pub mod config;
pub mod page;

pub use browser::BrowserTrait;
pub use config::{BrowserConfig, Config, PathConfig, SnapshotConfig, TimeoutConfig};
pub use page::PageTrait;
