#[cfg(feature = "chrome")]
pub mod cdp;
#[cfg(feature = "chrome")]
pub mod chrome;
pub mod interaction;
pub mod keys;
pub mod navigation;
pub mod session;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeBrowser, ChromeTab};
pub use interaction::{ClickStrategy, FocusStrategy, InteractionEngine};
pub use keys::KeyCombo;
pub use navigation::{LoadState, NavigationManager, SettleOutcome, UrlPattern};
pub use session::SessionManager;
