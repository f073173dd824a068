pub mod actions;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod utils;

pub use actions::{Action, ActionKind, ActionParams, Dispatcher};
#[cfg(feature = "chrome")]
pub use browser::ChromeBrowser;
pub use browser::SessionManager;
pub use crate::core::{BrowserTrait, Config, PageTrait};
pub use dom::{Element, ElementTarget, Registry, Snapshot};
pub use errors::{BrowserAgentError, Result};
pub use types::*;
