pub mod types;

pub use types::{BrowserAgentError, Result};
