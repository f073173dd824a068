pub mod base;
pub mod dispatcher;

pub use base::{normalize_url, Action, ActionKind, ActionParams};
pub use dispatcher::Dispatcher;
