pub mod ax;
pub mod element;
pub mod iframe;
pub mod processor;
pub mod state;

pub use ax::{AxNode, AxProperty, AxValue};
pub use element::{Element, ElementTarget};
pub use iframe::{FrameDiscoverer, FrameElement};
pub use processor::{extract_page_text, Budget, SnapshotBuilder, TreeWalk};
pub use state::{FrameSection, Registry, Snapshot};
