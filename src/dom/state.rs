use crate::dom::element::Element;
use crate::errors::{BrowserAgentError, Result};
use crate::types::{FrameInfo, TabInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ref-to-element map for one snapshot generation of one page.
///
/// Refs start at 1 and are contiguous. A registry is only ever replaced
/// wholesale; the previous generation stays untouched until then.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    page_id: String,
    elements: BTreeMap<u32, Element>,
}

impl Registry {
    pub fn new(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            elements: BTreeMap::new(),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn next_ref(&self) -> u32 {
        self.elements.len() as u32 + 1
    }

    pub fn push(&mut self, mut element: Element) -> u32 {
        let reference = self.next_ref();
        element.reference = reference;
        self.elements.insert(reference, element);
        reference
    }

    pub fn set_input_type(&mut self, reference: u32, input_type: Option<String>) {
        if let Some(element) = self.elements.get_mut(&reference) {
            element.input_type = input_type.filter(|t| !t.is_empty());
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Looks `reference` up for an action on `page_id`. A registry built for
    /// another page resolves nothing.
    pub fn resolve(&self, reference: u32, page_id: &str) -> Result<&Element> {
        if self.page_id != page_id {
            return Err(BrowserAgentError::RefNotFound(reference));
        }
        self.elements
            .get(&reference)
            .ok_or(BrowserAgentError::RefNotFound(reference))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSection {
    pub frame: FrameInfo,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    pub tabs: Vec<TabInfo>,
    pub lines: Vec<String>,
    pub frames: Vec<FrameSection>,
    pub element_count: usize,
    pub truncated: bool,
}

impl Snapshot {
    pub fn render(&self) -> String {
        let mut out = format!("URL: {}\nTitle: {}", self.url, self.title);

        if self.tabs.len() > 1 {
            out.push_str("\nTabs:");
            for tab in &self.tabs {
                let marker = if tab.active { "→" } else { " " };
                let url: String = tab.url.chars().take(80).collect();
                out.push_str(&format!("\n  {} [{}] {}", marker, tab.index, url));
            }
        }

        out.push_str("\n\n");
        if self.lines.is_empty() && self.frames.is_empty() {
            out.push_str("(empty page — no content detected)");
        } else {
            out.push_str(&self.lines.join("\n"));
        }

        for section in &self.frames {
            let url: String = if section.frame.url.is_empty() {
                "(embedded)".to_string()
            } else {
                section.frame.url.chars().take(60).collect()
            };
            out.push_str(&format!("\n\n── Frame [{}]: {} ──", section.frame.index, url));
            for line in &section.lines {
                out.push('\n');
                out.push_str(line);
            }
        }

        if self.truncated {
            out.push_str("\n(snapshot truncated: element or character limit reached)");
        }

        if self.element_count == 0 {
            out.push_str("\n(no interactive elements found on this page)");
        } else {
            out.push_str(&format!(
                "\n({} interactive elements. Use ref=N to interact.)",
                self.element_count
            ));
        }
        out
    }
}
