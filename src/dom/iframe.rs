//! Interactive elements inside child frames, which the main-frame
//! accessibility tree does not expose.
//!
//! Each frame runs one fixed scan script. Its only input is a JSON argument
//! object and its only output is a list of [`FrameElement`] descriptors.

use crate::core::{PageTrait, SnapshotConfig};
use crate::dom::element::{Element, ElementTarget};
use crate::dom::processor::Budget;
use crate::dom::state::{FrameSection, Registry};
use crate::types::FrameInfo;
use crate::utils::{truncate_chars, with_timeout};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const FRAME_SCAN_VERSION: u32 = 2;

/// Called with `{ version, maxResults }`; returns `FrameElement[]`, or `null`
/// when the caller expects another script version. Every selector it reports
/// matches exactly its own element; elements without one are left out.
pub const FRAME_SCAN_SCRIPT: &str = r#"function (args) {
    if (args.version !== 2) return null;
    const selectors = 'a[href], button, input, textarea, select, ' +
        '[role="button"], [role="link"], [role="menuitem"], [role="tab"], ' +
        '[role="checkbox"], [role="radio"], [role="switch"], [role="textbox"], ' +
        '[role="searchbox"], [role="combobox"], [contenteditable="true"]';
    const roleOf = (el) => {
        const explicit = el.getAttribute('role');
        if (explicit) return explicit;
        const tag = el.tagName.toLowerCase();
        if (tag === 'a') return 'link';
        if (tag === 'button') return 'button';
        if (tag === 'select') return 'combobox';
        if (tag === 'textarea') return 'textbox';
        if (tag === 'input') {
            const type = (el.getAttribute('type') || 'text').toLowerCase();
            if (type === 'checkbox' || type === 'radio') return type;
            if (type === 'submit' || type === 'button' || type === 'reset' || type === 'image') return 'button';
            if (type === 'search') return 'searchbox';
            return 'textbox';
        }
        if (el.isContentEditable) return 'textbox';
        return tag;
    };
    const nameOf = (el) => (
        el.getAttribute('aria-label') ||
        (el.innerText || el.textContent || '').trim().slice(0, 80) ||
        (typeof el.value === 'string' ? el.value : '') ||
        el.getAttribute('name') ||
        el.getAttribute('placeholder') ||
        el.getAttribute('title') || ''
    ).replace(/\s+/g, ' ').trim();
    const quote = (s) => '"' + s.replace(/\\/g, '\\\\').replace(/"/g, '\\"') + '"';
    const uniqueFor = (sel, el) => {
        try {
            const hits = document.querySelectorAll(sel);
            return hits.length === 1 && hits[0] === el;
        } catch (e) {
            return false;
        }
    };
    const stepOf = (el) => {
        const tag = el.tagName.toLowerCase();
        const siblings = el.parentElement
            ? Array.from(el.parentElement.children).filter(c => c.tagName === el.tagName)
            : [el];
        return siblings.length > 1 ? tag + ':nth-of-type(' + (siblings.indexOf(el) + 1) + ')' : tag;
    };
    const selectorOf = (el) => {
        if (el.id && uniqueFor('#' + CSS.escape(el.id), el)) return '#' + CSS.escape(el.id);
        const tag = el.tagName.toLowerCase();
        const label = el.getAttribute('aria-label');
        const name = el.getAttribute('name');
        let sel = '';
        if (label) {
            sel = tag + '[aria-label=' + quote(label) + ']';
        } else if (name) {
            sel = tag + '[name=' + quote(name) + ']';
        } else if (typeof el.className === 'string' && el.className.trim()) {
            sel = tag + '.' + el.className.trim().split(/\s+/).slice(0, 3).map(c => CSS.escape(c)).join('.');
        }
        if (sel && uniqueFor(sel, el)) return sel;

        // Full child-combinator path, anchored at body or the nearest unique id.
        let path = stepOf(el);
        for (let node = el.parentElement; node; node = node.parentElement) {
            if (node === document.body) {
                path = 'body > ' + path;
                break;
            }
            if (node.id && uniqueFor('#' + CSS.escape(node.id), node)) {
                path = '#' + CSS.escape(node.id) + ' > ' + path;
                break;
            }
            path = stepOf(node) + ' > ' + path;
        }
        return uniqueFor(path, el) ? path : '';
    };
    const results = [];
    for (const el of document.querySelectorAll(selectors)) {
        if (results.length >= args.maxResults) break;
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) continue;
        const style = getComputedStyle(el);
        if (el.offsetParent === null && style.position !== 'fixed') continue;
        if (style.visibility === 'hidden') continue;
        const selector = selectorOf(el);
        if (!selector) continue;
        const type = el.tagName.toLowerCase() === 'input' ? (el.getAttribute('type') || '') : '';
        results.push({
            role: roleOf(el),
            name: nameOf(el),
            value: typeof el.value === 'string' ? el.value : '',
            type: type,
            checked: (type === 'checkbox' || type === 'radio') ? String(el.checked) : null,
            selector: selector,
        });
    }
    return results;
}"#;

/// One element reported by [`FRAME_SCAN_SCRIPT`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrameElement {
    pub role: String,
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub checked: Option<String>,
    pub selector: String,
}

impl FrameElement {
    fn into_element(self, frame_index: usize) -> Element {
        let role = if self.role.is_empty() {
            "element".to_string()
        } else {
            self.role.to_lowercase()
        };
        Element::new(
            0,
            role,
            self.name,
            ElementTarget::Frame {
                index: frame_index,
                selector: self.selector,
            },
        )
        .with_value(self.value)
        .with_input_type(Some(self.input_type))
        .with_checked(self.checked)
    }
}

pub struct FrameDiscoverer<'a> {
    config: &'a SnapshotConfig,
    timeout_ms: u64,
}

impl<'a> FrameDiscoverer<'a> {
    pub fn new(config: &'a SnapshotConfig, timeout_ms: u64) -> Self {
        Self { config, timeout_ms }
    }

    /// Scans every child frame and registers what it finds, continuing the
    /// registry's ref numbering under the same budget. A frame that fails to
    /// answer is skipped.
    pub async fn discover<P: PageTrait>(
        &self,
        page: &P,
        registry: &mut Registry,
        budget: &mut Budget,
    ) -> Vec<FrameSection> {
        let frames = match page.child_frames().await {
            Ok(frames) => frames,
            Err(e) => {
                debug!("frame listing failed: {}", e);
                return Vec::new();
            }
        };

        let mut sections = Vec::new();
        for frame in frames {
            if budget.exhausted() {
                break;
            }
            let found = match self.scan(page, &frame).await {
                Ok(found) => found,
                Err(e) => {
                    debug!("frame {} scan failed: {}", frame.index, e);
                    continue;
                }
            };
            if found.is_empty() {
                continue;
            }

            let mut lines = Vec::new();
            for descriptor in found {
                if descriptor.selector.is_empty() {
                    continue;
                }
                let mut element = descriptor.into_element(frame.index);
                element.reference = registry.next_ref();
                let line = truncate_chars(&element.render_line("  "), self.config.line_width);
                if !budget.take_element(line.chars().count()) {
                    break;
                }
                registry.push(element);
                lines.push(line);
            }
            if !lines.is_empty() {
                sections.push(FrameSection { frame, lines });
            }
        }
        sections
    }

    async fn scan<P: PageTrait>(&self, page: &P, frame: &FrameInfo) -> crate::errors::Result<Vec<FrameElement>> {
        let args = json!({
            "version": FRAME_SCAN_VERSION,
            "maxResults": self.config.max_frame_elements,
        });
        let raw = with_timeout(
            self.timeout_ms,
            "frame scan",
            page.call_in_frame(frame.index, FRAME_SCAN_SCRIPT, args),
        )
        .await?;
        if raw.is_null() {
            return Ok(Vec::new());
        }
        let mut found: Vec<FrameElement> = serde_json::from_value(raw)?;
        found.truncate(self.config.max_frame_elements);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use serde_json::Value;

    fn send_button() -> Value {
        json!([{ "role": "button", "name": "Send", "value": "", "type": "", "selector": "#send" }])
    }

    #[tokio::test]
    async fn test_frame_elements_continue_numbering() {
        let page = FakePage::new("https://mail.test/");
        page.add_frame("https://mail.test/compose", send_button());

        let config = SnapshotConfig::default();
        let mut registry = Registry::new(page.page_id());
        registry.push(Element::new(0, "link", "Inbox", ElementTarget::Node(5)));
        let mut budget = Budget::new(&config);

        let sections = FrameDiscoverer::new(&config, 1000)
            .discover(&page, &mut registry, &mut budget)
            .await;

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].frame.index, 1);
        assert_eq!(sections[0].lines, vec!["  [  2] Button: \"Send\""]);
        let send = registry.resolve(2, &page.page_id()).unwrap();
        assert_eq!(send.frame_index(), 1);
        assert_eq!(send.frame_selector(), Some("#send"));
        assert_eq!(send.backend_id(), None);
    }

    #[tokio::test]
    async fn test_scan_receives_structured_arguments() {
        let page = FakePage::new("https://mail.test/");
        page.add_frame("https://mail.test/compose", send_button());

        let config = SnapshotConfig::default();
        let mut registry = Registry::new(page.page_id());
        let mut budget = Budget::new(&config);
        FrameDiscoverer::new(&config, 1000)
            .discover(&page, &mut registry, &mut budget)
            .await;

        let calls = page.frame_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 1);
        assert_eq!(calls[0].1, FRAME_SCAN_SCRIPT);
        assert_eq!(calls[0].2, json!({ "version": 2, "maxResults": 50 }));
    }

    #[tokio::test]
    async fn test_element_cap_is_shared_with_main_frame() {
        let page = FakePage::new("https://mail.test/");
        let many: Vec<Value> = (0..10)
            .map(|i| json!({ "role": "link", "name": format!("L{}", i), "selector": format!("#l{}", i) }))
            .collect();
        page.add_frame("https://mail.test/list", Value::Array(many));

        let config = SnapshotConfig {
            max_elements: 4,
            ..SnapshotConfig::default()
        };
        let mut registry = Registry::new(page.page_id());
        let mut budget = Budget::new(&config);
        assert!(budget.take_element(10));
        registry.push(Element::new(0, "link", "Main", ElementTarget::Node(1)));

        FrameDiscoverer::new(&config, 1000)
            .discover(&page, &mut registry, &mut budget)
            .await;
        assert_eq!(registry.len(), 4);
        assert!(budget.exhausted());
    }

    #[tokio::test]
    async fn test_unanswering_frame_is_skipped() {
        let page = FakePage::new("https://mail.test/");
        page.add_frame("https://ads.test/", Value::String("not a list".into()));
        page.add_frame("https://mail.test/compose", send_button());

        let config = SnapshotConfig::default();
        let mut registry = Registry::new(page.page_id());
        let mut budget = Budget::new(&config);
        let sections = FrameDiscoverer::new(&config, 1000)
            .discover(&page, &mut registry, &mut budget)
            .await;

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].frame.index, 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_element_without_unique_selector_is_not_registered() {
        let page = FakePage::new("https://mail.test/");
        page.add_frame(
            "https://mail.test/compose",
            json!([
                { "role": "button", "name": "Delete all", "selector": "" },
                { "role": "button", "name": "Send", "selector": "body > button" },
            ]),
        );

        let config = SnapshotConfig::default();
        let mut registry = Registry::new(page.page_id());
        let mut budget = Budget::new(&config);
        let sections = FrameDiscoverer::new(&config, 1000)
            .discover(&page, &mut registry, &mut budget)
            .await;

        assert_eq!(sections[0].lines, vec!["  [  1] Button: \"Send\""]);
        assert_eq!(registry.len(), 1);
        let send = registry.resolve(1, &page.page_id()).unwrap();
        assert_eq!(send.frame_selector(), Some("body > button"));
    }

    #[test]
    fn test_scan_script_checks_selector_uniqueness() {
        assert!(FRAME_SCAN_SCRIPT.contains("hits.length === 1 && hits[0] === el"));
        assert!(FRAME_SCAN_SCRIPT.contains("'body > ' + path"));
        assert!(FRAME_SCAN_SCRIPT.contains(&format!("args.version !== {}", FRAME_SCAN_VERSION)));
    }
}
