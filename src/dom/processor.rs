use crate::core::{PageTrait, SnapshotConfig, TimeoutConfig};
use crate::dom::ax::AxNode;
use crate::dom::element::{Element, ElementTarget};
use crate::dom::iframe::FrameDiscoverer;
use crate::dom::state::{Registry, Snapshot};
use crate::types::{BackendNodeId, TabInfo};
use crate::utils::{truncate_chars, with_timeout};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, warn};

pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "combobox",
    "spinbutton",
    "checkbox",
    "radio",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "tab",
    "switch",
    "treeitem",
    "slider",
    "listbox",
    "columnheader",
    "rowheader",
    "gridcell",
];

pub const CONTENT_ROLES: &[&str] = &[
    "heading",
    "paragraph",
    "text",
    "statictext",
    "blockquote",
    "caption",
    "code",
    "listitem",
    "cell",
    "definition",
    "status",
    "alert",
    "log",
    "marquee",
    "timer",
    "contentinfo",
    "complementary",
    "main",
    "article",
    "navigation",
    "banner",
    "region",
    "form",
    "dialog",
    "alertdialog",
];

/// Unnamed nodes of these roles are wrappers; their label lives one level down.
const LABEL_WRAPPER_ROLES: &[&str] = &["button", "link", "menuitem"];

/// Extra room reserved for a textbox line that later turns out to be a
/// password field.
const PASSWORD_MARK_SLACK: usize = "(password)".len();

const INDENT: &str = "  ";

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_interactive(node: &AxNode, role: &str) -> bool {
    INTERACTIVE_ROLES.contains(&role) || (role == "heading" && node.flag("focusable"))
}

/// Shared character and element allowance for one snapshot. Checked before
/// every line so neither cap is ever exceeded.
#[derive(Debug, Clone)]
pub struct Budget {
    max_chars: usize,
    max_elements: usize,
    chars: usize,
    elements: usize,
    exhausted: bool,
}

impl Budget {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            max_elements: config.max_elements,
            chars: 0,
            elements: 0,
            exhausted: false,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn chars_used(&self) -> usize {
        self.chars
    }

    pub fn take_line(&mut self, cost: usize) -> bool {
        if self.exhausted || self.chars + cost + 1 > self.max_chars {
            self.exhausted = true;
            return false;
        }
        self.chars += cost + 1;
        true
    }

    pub fn take_element(&mut self, cost: usize) -> bool {
        if self.elements >= self.max_elements {
            self.exhausted = true;
            return false;
        }
        if !self.take_line(cost) {
            return false;
        }
        self.elements += 1;
        true
    }
}

#[derive(Debug, Clone)]
enum Line {
    Text(String),
    Element { indent: usize, reference: u32 },
}

#[derive(Debug)]
pub struct TreeWalk {
    pub registry: Registry,
    pub budget: Budget,
    lines: Vec<Line>,
    width: usize,
}

impl TreeWalk {
    /// Renders the body lines against the current registry state, so element
    /// details filled in after the walk show up.
    pub fn render_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Text(text) => Some(text.clone()),
                Line::Element { indent, reference } => self
                    .registry
                    .resolve(*reference, self.registry.page_id())
                    .ok()
                    .map(|el| truncate_chars(&el.render_line(&INDENT.repeat(*indent)), self.width)),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

struct Pending<'a> {
    id: &'a str,
    depth: usize,
    parent_text: Option<Rc<str>>,
}

fn push_children<'a>(
    stack: &mut Vec<Pending<'a>>,
    node: &'a AxNode,
    depth: usize,
    parent_text: Option<Rc<str>>,
) {
    // Reversed so the first child pops first.
    for id in node.child_ids.iter().rev() {
        stack.push(Pending {
            id: id.as_str(),
            depth,
            parent_text: parent_text.clone(),
        });
    }
}

pub struct SnapshotBuilder {
    config: SnapshotConfig,
}

impl SnapshotBuilder {
    pub fn new(config: SnapshotConfig) -> Self {
        Self { config }
    }

    /// Walks the tree into a registry plus body lines, falling back to a flat
    /// scan when the structured walk produces nothing.
    pub fn walk(&self, nodes: &[AxNode], page_id: &str) -> TreeWalk {
        let mut walk = TreeWalk {
            registry: Registry::new(page_id),
            budget: Budget::new(&self.config),
            lines: Vec::new(),
            width: self.config.line_width,
        };

        self.walk_tree(nodes, &mut walk);
        if walk.lines.is_empty() && !nodes.is_empty() {
            debug!("tree walk produced no lines, scanning {} nodes flat", nodes.len());
            walk.registry = Registry::new(page_id);
            walk.budget = Budget::new(&self.config);
            self.scan_flat(nodes, &mut walk);
        }
        walk
    }

    fn walk_tree(&self, nodes: &[AxNode], walk: &mut TreeWalk) {
        let index: HashMap<&str, &AxNode> =
            nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();
        let children: HashSet<&str> = nodes
            .iter()
            .flat_map(|n| n.child_ids.iter().map(String::as_str))
            .collect();

        let mut stack: Vec<Pending> = nodes
            .iter()
            .filter(|n| !children.contains(n.node_id.as_str()))
            .rev()
            .map(|n| Pending {
                id: n.node_id.as_str(),
                depth: 0,
                parent_text: None,
            })
            .collect();
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(Pending { id, depth, parent_text }) = stack.pop() {
            if walk.budget.exhausted() {
                break;
            }
            let Some(node) = index.get(id).copied() else {
                continue;
            };
            if !visited.insert(id) {
                continue;
            }

            if node.ignored {
                push_children(&mut stack, node, depth, parent_text);
                continue;
            }

            let role = node.role();
            let name = collapse_whitespace(&node.name());
            let indent = depth.min(self.config.max_indent);

            if is_interactive(node, &role) {
                if name.is_empty() && LABEL_WRAPPER_ROLES.contains(&role.as_str()) {
                    push_children(&mut stack, node, depth + 1, parent_text);
                    continue;
                }
                if let Some(backend_id) = node.backend_id() {
                    self.register(walk, node, role, name, backend_id, indent);
                    continue;
                }
            }

            let mut next_parent = parent_text;
            if CONTENT_ROLES.contains(&role.as_str()) && !name.is_empty() {
                let echoes_parent = matches!(role.as_str(), "statictext" | "text")
                    && next_parent.as_deref() == Some(name.as_str());
                if !echoes_parent {
                    let line = truncate_chars(
                        &format!("{}{}", INDENT.repeat(indent), content_prefix(&role, &name)),
                        self.config.line_width,
                    );
                    if !walk.budget.take_line(line.chars().count()) {
                        break;
                    }
                    walk.lines.push(Line::Text(line));
                }
                next_parent = Some(Rc::from(name.as_str()));
            }
            push_children(&mut stack, node, depth + 1, next_parent);
        }
    }

    fn scan_flat(&self, nodes: &[AxNode], walk: &mut TreeWalk) {
        for node in nodes {
            if walk.budget.exhausted() {
                break;
            }
            if node.ignored {
                continue;
            }
            let role = node.role();
            let name = collapse_whitespace(&node.name());

            if is_interactive(node, &role) {
                if let Some(backend_id) = node.backend_id() {
                    if name.is_empty() && LABEL_WRAPPER_ROLES.contains(&role.as_str()) {
                        continue;
                    }
                    self.register(walk, node, role, name, backend_id, 0);
                    continue;
                }
            }
            if CONTENT_ROLES.contains(&role.as_str()) && name.chars().count() > 3 {
                let prefix = if role == "heading" { "## " } else { "" };
                let line = truncate_chars(&format!("{}{}", prefix, name), self.config.line_width);
                if walk.budget.take_line(line.chars().count()) {
                    walk.lines.push(Line::Text(line));
                }
            }
        }
    }

    fn register(
        &self,
        walk: &mut TreeWalk,
        node: &AxNode,
        role: String,
        name: String,
        backend_id: BackendNodeId,
        indent: usize,
    ) {
        let element = Element::new(walk.registry.next_ref(), role, name, ElementTarget::Node(backend_id))
            .with_value(collapse_whitespace(&node.value()))
            .with_checked(node.property("checked"));

        let rendered = truncate_chars(&element.render_line(&INDENT.repeat(indent)), self.config.line_width);
        let mut cost = rendered.chars().count();
        if element.role == "textbox" {
            cost = (cost + PASSWORD_MARK_SLACK).min(self.config.line_width);
        }
        if !walk.budget.take_element(cost) {
            return;
        }
        let reference = walk.registry.push(element);
        walk.lines.push(Line::Element { indent, reference });
    }

    /// Builds the complete snapshot of `page`. Never fails: an unreadable
    /// tree or frame degrades the snapshot instead.
    pub async fn capture<P: PageTrait>(
        &self,
        page: &P,
        tabs: Vec<TabInfo>,
        timeouts: &TimeoutConfig,
    ) -> (Registry, Snapshot) {
        let url = page.url().await.unwrap_or_default();
        let title = page
            .title()
            .await
            .unwrap_or_else(|_| "(unknown)".to_string());

        let nodes = fetch_tree(page, timeouts).await;
        let mut walk = self.walk(&nodes, &page.page_id());
        mark_password_fields(page, &mut walk.registry).await;
        let lines = walk.render_lines();

        let frames = FrameDiscoverer::new(&self.config, timeouts.frame_script_ms)
            .discover(page, &mut walk.registry, &mut walk.budget)
            .await;

        let snapshot = Snapshot {
            url,
            title,
            tabs,
            lines,
            frames,
            element_count: walk.registry.len(),
            truncated: walk.budget.exhausted(),
        };
        (walk.registry, snapshot)
    }
}

/// One bounded tree fetch; a failure is an empty tree.
pub async fn fetch_tree<P: PageTrait>(page: &P, timeouts: &TimeoutConfig) -> Vec<AxNode> {
    match with_timeout(timeouts.ax_tree_ms, "accessibility tree", page.accessibility_tree()).await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("AX tree fetch failed: {}", e);
            Vec::new()
        }
    }
}

async fn mark_password_fields<P: PageTrait>(page: &P, registry: &mut Registry) {
    let textboxes: Vec<(u32, BackendNodeId)> = registry
        .iter()
        .filter(|el| el.role == "textbox")
        .filter_map(|el| el.backend_id().map(|id| (el.reference, id)))
        .collect();

    if textboxes.is_empty() {
        return;
    }
    let types = match page.input_types().await {
        Ok(types) => types,
        Err(e) => {
            debug!("input type lookup failed: {}", e);
            return;
        }
    };
    for (reference, backend_id) in textboxes {
        registry.set_input_type(reference, types.get(&backend_id).cloned());
    }
}

fn content_prefix(role: &str, name: &str) -> String {
    match role {
        "heading" => format!("## {}", name),
        "dialog" | "alertdialog" => format!("⚠ DIALOG: {}", name),
        "alert" | "status" => format!("! {}", name),
        "navigation" => format!("[nav: {}]", name),
        "listitem" => format!("• {}", name),
        _ => name.to_string(),
    }
}

/// Readable main-frame text for `getText`: deduplicated, role-formatted,
/// capped at `limit` characters.
pub fn extract_page_text(nodes: &[AxNode], limit: usize) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut lines: Vec<String> = Vec::new();
    let mut total = 0;

    for node in nodes.iter().filter(|n| !n.ignored) {
        if total >= limit {
            break;
        }
        let name = collapse_whitespace(&node.name());
        if name.chars().count() < 3 {
            continue;
        }
        let key: String = name.chars().take(100).collect();
        if !seen.insert(key) {
            continue;
        }

        let role = node.role();
        let line = match role.as_str() {
            "heading" => format!("## {}", name),
            "listitem" => format!("• {}", name),
            "link" => format!("[{}]", name),
            "statictext" | "text" | "paragraph" | "blockquote" | "cell" | "gridcell"
            | "caption" | "definition" | "contentinfo" | "article" | "main" | "region"
            | "complementary" | "group" | "section" => name,
            "row" => format!("| {}", name),
            "img" | "image" => format!("[Image: {}]", name),
            "label" => format!("{}:", name),
            "status" | "alert" | "log" => format!("! {}", name),
            "treeitem" => format!("  > {}", name),
            "tab" => format!("[Tab: {}]", name),
            "dialog" | "alertdialog" => format!("DIALOG: {}", name),
            "button" if name.chars().count() > 10 => format!("[{}]", name),
            "generic" | "none" | "presentation" if name.chars().count() > 20 => name,
            _ => continue,
        };
        let line = truncate_chars(&line, 300);
        total += line.chars().count();
        lines.push(line);
    }

    let joined = lines.join("\n");
    joined.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ax::{AxProperty, AxValue};
    use crate::testing::FakePage;

    pub(crate) fn node(id: &str, role: &str, name: &str, backend: Option<i64>, children: &[&str]) -> AxNode {
        AxNode {
            node_id: id.to_string(),
            role: Some(AxValue::string(role)),
            name: Some(AxValue::string(name)),
            backend_dom_node_id: backend,
            child_ids: children.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(SnapshotConfig::default())
    }

    fn login_tree() -> Vec<AxNode> {
        vec![
            node("1", "RootWebArea", "Login", Some(1), &["2", "3", "4", "5"]),
            node("2", "heading", "Sign in", Some(2), &["6"]),
            node("6", "StaticText", "Sign in", None, &[]),
            node("3", "textbox", "Username", Some(3), &[]),
            node("4", "textbox", "Password", Some(4), &[]),
            node("5", "button", "Submit", Some(5), &[]),
        ]
    }

    #[test]
    fn test_walk_registers_interactive_nodes_in_document_order() {
        let walk = builder().walk(&login_tree(), "page");
        let roles: Vec<_> = walk.registry.iter().map(|e| (e.reference, e.name.clone())).collect();
        assert_eq!(
            roles,
            vec![
                (1, "Username".to_string()),
                (2, "Password".to_string()),
                (3, "Submit".to_string())
            ]
        );

        let lines = walk.render_lines();
        assert_eq!(lines[0], "  ## Sign in");
        assert_eq!(lines[1], "  [  1] Textbox: \"Username\"");
        assert_eq!(lines.len(), 4, "static text echoing its heading is dropped: {:?}", lines);
    }

    #[test]
    fn test_ignored_container_children_are_still_walked() {
        let mut wrapper = node("2", "generic", "", None, &["3"]);
        wrapper.ignored = true;
        let nodes = vec![
            node("1", "RootWebArea", "", Some(1), &["2"]),
            wrapper,
            node("3", "link", "Docs", Some(3), &[]),
        ];
        let walk = builder().walk(&nodes, "page");
        assert_eq!(walk.registry.len(), 1);
        assert_eq!(walk.render_lines(), vec!["  [  1] Link: \"Docs\""]);
    }

    #[test]
    fn test_unnamed_link_defers_to_labelled_child() {
        let nodes = vec![
            node("1", "RootWebArea", "", Some(1), &["2"]),
            node("2", "link", "", Some(2), &["3"]),
            node("3", "button", "Open menu", Some(3), &[]),
        ];
        let walk = builder().walk(&nodes, "page");
        let only = walk.registry.resolve(1, "page").unwrap();
        assert_eq!(only.name, "Open menu");
        assert_eq!(walk.render_lines(), vec!["    [  1] Button: \"Open menu\""]);
    }

    #[test]
    fn test_children_of_registered_element_are_not_walked() {
        let nodes = vec![
            node("1", "RootWebArea", "", Some(1), &["2"]),
            node("2", "button", "Save", Some(2), &["3"]),
            node("3", "link", "Inner", Some(3), &[]),
        ];
        assert_eq!(builder().walk(&nodes, "page").registry.len(), 1);
    }

    #[test]
    fn test_content_line_formats() {
        let nodes = vec![
            node("1", "RootWebArea", "", Some(1), &["2", "3", "4", "5"]),
            node("2", "alert", "Saved", None, &[]),
            node("3", "dialog", "Confirm", None, &[]),
            node("4", "navigation", "Primary", None, &[]),
            node("5", "listitem", "First", None, &[]),
        ];
        let lines = builder().walk(&nodes, "page").render_lines();
        assert_eq!(
            lines,
            vec!["  ! Saved", "  ⚠ DIALOG: Confirm", "  [nav: Primary]", "  • First"]
        );
    }

    #[test]
    fn test_indentation_is_capped() {
        let mut nodes = Vec::new();
        for i in 1..=10 {
            let child = format!("{}", i + 1);
            let children: Vec<&str> = if i < 10 { vec![child.as_str()] } else { vec![] };
            let role = if i < 10 { "generic" } else { "button" };
            nodes.push(node(&i.to_string(), role, if i < 10 { "" } else { "Deep" }, Some(i), &children));
        }
        let lines = builder().walk(&nodes, "page").render_lines();
        assert_eq!(lines, vec![format!("{}[  1] Button: \"Deep\"", "  ".repeat(6))]);
    }

    #[test]
    fn test_caps_hold_on_huge_pages() {
        let ids: Vec<String> = (2..2002).map(|i| i.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut nodes = vec![node("1", "RootWebArea", "", Some(1), &id_refs)];
        for (i, id) in ids.iter().enumerate() {
            let role = if i % 2 == 0 { "link" } else { "paragraph" };
            nodes.push(node(id, role, &format!("Item number {}", i), Some(i as i64 + 2), &[]));
        }

        let config = SnapshotConfig::default();
        let walk = builder().walk(&nodes, "page");
        assert!(walk.registry.len() <= config.max_elements);
        assert!(walk.budget.chars_used() <= config.max_chars);
        assert!(walk.budget.exhausted());
        let rendered: usize = walk.render_lines().iter().map(|l| l.chars().count() + 1).sum();
        assert!(rendered <= config.max_chars);
    }

    #[test]
    fn test_element_cap_stops_walk() {
        let config = SnapshotConfig {
            max_elements: 3,
            ..SnapshotConfig::default()
        };
        let ids: Vec<String> = (2..12).map(|i| i.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut nodes = vec![node("1", "RootWebArea", "", Some(1), &id_refs)];
        for id in &ids {
            nodes.push(node(id, "button", &format!("B{}", id), Some(id.parse().unwrap()), &[]));
        }
        let walk = SnapshotBuilder::new(config).walk(&nodes, "page");
        assert_eq!(walk.registry.len(), 3);
        assert!(walk.budget.exhausted());
    }

    #[test]
    fn test_flat_fallback_when_tree_is_malformed() {
        // Every node claims another as child, so there is no root to walk from.
        let nodes = vec![
            node("1", "button", "Accept", Some(1), &["2"]),
            node("2", "heading", "Cookies matter", None, &["1"]),
        ];
        let walk = builder().walk(&nodes, "page");
        assert_eq!(walk.registry.len(), 1);
        assert_eq!(walk.render_lines(), vec!["[  1] Button: \"Accept\"", "## Cookies matter"]);
    }

    #[test]
    fn test_walk_is_deterministic() {
        let a = builder().walk(&login_tree(), "page").render_lines();
        let b = builder().walk(&login_tree(), "page").render_lines();
        assert_eq!(a, b);
    }

    #[test]
    fn test_checkbox_state_and_focusable_heading() {
        let mut checkbox = node("2", "checkbox", "Remember me", Some(2), &[]);
        checkbox.properties.push(AxProperty {
            name: "checked".to_string(),
            value: AxValue::string("false"),
        });
        let mut heading = node("3", "heading", "Section", Some(3), &[]);
        heading.properties.push(AxProperty {
            name: "focusable".to_string(),
            value: AxValue::string("true"),
        });
        let nodes = vec![node("1", "RootWebArea", "", Some(1), &["2", "3"]), checkbox, heading];

        let lines = builder().walk(&nodes, "page").render_lines();
        assert_eq!(lines[0], "  [  1] Checkbox: \"Remember me\" [unchecked]");
        assert_eq!(lines[1], "  [  2] Heading: \"Section\"");
    }

    #[test]
    fn test_extract_page_text_dedups_and_formats() {
        let nodes = vec![
            node("1", "heading", "Inbox", None, &[]),
            node("2", "StaticText", "Inbox", None, &[]),
            node("3", "link", "Settings", None, &[]),
            node("4", "row", "Alice  Lunch", None, &[]),
            node("5", "StaticText", "ok", None, &[]),
        ];
        assert_eq!(extract_page_text(&nodes, 4000), "## Inbox\n[Settings]\n| Alice Lunch");
        assert_eq!(extract_page_text(&nodes, 5), "## In");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_tree_fetch_degrades_to_empty() {
        let page = FakePage::new("https://slow.test/");
        page.add_site("https://slow.test/", "Slow", login_tree());
        page.stall_tree();

        let timeouts = TimeoutConfig::default();
        let started = tokio::time::Instant::now();
        assert!(fetch_tree(&page, &timeouts).await.is_empty());
        assert!(started.elapsed() >= std::time::Duration::from_millis(timeouts.ax_tree_ms));

        let (registry, snapshot) = builder().capture(&page, Vec::new(), &timeouts).await;
        assert!(registry.is_empty());
        let rendered = snapshot.render();
        assert!(rendered.starts_with("URL: https://slow.test/\nTitle: Slow"));
        assert!(rendered.contains("(no interactive elements found on this page)"));
    }

    #[tokio::test]
    async fn test_password_fields_marked_with_one_lookup() {
        let page = FakePage::new("https://login.test/");
        page.add_site("https://login.test/", "Login", login_tree());
        page.set_attribute(3, "type", "text");
        page.set_attribute(4, "type", "password");

        let (registry, snapshot) = builder()
            .capture(&page, Vec::new(), &TimeoutConfig::default())
            .await;
        assert_eq!(page.input_type_calls(), 1);
        assert!(registry.resolve(2, &page.page_id()).unwrap().is_password());
        assert!(!registry.resolve(1, &page.page_id()).unwrap().is_password());
        assert!(snapshot.render().contains("[  2] Textbox(password): \"Password\""));
    }
}
