use crate::types::BackendNodeId;
use serde::{Deserialize, Serialize};

const VALUE_DISPLAY_CHARS: usize = 80;

/// How an element is addressed when acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementTarget {
    /// Main-frame element, addressed by its protocol node handle.
    Node(BackendNodeId),
    /// Element inside child frame `index` (>= 1), addressed by a CSS selector
    /// that is unique within that frame.
    Frame { index: usize, selector: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub reference: u32,
    pub role: String,
    pub name: String,
    pub value: String,
    pub input_type: Option<String>,
    pub checked: Option<String>,
    pub target: ElementTarget,
}

impl Element {
    pub fn new(reference: u32, role: impl Into<String>, name: impl Into<String>, target: ElementTarget) -> Self {
        Self {
            reference,
            role: role.into(),
            name: name.into(),
            value: String::new(),
            input_type: None,
            checked: None,
            target,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_input_type(mut self, input_type: Option<String>) -> Self {
        self.input_type = input_type.filter(|t| !t.is_empty());
        self
    }

    pub fn with_checked(mut self, checked: Option<String>) -> Self {
        self.checked = checked.filter(|c| !c.is_empty());
        self
    }

    pub fn backend_id(&self) -> Option<BackendNodeId> {
        match self.target {
            ElementTarget::Node(id) => Some(id),
            ElementTarget::Frame { .. } => None,
        }
    }

    /// 0 is the main frame.
    pub fn frame_index(&self) -> usize {
        match self.target {
            ElementTarget::Node(_) => 0,
            ElementTarget::Frame { index, .. } => index,
        }
    }

    pub fn frame_selector(&self) -> Option<&str> {
        match &self.target {
            ElementTarget::Node(_) => None,
            ElementTarget::Frame { selector, .. } => Some(selector),
        }
    }

    pub fn is_password(&self) -> bool {
        self.input_type.as_deref() == Some("password")
    }

    pub fn display_role(&self) -> String {
        let mut chars = self.role.chars();
        let mut label = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => "Element".to_string(),
        };
        if self.is_password() {
            label.push_str("(password)");
        }
        label
    }

    /// `Role: "name"` plus the inline state that matters for this role.
    pub fn describe(&self) -> String {
        let mut detail = if self.name.is_empty() {
            "(no label)".to_string()
        } else {
            format!("{:?}", self.name)
        };

        match self.role.as_str() {
            "textbox" | "searchbox" | "combobox" | "spinbutton" | "textarea" | "input"
                if !self.value.is_empty() && !self.is_password() =>
            {
                let shown: String = self.value.chars().take(VALUE_DISPLAY_CHARS).collect();
                detail.push_str(&format!(" value={:?}", shown));
            }
            "checkbox" | "radio" | "switch" | "menuitemcheckbox" | "menuitemradio" => {
                match self.checked.as_deref() {
                    Some("true") => detail.push_str(" [checked]"),
                    Some("mixed") => detail.push_str(" [mixed]"),
                    Some(_) => detail.push_str(" [unchecked]"),
                    None => {}
                }
            }
            _ => {}
        }

        if let (Some(input_type), ElementTarget::Frame { .. }) = (&self.input_type, &self.target) {
            if !self.is_password() {
                detail.push_str(&format!(" type={}", input_type));
            }
        }

        format!("{}: {}", self.display_role(), detail)
    }

    pub fn render_line(&self, indent: &str) -> String {
        format!("{}[{:>3}] {}", indent, self.reference, self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_frame_element_has_handle_and_no_selector() {
        let el = Element::new(1, "button", "Submit", ElementTarget::Node(42));
        assert_eq!(el.backend_id(), Some(42));
        assert_eq!(el.frame_index(), 0);
        assert_eq!(el.frame_selector(), None);
    }

    #[test]
    fn test_frame_element_has_selector_and_no_handle() {
        let el = Element::new(
            7,
            "button",
            "Send",
            ElementTarget::Frame {
                index: 2,
                selector: "#send".to_string(),
            },
        );
        assert_eq!(el.backend_id(), None);
        assert_eq!(el.frame_index(), 2);
        assert_eq!(el.frame_selector(), Some("#send"));
    }

    #[test]
    fn test_render_line_formats() {
        let button = Element::new(3, "button", "Sign in", ElementTarget::Node(1));
        assert_eq!(button.render_line("  "), "  [  3] Button: \"Sign in\"");

        let input = Element::new(12, "textbox", "Email", ElementTarget::Node(2)).with_value("alice");
        assert_eq!(input.render_line(""), "[ 12] Textbox: \"Email\" value=\"alice\"");

        let unlabeled = Element::new(4, "checkbox", "", ElementTarget::Node(3))
            .with_checked(Some("true".to_string()));
        assert_eq!(unlabeled.render_line(""), "[  4] Checkbox: (no label) [checked]");
    }

    #[test]
    fn test_password_value_is_never_rendered() {
        let el = Element::new(2, "textbox", "Password", ElementTarget::Node(9))
            .with_value("secret")
            .with_input_type(Some("password".to_string()));
        let line = el.render_line("");
        assert!(line.contains("Textbox(password)"));
        assert!(!line.contains("secret"));
    }
}
