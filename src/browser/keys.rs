use crate::errors::{BrowserAgentError, Result};
use crate::types::{KeyEvent, KeyEventKind};

pub const MODIFIER_ALT: u32 = 1;
pub const MODIFIER_CONTROL: u32 = 2;
pub const MODIFIER_META: u32 = 4;
pub const MODIFIER_SHIFT: u32 = 8;

/// (accepted name, DOM key, DOM code, virtual key code, text)
const NAMED_KEYS: &[(&str, &str, &str, u32, Option<&str>)] = &[
    ("Tab", "Tab", "Tab", 9, None),
    ("Enter", "Enter", "Enter", 13, Some("\r")),
    ("Return", "Enter", "Enter", 13, Some("\r")),
    ("Escape", "Escape", "Escape", 27, None),
    ("Esc", "Escape", "Escape", 27, None),
    ("Backspace", "Backspace", "Backspace", 8, None),
    ("Delete", "Delete", "Delete", 46, None),
    ("Space", " ", "Space", 32, Some(" ")),
    ("ArrowLeft", "ArrowLeft", "ArrowLeft", 37, None),
    ("ArrowUp", "ArrowUp", "ArrowUp", 38, None),
    ("ArrowRight", "ArrowRight", "ArrowRight", 39, None),
    ("ArrowDown", "ArrowDown", "ArrowDown", 40, None),
    ("Home", "Home", "Home", 36, None),
    ("End", "End", "End", 35, None),
    ("PageUp", "PageUp", "PageUp", 33, None),
    ("PageDown", "PageDown", "PageDown", 34, None),
];

/// A key press with modifiers, e.g. `Enter`, `Control+a`, `Shift+Tab`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub modifiers: u32,
    pub text: Option<String>,
}

fn modifier_bit(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "alt" | "option" => Some(MODIFIER_ALT),
        "control" | "ctrl" => Some(MODIFIER_CONTROL),
        "meta" | "cmd" | "command" | "super" => Some(MODIFIER_META),
        "shift" => Some(MODIFIER_SHIFT),
        _ => None,
    }
}

impl KeyCombo {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(BrowserAgentError::InvalidParams("press needs key=...".to_string()));
        }

        // A trailing "+" is the plus key itself, as in "Control++".
        let (prefix, key_name) = match spec.strip_suffix("++") {
            Some(rest) => (Some(rest), "+"),
            None if spec == "+" => (None, "+"),
            None => match spec.rsplit_once('+') {
                Some((mods, key)) => (Some(mods), key),
                None => (None, spec),
            },
        };

        let mut modifiers = 0;
        if let Some(prefix) = prefix {
            for part in prefix.split('+').filter(|p| !p.is_empty()) {
                modifiers |= modifier_bit(part).ok_or_else(|| {
                    BrowserAgentError::InvalidParams(format!("unknown modifier '{}' in key '{}'", part, spec))
                })?;
            }
        }

        let mut combo = Self::lookup(key_name)
            .ok_or_else(|| BrowserAgentError::InvalidParams(format!("unknown key '{}'", key_name)))?;
        combo.modifiers = modifiers;
        // Chords do not produce text; shifted characters still do.
        if modifiers & !MODIFIER_SHIFT != 0 {
            combo.text = None;
        }
        Ok(combo)
    }

    fn lookup(name: &str) -> Option<Self> {
        if let Some(&(_, key, code, key_code, text)) = NAMED_KEYS
            .iter()
            .find(|(accepted, ..)| accepted.eq_ignore_ascii_case(name))
        {
            return Some(Self {
                key: key.to_string(),
                code: code.to_string(),
                key_code,
                modifiers: 0,
                text: text.map(str::to_string),
            });
        }

        let mut chars = name.chars();
        let ch = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let (code, key_code) = if ch.is_ascii_alphabetic() {
            (format!("Key{}", ch.to_ascii_uppercase()), ch.to_ascii_uppercase() as u32)
        } else if ch.is_ascii_digit() {
            (format!("Digit{}", ch), ch as u32)
        } else {
            (String::new(), ch as u32)
        };
        Some(Self {
            key: ch.to_string(),
            code,
            key_code,
            modifiers: 0,
            text: Some(ch.to_string()),
        })
    }

    /// Key down followed by key up.
    pub fn events(&self) -> [KeyEvent; 2] {
        let down = KeyEvent {
            kind: KeyEventKind::KeyDown,
            key: self.key.clone(),
            code: self.code.clone(),
            key_code: self.key_code,
            modifiers: self.modifiers,
            text: self.text.clone(),
        };
        let up = KeyEvent {
            kind: KeyEventKind::KeyUp,
            text: None,
            ..down.clone()
        };
        [down, up]
    }
}
