use crate::errors::{BrowserAgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

const DEFAULT_SCROLL_PX: i64 = 500;
const DEFAULT_WAIT_SECS: f64 = 2.0;
const DEFAULT_WAIT_FOR_SECS: f64 = 10.0;
const MAX_WAIT_SECS: f64 = 30.0;

/// Every action name `act` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Navigate,
    Snapshot,
    GetText,
    Click,
    Fill,
    Type,
    Press,
    Hover,
    SelectOption,
    UploadFile,
    Scroll,
    Wait,
    WaitFor,
    Screenshot,
    Back,
    Forward,
    NewTab,
    SwitchTab,
    CloseTab,
    Close,
}

impl ActionKind {
    pub const ALL: [ActionKind; 20] = [
        ActionKind::Navigate,
        ActionKind::Snapshot,
        ActionKind::GetText,
        ActionKind::Click,
        ActionKind::Fill,
        ActionKind::Type,
        ActionKind::Press,
        ActionKind::Hover,
        ActionKind::SelectOption,
        ActionKind::UploadFile,
        ActionKind::Scroll,
        ActionKind::Wait,
        ActionKind::WaitFor,
        ActionKind::Screenshot,
        ActionKind::Back,
        ActionKind::Forward,
        ActionKind::NewTab,
        ActionKind::SwitchTab,
        ActionKind::CloseTab,
        ActionKind::Close,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Snapshot => "snapshot",
            ActionKind::GetText => "getText",
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Type => "type",
            ActionKind::Press => "press",
            ActionKind::Hover => "hover",
            ActionKind::SelectOption => "selectOption",
            ActionKind::UploadFile => "uploadFile",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::WaitFor => "waitFor",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Back => "back",
            ActionKind::Forward => "forward",
            ActionKind::NewTab => "newTab",
            ActionKind::SwitchTab => "switchTab",
            ActionKind::CloseTab => "closeTab",
            ActionKind::Close => "close",
        }
    }

    /// Accepts camelCase and snake_case spellings in any letter case.
    pub fn parse(name: &str) -> Option<Self> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().to_lowercase() == folded)
    }

    /// Comma-separated vocabulary for error messages.
    pub fn vocabulary() -> String {
        Self::ALL.iter().map(ActionKind::name).collect::<Vec<_>>().join(", ")
    }
}

/// Raw action parameters as the caller sends them. Numbers may arrive as
/// JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionParams {
    pub url: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<Value>,
    pub text: Option<String>,
    pub value: Option<String>,
    #[serde(alias = "path", alias = "file")]
    pub filepath: Option<String>,
    pub direction: Option<String>,
    pub amount: Option<Value>,
    pub duration: Option<Value>,
    pub key: Option<String>,
    pub index: Option<Value>,
    pub selector: Option<String>,
}

fn number(field: &Option<Value>, name: &str) -> Result<Option<f64>> {
    let parsed = match field {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .map(Some)
        .ok_or_else(|| BrowserAgentError::InvalidParams(format!("{} must be a number", name)))
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ActionParams {
    fn reference(&self, action: ActionKind) -> Result<u32> {
        match number(&self.reference, "ref")? {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(n as u32),
            Some(n) => Err(BrowserAgentError::InvalidParams(format!(
                "ref must be a positive integer, got {}",
                n
            ))),
            None => Err(BrowserAgentError::InvalidParams(format!(
                "{} needs ref=N (take a snapshot to see element refs)",
                action.name()
            ))),
        }
    }

    fn text(&self, action: ActionKind) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| BrowserAgentError::InvalidParams(format!("{} needs text=...", action.name())))
    }

    fn seconds(&self, default: f64) -> Result<f64> {
        Ok(number(&self.duration, "duration")?
            .unwrap_or(default)
            .clamp(0.0, MAX_WAIT_SECS))
    }
}

/// One validated request. Each variant carries exactly what its action needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate { url: String },
    Snapshot,
    GetText,
    Click { reference: u32 },
    Fill { reference: u32, text: String },
    Type { reference: u32, text: String },
    Press { key: String },
    Hover { reference: u32 },
    SelectOption { reference: u32, value: Option<String>, label: Option<String> },
    UploadFile { reference: u32, path: PathBuf },
    Scroll { direction: String, amount: i64 },
    Wait { seconds: f64 },
    WaitFor { selector: Option<String>, url: Option<String>, seconds: f64 },
    Screenshot,
    Back,
    Forward,
    NewTab { url: Option<String> },
    SwitchTab { index: usize },
    CloseTab,
    Close,
}

impl Action {
    pub fn from_params(kind: ActionKind, params: &ActionParams) -> Result<Self> {
        Ok(match kind {
            ActionKind::Navigate => {
                let url = non_empty(&params.url)
                    .ok_or_else(|| BrowserAgentError::InvalidParams("navigate needs url=...".to_string()))?;
                Action::Navigate {
                    url: normalize_url(url)?,
                }
            }
            ActionKind::Snapshot => Action::Snapshot,
            ActionKind::GetText => Action::GetText,
            ActionKind::Click => Action::Click {
                reference: params.reference(kind)?,
            },
            ActionKind::Fill => Action::Fill {
                reference: params.reference(kind)?,
                text: params.text(kind)?,
            },
            ActionKind::Type => Action::Type {
                reference: params.reference(kind)?,
                text: params.text(kind)?,
            },
            ActionKind::Press => Action::Press {
                key: non_empty(&params.key)
                    .ok_or_else(|| BrowserAgentError::InvalidParams("press needs key=...".to_string()))?
                    .to_string(),
            },
            ActionKind::Hover => Action::Hover {
                reference: params.reference(kind)?,
            },
            ActionKind::SelectOption => {
                let reference = params.reference(kind)?;
                let value = params.value.clone();
                let label = params.text.clone();
                if value.is_none() && label.is_none() {
                    return Err(BrowserAgentError::InvalidParams(
                        "selectOption needs value=... or text=...".to_string(),
                    ));
                }
                Action::SelectOption { reference, value, label }
            }
            ActionKind::UploadFile => Action::UploadFile {
                reference: params.reference(kind)?,
                path: non_empty(&params.filepath)
                    .map(PathBuf::from)
                    .ok_or_else(|| BrowserAgentError::InvalidParams("uploadFile needs filepath=...".to_string()))?,
            },
            ActionKind::Scroll => {
                let direction = non_empty(&params.direction).unwrap_or("down").to_lowercase();
                if direction != "up" && direction != "down" {
                    return Err(BrowserAgentError::InvalidParams(format!(
                        "scroll direction must be up or down, got '{}'",
                        direction
                    )));
                }
                let amount = number(&params.amount, "amount")?
                    .map(|n| n.abs() as i64)
                    .unwrap_or(DEFAULT_SCROLL_PX);
                Action::Scroll { direction, amount }
            }
            ActionKind::Wait => Action::Wait {
                seconds: params.seconds(DEFAULT_WAIT_SECS)?,
            },
            ActionKind::WaitFor => Action::WaitFor {
                selector: non_empty(&params.selector).map(str::to_string),
                url: non_empty(&params.url).map(str::to_string),
                seconds: params.seconds(DEFAULT_WAIT_FOR_SECS)?,
            },
            ActionKind::Screenshot => Action::Screenshot,
            ActionKind::Back => Action::Back,
            ActionKind::Forward => Action::Forward,
            ActionKind::NewTab => Action::NewTab {
                url: non_empty(&params.url).map(normalize_url).transpose()?,
            },
            ActionKind::SwitchTab => {
                let index = number(&params.index, "index")?
                    .ok_or_else(|| BrowserAgentError::InvalidParams("switchTab needs index=N".to_string()))?;
                if index < 0.0 || index.fract() != 0.0 {
                    return Err(BrowserAgentError::InvalidParams(format!(
                        "tab index must be a non-negative integer, got {}",
                        index
                    )));
                }
                Action::SwitchTab { index: index as usize }
            }
            ActionKind::CloseTab => Action::CloseTab,
            ActionKind::Close => Action::Close,
        })
    }
}

/// Adds `https://` to scheme-less input and checks the result parses.
pub fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") || raw.starts_with("about:") || raw.starts_with("data:") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&candidate)
        .map(|url| url.to_string())
        .map_err(|e| BrowserAgentError::InvalidParams(format!("invalid url '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> ActionParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_accepts_both_spellings() {
        assert_eq!(ActionKind::parse("getText"), Some(ActionKind::GetText));
        assert_eq!(ActionKind::parse("get_text"), Some(ActionKind::GetText));
        assert_eq!(ActionKind::parse("SELECT_OPTION"), Some(ActionKind::SelectOption));
        assert_eq!(ActionKind::parse("waitFor"), Some(ActionKind::WaitFor));
        assert_eq!(ActionKind::parse("teleport"), None);
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_vocabulary_lists_every_action() {
        let vocabulary = ActionKind::vocabulary();
        assert!(vocabulary.starts_with("navigate, snapshot, getText, click"));
        assert!(vocabulary.ends_with("closeTab, close"));
    }

    #[test]
    fn test_ref_accepts_numbers_and_numeric_strings() {
        let click = Action::from_params(ActionKind::Click, &params(json!({ "ref": 3 }))).unwrap();
        assert_eq!(click, Action::Click { reference: 3 });

        let click = Action::from_params(ActionKind::Click, &params(json!({ "ref": "12" }))).unwrap();
        assert_eq!(click, Action::Click { reference: 12 });

        assert!(Action::from_params(ActionKind::Click, &params(json!({ "ref": 0 }))).is_err());
        assert!(Action::from_params(ActionKind::Click, &params(json!({ "ref": "abc" }))).is_err());
    }

    #[test]
    fn test_missing_required_params_are_described() {
        let err = Action::from_params(ActionKind::Fill, &params(json!({ "text": "x" }))).unwrap_err();
        assert!(err.to_string().contains("fill needs ref=N"));

        let err = Action::from_params(ActionKind::Fill, &params(json!({ "ref": 1 }))).unwrap_err();
        assert_eq!(err.to_string(), "fill needs text=...");

        let err = Action::from_params(ActionKind::SelectOption, &params(json!({ "ref": 1 }))).unwrap_err();
        assert!(err.to_string().contains("value=... or text=..."));

        assert!(Action::from_params(ActionKind::Navigate, &ActionParams::default()).is_err());
        assert!(Action::from_params(ActionKind::SwitchTab, &ActionParams::default()).is_err());
    }

    #[test]
    fn test_fill_keeps_empty_text() {
        let fill = Action::from_params(ActionKind::Fill, &params(json!({ "ref": 2, "text": "" }))).unwrap();
        assert_eq!(
            fill,
            Action::Fill {
                reference: 2,
                text: String::new()
            }
        );
    }

    #[test]
    fn test_defaults_and_clamps() {
        let scroll = Action::from_params(ActionKind::Scroll, &ActionParams::default()).unwrap();
        assert_eq!(
            scroll,
            Action::Scroll {
                direction: "down".to_string(),
                amount: 500
            }
        );

        let wait = Action::from_params(ActionKind::Wait, &params(json!({ "duration": 600 }))).unwrap();
        assert_eq!(wait, Action::Wait { seconds: 30.0 });

        let wait_for =
            Action::from_params(ActionKind::WaitFor, &params(json!({ "selector": "#done" }))).unwrap();
        assert_eq!(
            wait_for,
            Action::WaitFor {
                selector: Some("#done".to_string()),
                url: None,
                seconds: 10.0
            }
        );
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("http://a.test/x?y=1").unwrap(), "http://a.test/x?y=1");
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
        assert!(normalize_url("http://exa mple.com").is_err());
    }
}
