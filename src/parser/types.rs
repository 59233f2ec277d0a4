use crate::error::RowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Browser actions a step can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Click,
    ExpectText,
    ExpectAttr,
    ExpectUrlContains,
    ExpectPageTitle,
    WaitForSelector,
    WaitForPageLoad,
    Fill,
}

impl Action {
    /// The accepted vocabulary, in display order
    pub const ALL: [Action; 8] = [
        Action::Click,
        Action::ExpectText,
        Action::ExpectAttr,
        Action::ExpectUrlContains,
        Action::ExpectPageTitle,
        Action::WaitForSelector,
        Action::WaitForPageLoad,
        Action::Fill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::ExpectText => "expectText",
            Action::ExpectAttr => "expectAttr",
            Action::ExpectUrlContains => "expectUrlContains",
            Action::ExpectPageTitle => "expectPageTitle",
            Action::WaitForSelector => "waitForSelector",
            Action::WaitForPageLoad => "waitForPageLoad",
            Action::Fill => "fill",
        }
    }

    /// Comma-separated list of canonical action names
    pub fn vocabulary() -> String {
        Action::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn requires_selector(&self) -> bool {
        !matches!(
            self,
            Action::WaitForPageLoad | Action::ExpectPageTitle | Action::ExpectUrlContains
        )
    }

    pub fn requires_value(&self) -> bool {
        !matches!(self, Action::WaitForPageLoad)
    }

    pub fn requires_attr(&self) -> bool {
        matches!(self, Action::ExpectAttr)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RowError;

    /// Exact match against the canonical names only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| RowError::InvalidAction {
                action: s.to_string(),
            })
    }
}

/// A step's action together with exactly the fields that action needs
///
/// Required fields are plain `String`s, optional ones `Option<String>`, so an
/// invalid step cannot be constructed. `attr` exists only on `ExpectAttr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StepKind {
    Click {
        selector: String,
        value: String,
    },
    ExpectText {
        selector: String,
        value: String,
    },
    ExpectAttr {
        selector: String,
        value: String,
        attr: String,
    },
    ExpectUrlContains {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        value: String,
    },
    ExpectPageTitle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        value: String,
    },
    WaitForSelector {
        selector: String,
        value: String,
    },
    WaitForPageLoad {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Fill {
        selector: String,
        value: String,
    },
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

impl StepKind {
    /// Build a typed step from loose fields; empty strings count as absent.
    ///
    /// Checks selector, then value, then attr, and reports the first missing one.
    pub fn from_fields(
        action: Action,
        selector: Option<String>,
        value: Option<String>,
        attr: Option<String>,
    ) -> Result<Self, RowError> {
        let selector = present(selector);
        let value = present(value);
        let attr = present(attr);

        if action.requires_selector() && selector.is_none() {
            return Err(RowError::SelectorRequired { action });
        }
        if action.requires_value() && value.is_none() {
            return Err(RowError::ValueRequired { action });
        }
        if action.requires_attr() && attr.is_none() {
            return Err(RowError::AttrRequired);
        }

        // Presence was checked above for every field unwrapped below
        let required = |field: Option<String>| field.unwrap_or_default();

        Ok(match action {
            Action::Click => StepKind::Click {
                selector: required(selector),
                value: required(value),
            },
            Action::ExpectText => StepKind::ExpectText {
                selector: required(selector),
                value: required(value),
            },
            Action::ExpectAttr => StepKind::ExpectAttr {
                selector: required(selector),
                value: required(value),
                attr: required(attr),
            },
            Action::ExpectUrlContains => StepKind::ExpectUrlContains {
                selector,
                value: required(value),
            },
            Action::ExpectPageTitle => StepKind::ExpectPageTitle {
                selector,
                value: required(value),
            },
            Action::WaitForSelector => StepKind::WaitForSelector {
                selector: required(selector),
                value: required(value),
            },
            Action::WaitForPageLoad => StepKind::WaitForPageLoad { selector, value },
            Action::Fill => StepKind::Fill {
                selector: required(selector),
                value: required(value),
            },
        })
    }

    pub fn action(&self) -> Action {
        match self {
            StepKind::Click { .. } => Action::Click,
            StepKind::ExpectText { .. } => Action::ExpectText,
            StepKind::ExpectAttr { .. } => Action::ExpectAttr,
            StepKind::ExpectUrlContains { .. } => Action::ExpectUrlContains,
            StepKind::ExpectPageTitle { .. } => Action::ExpectPageTitle,
            StepKind::WaitForSelector { .. } => Action::WaitForSelector,
            StepKind::WaitForPageLoad { .. } => Action::WaitForPageLoad,
            StepKind::Fill { .. } => Action::Fill,
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            StepKind::Click { selector, .. }
            | StepKind::ExpectText { selector, .. }
            | StepKind::ExpectAttr { selector, .. }
            | StepKind::WaitForSelector { selector, .. }
            | StepKind::Fill { selector, .. } => Some(selector),
            StepKind::ExpectUrlContains { selector, .. }
            | StepKind::ExpectPageTitle { selector, .. }
            | StepKind::WaitForPageLoad { selector, .. } => selector.as_deref(),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            StepKind::Click { value, .. }
            | StepKind::ExpectText { value, .. }
            | StepKind::ExpectAttr { value, .. }
            | StepKind::ExpectUrlContains { value, .. }
            | StepKind::ExpectPageTitle { value, .. }
            | StepKind::WaitForSelector { value, .. }
            | StepKind::Fill { value, .. } => Some(value),
            StepKind::WaitForPageLoad { value, .. } => value.as_deref(),
        }
    }

    pub fn attr(&self) -> Option<&str> {
        match self {
            StepKind::ExpectAttr { attr, .. } => Some(attr),
            _ => None,
        }
    }

    /// Short human-readable form, e.g. `expectText on Hero-Btn = "Start Now"`
    pub fn display(&self) -> String {
        let mut out = self.action().to_string();
        if let Some(selector) = self.selector() {
            out.push_str(&format!(" on {}", selector));
        }
        if let Some(attr) = self.attr() {
            out.push_str(&format!(" [{}]", attr));
        }
        if let Some(value) = self.value() {
            out.push_str(&format!(" = \"{}\"", value));
        }
        out
    }
}

/// The four positional CSV fields after cleaning, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFields {
    pub selector: String,
    pub action: String,
    pub value: String,
    pub attr: String,
}

/// Manually entered step, as submitted by the step editor form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepForm {
    /// Defaults to the next free order when creating, and to the current order when editing
    #[serde(default)]
    pub step_order: Option<u32>,
    pub action: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_canonical_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("expecttext".parse::<Action>().is_err());
    }

    #[test]
    fn test_vocabulary_order() {
        assert_eq!(
            Action::vocabulary(),
            "click, expectText, expectAttr, expectUrlContains, expectPageTitle, waitForSelector, waitForPageLoad, fill"
        );
    }

    #[test]
    fn test_wait_for_page_load_needs_nothing() {
        let kind = StepKind::from_fields(Action::WaitForPageLoad, None, Some("".into()), None)
            .unwrap();
        assert_eq!(
            kind,
            StepKind::WaitForPageLoad {
                selector: None,
                value: None
            }
        );
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        assert_eq!(
            StepKind::from_fields(Action::ExpectAttr, None, None, None),
            Err(RowError::SelectorRequired {
                action: Action::ExpectAttr
            })
        );
        assert_eq!(
            StepKind::from_fields(Action::ExpectAttr, Some("a".into()), None, None),
            Err(RowError::ValueRequired {
                action: Action::ExpectAttr
            })
        );
        assert_eq!(
            StepKind::from_fields(Action::ExpectAttr, Some("a".into()), Some("b".into()), None),
            Err(RowError::AttrRequired)
        );
    }

    #[test]
    fn test_attr_dropped_for_other_actions() {
        let kind = StepKind::from_fields(
            Action::ExpectText,
            Some("title".into()),
            Some("Hello".into()),
            Some("href".into()),
        )
        .unwrap();
        assert_eq!(kind.attr(), None);
    }

    #[test]
    fn test_serializes_with_action_tag() {
        let kind = StepKind::ExpectUrlContains {
            selector: None,
            value: "/checkout".to_string(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "action": "expectUrlContains", "value": "/checkout" })
        );
    }
}
