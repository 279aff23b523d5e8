#![forbid(unsafe_code)]

//! Declarative attribute conventions and declaration parsing.
//!
//! | attribute | example | meaning |
//! |---|---|---|
//! | `data-controller` | `counter` | controller root |
//! | `data-bind` | `text:label; class:classes` | push-only bindings |
//! | `data-model` | `value:name` or `name` | two-way bindings |
//! | `data-on` | `click:increment; input:validate` | event wiring |
//! | `data-ref` | `submit` | named node reference |
//! | `data-state` | `{"count": 3}` or `#payload-id` | state overrides |
//! | `data-config` | `{"step": 2}` | config overrides |
//!
//! Attribute names are configurable through [`Markup`]. Malformed entries are
//! skipped with a warning; they never fail the surrounding scan.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Attribute names the runtime scans for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markup {
    pub controller: String,
    pub bind: String,
    pub model: String,
    pub on: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub state: String,
    pub config: String,
}

impl Default for Markup {
    fn default() -> Self {
        Self {
            controller: "data-controller".to_owned(),
            bind: "data-bind".to_owned(),
            model: "data-model".to_owned(),
            on: "data-on".to_owned(),
            reference: "data-ref".to_owned(),
            state: "data-state".to_owned(),
            config: "data-config".to_owned(),
        }
    }
}

impl Markup {
    /// Load conventions from JSON; omitted fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Every attribute that can carry a binding declaration, with its
    /// direction.
    #[must_use]
    pub fn binding_attributes(&self) -> [(&str, Direction); 2] {
        [
            (self.bind.as_str(), Direction::Push),
            (self.model.as_str(), Direction::TwoWay),
        ]
    }
}

/// Which way a binding moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// State → tree.
    Push,
    /// State → tree and tree → state.
    TwoWay,
}

/// How a bound value is applied to its node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Text,
    Html,
    Class,
    Style,
    Value,
    Checked,
    /// Visibility through the `hidden` attribute.
    Show,
    /// Any other name is an attribute.
    Attribute(String),
}

impl BindingKind {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "text" => Self::Text,
            "html" => Self::Html,
            "class" => Self::Class,
            "style" => Self::Style,
            "value" => Self::Value,
            "checked" => Self::Checked,
            "show" => Self::Show,
            other => Self::Attribute(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Class => "class",
            Self::Style => "style",
            Self::Value => "value",
            Self::Checked => "checked",
            Self::Show => "show",
            Self::Attribute(name) => name,
        }
    }

    /// Kinds that can read back from a control.
    #[must_use]
    pub fn is_two_way_capable(&self) -> bool {
        matches!(self, Self::Value | Self::Checked | Self::Text)
    }
}

/// One parsed binding declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDecl {
    pub kind: BindingKind,
    /// Key or dotted key path on the controller instance.
    pub path: String,
    pub direction: Direction,
}

/// One parsed event declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDecl {
    pub event: String,
    pub method: String,
}

fn entries(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(';').map(str::trim).filter(|e| !e.is_empty())
}

/// Parse `kind:path; kind:path`. A bare `path` means `text` for push
/// bindings and `value` for two-way bindings.
#[must_use]
pub fn parse_bindings(raw: &str, direction: Direction) -> Vec<BindingDecl> {
    entries(raw)
        .filter_map(|entry| {
            let (kind, path) = match entry.split_once(':') {
                Some((kind, path)) => (BindingKind::parse(kind.trim()), path.trim()),
                None if direction == Direction::TwoWay => (BindingKind::Value, entry),
                None => (BindingKind::Text, entry),
            };
            if path.is_empty() || kind.as_str().is_empty() {
                warn!(message = "markup.malformed_binding", entry);
                return None;
            }
            Some(BindingDecl {
                kind,
                path: path.to_owned(),
                direction,
            })
        })
        .collect()
}

/// Parse `event:method; event:method`.
#[must_use]
pub fn parse_events(raw: &str) -> Vec<EventDecl> {
    entries(raw)
        .filter_map(|entry| {
            let Some((event, method)) = entry.split_once(':') else {
                warn!(message = "markup.malformed_event", entry);
                return None;
            };
            let (event, method) = (event.trim(), method.trim());
            if event.is_empty() || method.is_empty() {
                warn!(message = "markup.malformed_event", entry);
                return None;
            }
            Some(EventDecl {
                event: event.to_owned(),
                method: method.to_owned(),
            })
        })
        .collect()
}
