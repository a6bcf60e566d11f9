//! Wire types for messages entering the bridge.
//!
//! Every inbound message is decoded exactly once, here, into a tagged enum.
//! Routing code never inspects raw JSON fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::host::{PageHandle, WindowId};

/// Logical tab identifier, stable across navigations of the same tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// Errors produced while decoding an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown message '{0}'")]
    UnknownMessage(String),

    #[error("malformed '{message}' message: {reason}")]
    Malformed { message: String, reason: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Content script → native
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub tab_id: Option<TabId>,
    pub referrer: String,
    pub history_length: i64,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Body shared by `alive` and `request`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bye {
    pub url: String,
    pub history_length: i64,
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// A message sent by a content script.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentMessage {
    Hello(Hello),
    Alive(Activity),
    Request(Activity),
    Bye(Bye),
}

impl ContentMessage {
    pub fn decode(name: &str, body: Value) -> Result<Self, DecodeError> {
        match name {
            "hello" => decode_body(name, body).map(Self::Hello),
            "alive" => decode_body(name, body).map(Self::Alive),
            "request" => decode_body(name, body).map(Self::Request),
            "bye" => decode_body(name, body).map(Self::Bye),
            other => Err(DecodeError::UnknownMessage(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Alive(_) => "alive",
            Self::Request(_) => "request",
            Self::Bye(_) => "bye",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background context → native
// ─────────────────────────────────────────────────────────────────────────────

/// Severity of a background `log` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&str> for ScriptLogLevel {
    fn from(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

#[derive(Deserialize)]
struct LogBody {
    level: String,
    message: String,
}

/// An event the background context wants delivered to one tab.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEvent {
    pub tab_id: TabId,
    pub event_name: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Size-keyed icon resources, in the order the background presented them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct IconPaths(Vec<(String, String)>);

impl IconPaths {
    pub fn new<K: Into<String>, V: Into<String>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, size: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == size)
            .map(|(_, path)| path.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|(_, path)| path.as_str())
    }
}

impl TryFrom<Value> for IconPaths {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            // A bare string is a single icon for every size.
            Value::String(path) => Ok(Self(vec![(String::new(), path)])),
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (size, path) in map {
                    match path {
                        Value::String(path) => entries.push((size, path)),
                        other => return Err(format!("icon path for '{}' is not a string: {}", size, other)),
                    }
                }
                Ok(Self(entries))
            }
            other => Err(format!("expected icon path map, got {}", other)),
        }
    }
}

/// Control messages on the `appex` channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppexControl {
    Ready,
    SetIconTitle { title: String },
    SetIcon { path: IconPaths },
}

/// A message sent by the background context.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundMessage {
    Log { level: ScriptLogLevel, message: String },
    Content(ContentEvent),
    Appex(AppexControl),
}

impl BackgroundMessage {
    /// Decode a message received on the named background channel.
    pub fn decode(channel: &str, body: Value) -> Result<Self, DecodeError> {
        match channel {
            "log" => {
                let log: LogBody = decode_body(channel, body)?;
                Ok(Self::Log {
                    level: ScriptLogLevel::from(log.level.as_str()),
                    message: log.message,
                })
            }
            "content" | "contentEvent" => decode_body(channel, body).map(Self::Content),
            "appex" | "appexControl" => decode_body(channel, body).map(Self::Appex),
            other => Err(DecodeError::UnknownMessage(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Native host events
// ─────────────────────────────────────────────────────────────────────────────

/// UI and lifecycle events raised by the native host itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NativeEvent {
    ToolbarClicked { window: WindowId },
    ToolbarNeedsUpdate { window: WindowId },
    TabClosed { page: PageHandle },
}

/// Toolbar notifications synthesized for the background context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarEvent {
    Clicked,
    NeedsUpdate,
}

impl ToolbarEvent {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Clicked => "toolbarItemClicked",
            Self::NeedsUpdate => "toolbarItemNeedsUpdate",
        }
    }
}

fn decode_body<T: DeserializeOwned>(message: &str, body: Value) -> Result<T, DecodeError> {
    // Scripts post `undefined` as null for body-less messages.
    let body = if body.is_null() {
        Value::Object(Map::new())
    } else {
        body
    };

    serde_json::from_value(body).map_err(|e| DecodeError::Malformed {
        message: message.to_string(),
        reason: e.to_string(),
    })
}
