//! Inbound frames.
//!
//! Every text frame is first decoded into the minimal [`Envelope`] used to
//! classify it; only after classification is it decoded again into one of the
//! typed acknowledgement frames below.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Classification tag of an inbound frame (its `event` field)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventKind {
    Error,
    Subscribe,
    Unsubscribe,
    Login,
    Other(String),
    /// No `event` field, or an empty one
    #[default]
    None,
}

impl From<&str> for EventKind {
    fn from(event: &str) -> Self {
        match event {
            "" => Self::None,
            "error" => Self::Error,
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "login" => Self::Login,
            other => Self::Other(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let event = Option::<String>::deserialize(deserializer)?;
        Ok(event.as_deref().map_or(Self::None, Self::from))
    }
}

/// Status codes arrive either as numbers or as numeric strings.
fn deserialize_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    match Option::<Code>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Code::Number(code)) => Ok(code),
        Some(Code::Text(text)) if text.is_empty() => Ok(0),
        Some(Code::Text(text)) => text.parse().map_err(serde::de::Error::custom),
    }
}

/// Channel descriptor echoed back by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Argument {
    pub channel: String,
    pub inst_id: Option<String>,
    pub inst_type: Option<String>,
    pub inst_family: Option<String>,
    pub uly: Option<String>,
    pub ccy: Option<String>,
    pub uid: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Minimal envelope of every inbound frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub event: EventKind,
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: i64,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub arg: Option<Argument>,
}

impl Envelope {
    pub fn channel(&self) -> Option<&str> {
        self.arg.as_ref().map(|arg| arg.channel.as_str())
    }
}

/// Protocol error, or a correlated command that failed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorEvent {
    pub event: String,
    #[serde(deserialize_with = "deserialize_code")]
    pub code: i64,
    pub msg: String,
    pub op: String,
    pub id: String,
    pub arg: Option<Argument>,
    pub data: Vec<Value>,
}

impl ErrorEvent {
    /// Error raised locally rather than received from the server
    pub fn local(msg: impl Into<String>) -> Self {
        Self {
            event: "error".to_string(),
            msg: msg.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscribeEvent {
    pub event: String,
    pub arg: Option<Argument>,
    pub conn_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnsubscribeEvent {
    pub event: String,
    pub arg: Option<Argument>,
    pub conn_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginEvent {
    pub event: String,
    #[serde(deserialize_with = "deserialize_code")]
    pub code: i64,
    pub msg: String,
    pub conn_id: String,
}

/// Acknowledgement of a correlated command (order, cancel, amend, ...)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuccessEvent {
    pub id: String,
    pub op: String,
    #[serde(deserialize_with = "deserialize_code")]
    pub code: i64,
    pub msg: String,
    pub data: Vec<Value>,
    pub in_time: String,
    pub out_time: String,
}

/// Channel push handed to topic processors' consumers
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelUpdate {
    pub arg: Argument,
    pub action: Option<String>,
    pub data: Vec<Value>,
}
