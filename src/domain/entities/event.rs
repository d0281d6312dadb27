use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of inbound chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    PrivateMessage,
    Join,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Message => "message",
            EventKind::PrivateMessage => "pm",
            EventKind::Join => "join",
        }
    }
}

/// Where a command may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Place {
    Channel,
    #[serde(rename = "pm")]
    PrivateMessage,
}

impl Place {
    pub fn all() -> Vec<Place> {
        vec![Place::Channel, Place::PrivateMessage]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Place::Channel => "channel",
            Place::PrivateMessage => "pm",
        }
    }
}

impl FromStr for Place {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "channel" => Ok(Place::Channel),
            "pm" | "private" | "query" => Ok(Place::PrivateMessage),
            other => Err(format!("unknown place '{}'", other)),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound event from the chat transport. Immutable once received.
///
/// For private messages `target` is the sender; for joins `sender` is the
/// joining nick and `target` the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub id: String,
    pub kind: EventKind,
    pub sender: String,
    pub target: String,
    pub body: Option<String>,
    pub meta: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    fn new(kind: EventKind, sender: String, target: String, body: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            sender,
            target,
            body,
            meta: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    /// A line sent to a channel
    pub fn message(
        from: impl Into<String>,
        channel: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::Message, from.into(), channel.into(), Some(body.into()))
    }

    /// A line sent directly to the bot; replies go back to the sender
    pub fn private_message(from: impl Into<String>, body: impl Into<String>) -> Self {
        let from = from.into();
        Self::new(EventKind::PrivateMessage, from.clone(), from, Some(body.into()))
    }

    /// A user joined a channel
    pub fn join(channel: impl Into<String>, nick: impl Into<String>) -> Self {
        Self::new(EventKind::Join, nick.into(), channel.into(), None)
    }

    /// Message context, `None` for joins
    pub fn place(&self) -> Option<Place> {
        match self.kind {
            EventKind::Message => Some(Place::Channel),
            EventKind::PrivateMessage => Some(Place::PrivateMessage),
            EventKind::Join => None,
        }
    }

    pub fn is_channel(&self) -> bool {
        self.kind == EventKind::Message
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}
