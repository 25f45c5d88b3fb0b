use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Where a message is addressed. A message has exactly one target: a
/// broadcast channel or a single recipient, never both and never neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTarget {
    Channel { channel_name: String },
    Direct { recipient: String },
}

impl MessageTarget {
    pub fn channel(name: impl Into<String>) -> Self {
        Self::Channel {
            channel_name: name.into(),
        }
    }

    pub fn direct(recipient: impl Into<String>) -> Self {
        Self::Direct {
            recipient: recipient.into(),
        }
    }

    pub fn channel_name(&self) -> Option<&str> {
        match self {
            Self::Channel { channel_name } => Some(channel_name),
            Self::Direct { .. } => None,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Channel { .. } => None,
            Self::Direct { recipient } => Some(recipient),
        }
    }

    /// Rebuilds a target from the two nullable storage columns.
    /// Returns `None` unless exactly one of them is set.
    pub fn from_columns(channel_name: Option<String>, recipient: Option<String>) -> Option<Self> {
        match (channel_name, recipient) {
            (Some(channel_name), None) => Some(Self::Channel { channel_name }),
            (None, Some(recipient)) => Some(Self::Direct { recipient }),
            _ => None,
        }
    }
}

/// A message that has not been written yet (no id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: String,
    pub target: MessageTarget,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            sender: self.sender,
            target: self.target,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

/// A persisted message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender: String,
    #[serde(flatten)]
    pub target: MessageTarget,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
