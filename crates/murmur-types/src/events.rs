use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageTarget};

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection accepted and bound to `username`
    Ready {
        username: String,
        channels: Vec<String>,
        online: Vec<String>,
    },

    /// A message posted to a channel
    Channel {
        id: i64,
        channel: String,
        sender: String,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// A direct message, delivered to the recipient and echoed to the sender
    Private {
        id: i64,
        sender: String,
        recipient: String,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// One of this session's frames was rejected
    Error { reason: String },
}

impl From<&Message> for ServerEvent {
    fn from(msg: &Message) -> Self {
        match &msg.target {
            MessageTarget::Channel { channel_name } => Self::Channel {
                id: msg.id,
                channel: channel_name.clone(),
                sender: msg.sender.clone(),
                content: msg.content.clone(),
                created_at: msg.created_at,
            },
            MessageTarget::Direct { recipient } => Self::Private {
                id: msg.id,
                sender: msg.sender.clone(),
                recipient: recipient.clone(),
                content: msg.content.clone(),
                created_at: msg.created_at,
            },
        }
    }
}

/// Addressing mode of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Channel,
    #[serde(alias = "direct")]
    Private,
}

/// Frame sent FROM client TO server over WebSocket.
///
/// Current clients send `type` + `target`. Older clients send either
/// `recipient` alone (one-to-one chat) or only `content` (single room);
/// the gateway maps both onto the same envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub content: String,
}

impl ClientFrame {
    pub fn channel(channel: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: Some(FrameKind::Channel),
            target: Some(channel.into()),
            recipient: None,
            content: content.into(),
        }
    }

    pub fn private(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: Some(FrameKind::Private),
            target: Some(recipient.into()),
            recipient: None,
            content: content.into(),
        }
    }
}
