use murmur_types::events::{ClientFrame, FrameKind};
use murmur_types::models::MessageTarget;

use crate::error::GatewayError;

/// Longest accepted message body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// An inbound message that passed parsing and is ready for routing.
///
/// `sender` is always the identity the session was bound to at connect time;
/// frames have no way to set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub target: MessageTarget,
    pub content: String,
}

impl Envelope {
    pub fn new(
        sender: impl Into<String>,
        target: MessageTarget,
        content: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let sender = sender.into();
        let content = content.into();

        if sender.trim().is_empty() {
            return Err(GatewayError::Parse("empty sender".into()));
        }
        let target_name = match &target {
            MessageTarget::Channel { channel_name } => channel_name,
            MessageTarget::Direct { recipient } => recipient,
        };
        if target_name.trim().is_empty() {
            return Err(GatewayError::Parse("empty target".into()));
        }
        if content.trim().is_empty() {
            return Err(GatewayError::Parse("empty content".into()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(GatewayError::Parse(format!(
                "content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }

        Ok(Self {
            sender,
            target,
            content,
        })
    }

    /// Parse a raw text frame from `sender`'s connection. Frames without any
    /// addressing go to `lobby`.
    pub fn parse(sender: &str, raw: &str, lobby: &str) -> Result<Self, GatewayError> {
        let frame: ClientFrame =
            serde_json::from_str(raw).map_err(|e| GatewayError::Parse(e.to_string()))?;
        Self::from_frame(sender, frame, lobby)
    }

    pub fn from_frame(sender: &str, frame: ClientFrame, lobby: &str) -> Result<Self, GatewayError> {
        let target = match (frame.kind, frame.target, frame.recipient) {
            (Some(FrameKind::Channel), Some(channel), None) => MessageTarget::channel(channel),
            (Some(FrameKind::Channel), None, _) => {
                return Err(GatewayError::Parse("channel frame without target".into()));
            }
            (Some(FrameKind::Channel), Some(_), Some(_)) => {
                return Err(GatewayError::Parse("channel frame cannot carry a recipient".into()));
            }
            (Some(FrameKind::Private), target, recipient) => match (target, recipient) {
                (Some(name), None) | (None, Some(name)) => MessageTarget::direct(name),
                (Some(a), Some(b)) if a == b => MessageTarget::direct(a),
                (Some(_), Some(_)) => {
                    return Err(GatewayError::Parse("conflicting target and recipient".into()));
                }
                (None, None) => {
                    return Err(GatewayError::Parse("private frame without target".into()));
                }
            },
            // Older one-to-one clients
            (None, None, Some(recipient)) => MessageTarget::direct(recipient),
            // Older single-room clients
            (None, None, None) => MessageTarget::channel(lobby),
            (None, Some(_), _) => {
                return Err(GatewayError::Parse("target given without type".into()));
            }
        };

        Self::new(sender, target, frame.content)
    }
}
