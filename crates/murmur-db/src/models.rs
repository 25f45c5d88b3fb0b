//! Database row types. These map directly to SQLite rows.
//! Distinct from murmur-types models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use murmur_types::models::{Channel, Message, MessageTarget};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender: String,
    pub channel_name: Option<String>,
    pub recipient: Option<String>,
    pub content: String,
    pub created_at: String,
}

impl ChannelRow {
    pub fn into_channel(self) -> Channel {
        Channel {
            created_at: parse_timestamp(&self.created_at).unwrap_or_else(|| {
                warn!("Corrupt created_at '{}' on channel '{}'", self.created_at, self.name);
                DateTime::default()
            }),
            id: self.id,
            name: self.name,
        }
    }
}

impl MessageRow {
    /// Converts to the API model. Rows that violate the single-target rule
    /// are reported and skipped rather than surfaced half-formed.
    pub fn into_message(self) -> Option<Message> {
        let Some(target) = MessageTarget::from_columns(self.channel_name, self.recipient) else {
            warn!("Message {} has no single target, skipping", self.id);
            return None;
        };

        let created_at = parse_timestamp(&self.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message {}", self.created_at, self.id);
            DateTime::default()
        });

        Some(Message {
            id: self.id,
            sender: self.sender,
            target,
            content: self.content,
            created_at,
        })
    }
}

/// Accepts RFC 3339 (what the gateway writes) and SQLite's
/// `datetime('now')` format, which has no timezone and is UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}
