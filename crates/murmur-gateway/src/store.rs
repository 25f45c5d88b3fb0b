use anyhow::Result;

use murmur_db::Database;
use murmur_types::models::{Channel, Message, NewMessage};

/// The persistence operations the gateway relies on.
///
/// Calls are blocking; the dispatcher runs them on the blocking pool.
pub trait MessageStore: Send + Sync + 'static {
    /// Append to the message log, returning the id the store assigned.
    fn append_message(&self, message: &NewMessage) -> Result<i64>;

    /// Oldest first.
    fn channel_messages(&self, channel: &str, limit: u32, before: Option<i64>) -> Result<Vec<Message>>;

    /// Both directions between `a` and `b`, oldest first.
    fn direct_messages(&self, a: &str, b: &str, limit: u32, before: Option<i64>) -> Result<Vec<Message>>;

    fn channels(&self) -> Result<Vec<Channel>>;

    /// Registered and not deactivated, i.e. may receive direct messages.
    fn active_user_exists(&self, username: &str) -> Result<bool>;

    fn channel_exists(&self, name: &str) -> Result<bool>;
}

impl MessageStore for Database {
    fn append_message(&self, message: &NewMessage) -> Result<i64> {
        self.insert_message(message)
    }

    fn channel_messages(&self, channel: &str, limit: u32, before: Option<i64>) -> Result<Vec<Message>> {
        Ok(self
            .get_channel_messages(channel, limit, before)?
            .into_iter()
            .filter_map(|row| row.into_message())
            .collect())
    }

    fn direct_messages(&self, a: &str, b: &str, limit: u32, before: Option<i64>) -> Result<Vec<Message>> {
        Ok(self
            .get_direct_messages(a, b, limit, before)?
            .into_iter()
            .filter_map(|row| row.into_message())
            .collect())
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        Ok(self
            .list_channels()?
            .into_iter()
            .map(|row| row.into_channel())
            .collect())
    }

    fn active_user_exists(&self, username: &str) -> Result<bool> {
        self.is_active_user(username)
    }

    fn channel_exists(&self, name: &str) -> Result<bool> {
        Database::channel_exists(self, name)
    }
}
