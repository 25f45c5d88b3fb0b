use crate::Database;
use crate::models::{ChannelRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

use murmur_types::models::NewMessage;

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Registered and not deactivated.
    pub fn is_active_user(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 AND is_active = 1",
                    [username],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Every username except `username`, alphabetical.
    pub fn list_usernames_except(&self, username: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT username FROM users WHERE username != ?1 ORDER BY username")?;
            let names = stmt
                .query_map([username], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Returns false if no such user exists.
    pub fn set_user_active(&self, username: &str, active: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?1 WHERE username = ?2",
                rusqlite::params![active, username],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Channels --

    /// Creates the channel if missing. Returns true if it was created.
    pub fn ensure_channel(&self, name: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute("INSERT OR IGNORE INTO channels (name) VALUES (?1)", [name])?;
            Ok(inserted > 0)
        })
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, created_at FROM channels ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn channel_exists(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM channels WHERE name = ?1", [name], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    /// Appends to the message log and returns the id the store assigned.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender, channel_name, recipient, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    msg.sender,
                    msg.target.channel_name(),
                    msg.target.recipient(),
                    msg.content,
                    msg.created_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The newest `limit` messages of a channel with id below `before`,
    /// returned oldest first.
    pub fn get_channel_messages(
        &self,
        channel_name: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, channel_name, recipient, content, created_at
                 FROM messages
                 WHERE channel_name = ?1 AND (?2 IS NULL OR id < ?2)
                 ORDER BY id DESC
                 LIMIT ?3",
            )?;
            let mut rows = stmt
                .query_map(rusqlite::params![channel_name, before, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Both directions of the conversation between `a` and `b`, paged like
    /// [`Database::get_channel_messages`].
    pub fn get_direct_messages(
        &self,
        a: &str,
        b: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, channel_name, recipient, content, created_at
                 FROM messages
                 WHERE recipient IS NOT NULL
                   AND ((sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1))
                   AND (?3 IS NULL OR id < ?3)
                 ORDER BY id DESC
                 LIMIT ?4",
            )?;
            let mut rows = stmt
                .query_map(rusqlite::params![a, b, before, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, password, is_active, created_at FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                is_active: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        channel_name: row.get(2)?,
        recipient: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// True if `err` was caused by a UNIQUE constraint, e.g. a username taken
/// between the availability check and the insert.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
