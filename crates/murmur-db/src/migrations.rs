use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, channels, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE channels (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Append-only log. AUTOINCREMENT keeps ids strictly increasing
            -- and never reused, so id order is creation order.
            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender          TEXT NOT NULL CHECK (length(sender) > 0),
                channel_name    TEXT,
                recipient       TEXT,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                CHECK ((channel_name IS NULL) <> (recipient IS NULL))
            );

            CREATE INDEX idx_messages_channel
                ON messages(channel_name, id)
                WHERE channel_name IS NOT NULL;

            CREATE INDEX idx_messages_direct
                ON messages(sender, recipient, id)
                WHERE recipient IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
