use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            image_url   TEXT,
            email       TEXT,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_name ON users(name);

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            name        TEXT,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_updated
            ON conversations(updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL REFERENCES conversations(id),
            sender_id           TEXT NOT NULL REFERENCES users(id),
            content             TEXT NOT NULL,
            deleted             INTEGER NOT NULL DEFAULT 0,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL,
            edited_at           INTEGER,
            reply_to_message_id TEXT REFERENCES messages(id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id      TEXT NOT NULL REFERENCES conversations(id),
            user_id              TEXT NOT NULL REFERENCES users(id),
            last_read_message_id TEXT REFERENCES messages(id),
            last_read_at         INTEGER,
            unread_count         INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
            joined_at            INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS message_reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON message_reactions(message_id);

        CREATE TABLE IF NOT EXISTS presence (
            user_id      TEXT PRIMARY KEY REFERENCES users(id),
            last_seen_at INTEGER NOT NULL,
            -- Set when the user's last gateway connection closed
            offline      INTEGER NOT NULL DEFAULT 0,
            updated_at   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_presence_last_seen
            ON presence(last_seen_at);

        CREATE TABLE IF NOT EXISTS typing (
            user_id         TEXT NOT NULL REFERENCES users(id),
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (user_id, conversation_id)
        );

        CREATE INDEX IF NOT EXISTS idx_typing_conversation
            ON typing(conversation_id);

        CREATE TABLE IF NOT EXISTS push_tokens (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            token       TEXT NOT NULL UNIQUE,
            user_agent  TEXT,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_push_tokens_user
            ON push_tokens(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
