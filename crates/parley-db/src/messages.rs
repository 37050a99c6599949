use rusqlite::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use crate::conversations::ensure_participant;
use crate::models::{
    MessagePageRow, MessageRow, MessageViewRow, ReadStatusRow, ReplyPreviewRow, SearchHitRow,
};
use crate::{DELETED_PLACEHOLDER, Database, Error, OptionalExt, Result, opt_uuid_col, uuid_col};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;
pub const MAX_CONTENT_CHARS: usize = 10_000;

const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, m.content, m.deleted, \
     m.created_at, m.updated_at, m.edited_at, m.reply_to_message_id";

impl Database {
    /// Append a message. Bumps the conversation's recency and every other
    /// participant's unread counter in the same transaction.
    pub fn send_message(
        &self,
        me: Uuid,
        conversation_id: Uuid,
        content: &str,
        reply_to: Option<Uuid>,
        now: i64,
    ) -> Result<MessageRow> {
        let content = validate_content(content)?;

        self.with_tx(|conn| {
            ensure_participant(conn, conversation_id, me)?;

            if let Some(reply_id) = reply_to {
                let target = query_message(conn, reply_id)?.ok_or(Error::NotFound("message"))?;
                if target.conversation_id != conversation_id {
                    return Err(Error::Invalid("can only reply within the same conversation"));
                }
            }

            let message = insert_message(conn, conversation_id, me, content, reply_to, now)?;
            record_activity(conn, conversation_id, me, now)?;
            Ok(message)
        })
    }

    /// One page of history, newest page first; messages within the page are
    /// oldest first. `cursor` is the `next_cursor` of the previous page.
    pub fn list_messages(
        &self,
        me: Uuid,
        conversation_id: Uuid,
        limit: Option<u32>,
        cursor: Option<Uuid>,
    ) -> Result<MessagePageRow> {
        let limit = clamp_limit(limit);

        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;

            let (before_created, before_rowid) = match cursor {
                Some(cursor) => conn
                    .query_row(
                        "SELECT created_at, rowid FROM messages WHERE id = ?1 AND conversation_id = ?2",
                        [cursor.to_string(), conversation_id.to_string()],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?
                    .ok_or(Error::Invalid("unknown cursor"))?,
                None => (i64::MAX, i64::MAX),
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}, u.name, u.image_url
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.conversation_id = ?1
                   AND (m.created_at < ?2 OR (m.created_at = ?2 AND m.rowid < ?3))
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?4"
            ))?;
            let mut rows = stmt
                .query_map(
                    rusqlite::params![
                        conversation_id.to_string(),
                        before_created,
                        before_rowid,
                        limit + 1
                    ],
                    |row| {
                        Ok((
                            map_message(row)?,
                            row.get::<_, Option<String>>(9)?,
                            row.get::<_, Option<String>>(10)?,
                        ))
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let has_more = rows.len() > limit as usize;
            rows.truncate(limit as usize);
            let next_cursor = if has_more {
                rows.last().map(|(m, _, _)| m.id)
            } else {
                None
            };

            let seen_until = query_others_read_until(conn, conversation_id, me)?;

            let mut messages = Vec::with_capacity(rows.len());
            for (message, sender_name, sender_image_url) in rows {
                messages.push(build_view(conn, me, message, sender_name, sender_image_url, seen_until)?);
            }
            messages.reverse();

            Ok(MessagePageRow {
                messages,
                next_cursor,
            })
        })
    }

    pub fn edit_message(&self, me: Uuid, message_id: Uuid, content: &str, now: i64) -> Result<MessageRow> {
        let content = validate_content(content)?;

        self.with_tx(|conn| {
            let message = query_message(conn, message_id)?.ok_or(Error::NotFound("message"))?;
            if message.sender_id != me {
                return Err(Error::Forbidden("can only edit own messages"));
            }
            if message.deleted {
                return Err(Error::Invalid("cannot edit a deleted message"));
            }

            conn.execute(
                "UPDATE messages SET content = ?1, updated_at = ?2, edited_at = ?2 WHERE id = ?3",
                rusqlite::params![content, now, message_id.to_string()],
            )?;
            query_message(conn, message_id)?.ok_or(Error::NotFound("message"))
        })
    }

    /// Soft delete: the row keeps its identity, its content becomes the placeholder.
    pub fn soft_delete_message(&self, me: Uuid, message_id: Uuid, now: i64) -> Result<MessageRow> {
        self.with_tx(|conn| {
            let message = query_message(conn, message_id)?.ok_or(Error::NotFound("message"))?;
            if message.sender_id != me {
                return Err(Error::Forbidden("can only delete own messages"));
            }
            if message.deleted {
                return Ok(message);
            }

            conn.execute(
                "UPDATE messages SET content = ?1, deleted = 1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![DELETED_PLACEHOLDER, now, message_id.to_string()],
            )?;
            debug!("Message {} soft-deleted by {}", message_id, me);
            query_message(conn, message_id)?.ok_or(Error::NotFound("message"))
        })
    }

    /// Copy a message into another conversation as a new message from `me`.
    pub fn forward_message(&self, me: Uuid, message_id: Uuid, target: Uuid, now: i64) -> Result<MessageRow> {
        self.with_tx(|conn| {
            let source = query_message(conn, message_id)?.ok_or(Error::NotFound("message"))?;
            ensure_participant(conn, source.conversation_id, me)?;
            ensure_participant(conn, target, me)?;

            let message = insert_message(conn, target, me, &source.content, None, now)?;
            record_activity(conn, target, me, now)?;
            Ok(message)
        })
    }

    /// Case-insensitive substring search over live messages, returned oldest first.
    pub fn search_messages(
        &self,
        me: Uuid,
        conversation_id: Uuid,
        query: &str,
        limit: Option<u32>,
    ) -> Result<Vec<SearchHitRow>> {
        let limit = clamp_limit(limit) as usize;

        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;

            let needle = query.trim().to_lowercase();
            if needle.is_empty() {
                return Ok(vec![]);
            }

            let mut stmt = conn.prepare(
                "SELECT m.id, m.content, m.sender_id, u.name, m.created_at, m.edited_at
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.conversation_id = ?1 AND m.deleted = 0
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;
            let candidates = stmt.query_map([conversation_id.to_string()], |row| {
                Ok(SearchHitRow {
                    id: uuid_col(row, 0)?,
                    content: row.get(1)?,
                    sender_id: uuid_col(row, 2)?,
                    sender_name: row
                        .get::<_, Option<String>>(3)?
                        .unwrap_or_else(|| "Unknown".to_string()),
                    created_at: row.get(4)?,
                    edited_at: row.get(5)?,
                })
            })?;

            let mut hits = Vec::new();
            for hit in candidates {
                let hit = hit?;
                if hit.content.to_lowercase().contains(&needle) {
                    hits.push(hit);
                    if hits.len() == limit {
                        break;
                    }
                }
            }
            hits.reverse();
            Ok(hits)
        })
    }

    /// A single message rendered the way `list_messages` renders it.
    pub fn message_view(&self, me: Uuid, message_id: Uuid) -> Result<MessageViewRow> {
        self.with_conn(|conn| {
            let message = query_message(conn, message_id)?.ok_or(Error::NotFound("message"))?;
            ensure_participant(conn, message.conversation_id, me)?;

            let (sender_name, sender_image_url) = conn
                .query_row(
                    "SELECT name, image_url FROM users WHERE id = ?1",
                    [message.sender_id.to_string()],
                    |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?
                .unwrap_or((None, None));
            let seen_until = query_others_read_until(conn, message.conversation_id, me)?;

            build_view(conn, me, message, sender_name, sender_image_url, seen_until)
        })
    }
}

/// Content as shown to readers.
pub(crate) fn visible_content(deleted: bool, content: String) -> String {
    if deleted {
        DELETED_PLACEHOLDER.to_string()
    } else {
        content
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

fn validate_content(content: &str) -> Result<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::Invalid("message cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::Invalid("message is too long"));
    }
    Ok(content)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let deleted: bool = row.get(4)?;
    Ok(MessageRow {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        content: visible_content(deleted, row.get(3)?),
        deleted,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        edited_at: row.get(7)?,
        reply_to_message_id: opt_uuid_col(row, 8)?,
    })
}

pub(crate) fn query_message(conn: &Connection, id: Uuid) -> Result<Option<MessageRow>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1"),
        [id.to_string()],
        map_message,
    )
    .optional()
}

fn insert_message(
    conn: &Connection,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
    reply_to: Option<Uuid>,
    now: i64,
) -> Result<MessageRow> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO messages
            (id, conversation_id, sender_id, content, deleted, created_at, updated_at, reply_to_message_id)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            conversation_id.to_string(),
            sender_id.to_string(),
            content,
            now,
            reply_to.map(|r| r.to_string()),
        ],
    )?;

    Ok(MessageRow {
        id,
        conversation_id,
        sender_id,
        content: content.to_string(),
        deleted: false,
        created_at: now,
        updated_at: now,
        edited_at: None,
        reply_to_message_id: reply_to,
    })
}

/// Mark the conversation active and count the new message as unread for everyone but the sender.
fn record_activity(conn: &Connection, conversation_id: Uuid, sender_id: Uuid, now: i64) -> Result<()> {
    let cid = conversation_id.to_string();
    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, cid],
    )?;
    conn.execute(
        "UPDATE conversation_participants SET unread_count = unread_count + 1
         WHERE conversation_id = ?1 AND user_id != ?2",
        [cid, sender_id.to_string()],
    )?;
    Ok(())
}

fn build_view(
    conn: &Connection,
    me: Uuid,
    message: MessageRow,
    sender_name: Option<String>,
    sender_image_url: Option<String>,
    seen_until: Option<i64>,
) -> Result<MessageViewRow> {
    let reply_to = match message.reply_to_message_id {
        Some(reply_id) => query_reply_preview(conn, reply_id)?,
        None => None,
    };
    let read_status = (message.sender_id == me && !message.deleted).then(|| ReadStatusRow {
        delivered: true,
        seen: seen_until.is_some_and(|t| t >= message.created_at),
    });

    Ok(MessageViewRow {
        message,
        sender_name: sender_name.unwrap_or_else(|| "Unknown".to_string()),
        sender_image_url,
        reply_to,
        read_status,
    })
}

/// Creation time of the newest message any other participant has read.
fn query_others_read_until(conn: &Connection, conversation_id: Uuid, me: Uuid) -> Result<Option<i64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(m.created_at)
         FROM conversation_participants p
         JOIN messages m ON m.id = p.last_read_message_id
         WHERE p.conversation_id = ?1 AND p.user_id != ?2",
        [conversation_id.to_string(), me.to_string()],
        |row| row.get(0),
    )?;
    Ok(max)
}

fn query_reply_preview(conn: &Connection, message_id: Uuid) -> Result<Option<ReplyPreviewRow>> {
    conn.query_row(
        "SELECT m.content, m.deleted, u.name
         FROM messages m
         LEFT JOIN users u ON u.id = m.sender_id
         WHERE m.id = ?1",
        [message_id.to_string()],
        |row| {
            Ok(ReplyPreviewRow {
                content: visible_content(row.get(1)?, row.get(0)?),
                sender_name: row
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
        },
    )
    .optional()
}
