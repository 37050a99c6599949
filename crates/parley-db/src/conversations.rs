use std::collections::HashSet;

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::messages::visible_content;
use crate::models::{
    ConversationDetailRow, ConversationSummaryRow, LastMessageRow, UserBriefRow,
};
use crate::users::query_user_by_id;
use crate::{Database, Error, OptionalExt, Result, uuid_col};

struct ConversationRecord {
    name: Option<String>,
}

impl Database {
    /// Find the 1:1 conversation between `me` and `other`, creating it if needed.
    /// Returns the conversation id and whether it was created by this call.
    pub fn get_or_create_direct(&self, me: Uuid, other: Uuid, now: i64) -> Result<(Uuid, bool)> {
        if me == other {
            return Err(Error::Invalid("cannot create a conversation with yourself"));
        }

        self.with_tx(|conn| {
            if query_user_by_id(conn, other)?.is_none() {
                return Err(Error::NotFound("user"));
            }

            let existing = conn
                .query_row(
                    "SELECT c.id FROM conversations c
                     JOIN conversation_participants a ON a.conversation_id = c.id AND a.user_id = ?1
                     JOIN conversation_participants b ON b.conversation_id = c.id AND b.user_id = ?2
                     WHERE c.name IS NULL
                       AND (SELECT COUNT(*) FROM conversation_participants p
                            WHERE p.conversation_id = c.id) = 2
                     ORDER BY c.created_at
                     LIMIT 1",
                    rusqlite::params![me.to_string(), other.to_string()],
                    |row| uuid_col(row, 0),
                )
                .optional()?;

            if let Some(id) = existing {
                return Ok((id, false));
            }

            let id = insert_conversation(conn, None, now)?;
            insert_participant(conn, id, me, now)?;
            insert_participant(conn, id, other, now)?;
            debug!("Created direct conversation {} between {} and {}", id, me, other);
            Ok((id, true))
        })
    }

    /// Create a named group with `me` plus `member_ids`.
    pub fn create_group(&self, me: Uuid, name: &str, member_ids: &[Uuid], now: i64) -> Result<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Invalid("group name is required"));
        }
        if member_ids.is_empty() {
            return Err(Error::Invalid("select at least 1 member"));
        }

        // Dedupe while keeping the caller's order
        let mut seen = HashSet::new();
        let members: Vec<Uuid> = member_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if seen.contains(&me) {
            return Err(Error::Invalid("do not include yourself in the member list"));
        }

        self.with_tx(|conn| {
            for member in &members {
                if query_user_by_id(conn, *member)?.is_none() {
                    return Err(Error::NotFound("user"));
                }
            }

            let id = insert_conversation(conn, Some(name), now)?;
            insert_participant(conn, id, me, now)?;
            for member in &members {
                insert_participant(conn, id, *member, now)?;
            }
            debug!("Created group {} ({} members)", id, members.len() + 1);
            Ok(id)
        })
    }

    /// Sidebar listing for `me`, most recently active first.
    pub fn list_conversations(&self, me: Uuid) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.updated_at, p.unread_count,
                        (SELECT COUNT(*) FROM conversation_participants x
                         WHERE x.conversation_id = c.id)
                 FROM conversation_participants p
                 JOIN conversations c ON c.id = p.conversation_id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC, c.created_at DESC, c.id",
            )?;
            let memberships = stmt
                .query_map([me.to_string()], |row| {
                    Ok((
                        uuid_col(row, 0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, i64>(4)? as usize,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut seen_direct = HashSet::new();
            let mut summaries = Vec::with_capacity(memberships.len());

            for (conversation_id, name, updated_at, unread_count, member_count) in memberships {
                let (is_group, display_name, other_user) = match name {
                    Some(name) => (true, name, None),
                    None => {
                        let Some(other) = query_other_participant(conn, conversation_id, me)? else {
                            continue;
                        };
                        // Keep only the most recent 1:1 per counterpart
                        if !seen_direct.insert(other.id) {
                            continue;
                        }
                        (false, other.name.clone(), Some(other))
                    }
                };

                summaries.push(ConversationSummaryRow {
                    conversation_id,
                    is_group,
                    name: display_name,
                    member_count,
                    other_user,
                    last_message: query_last_message(conn, conversation_id)?,
                    unread_count,
                    updated_at,
                });
            }

            Ok(summaries)
        })
    }

    pub fn conversation_detail(&self, me: Uuid, conversation_id: Uuid) -> Result<ConversationDetailRow> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;
            let record = query_conversation(conn, conversation_id)?
                .ok_or(Error::NotFound("conversation"))?;
            let member_count = query_participant_ids(conn, conversation_id)?.len();

            let (is_group, name, other_user) = match record.name {
                Some(name) => (true, name, None),
                None => {
                    let other = query_other_participant(conn, conversation_id, me)?;
                    let name = other
                        .as_ref()
                        .map_or_else(|| "Unknown".to_string(), |u| u.name.clone());
                    (false, name, other)
                }
            };

            Ok(ConversationDetailRow {
                conversation_id,
                is_group,
                name,
                member_count,
                other_user,
            })
        })
    }

    /// Members of a group. Empty for 1:1 conversations.
    pub fn group_members(&self, me: Uuid, conversation_id: Uuid) -> Result<Vec<UserBriefRow>> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;
            let record = query_conversation(conn, conversation_id)?
                .ok_or(Error::NotFound("conversation"))?;
            if record.name.is_none() {
                return Ok(vec![]);
            }

            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.image_url
                 FROM conversation_participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.conversation_id = ?1
                 ORDER BY p.joined_at, u.name COLLATE NOCASE",
            )?;
            let members = stmt
                .query_map([conversation_id.to_string()], |row| {
                    Ok(UserBriefRow {
                        id: uuid_col(row, 0)?,
                        name: row.get(1)?,
                        image_url: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(members)
        })
    }

    /// Leave a group. A group never drops below two participants.
    pub fn leave_group(&self, me: Uuid, conversation_id: Uuid) -> Result<()> {
        self.with_tx(|conn| {
            let record = query_conversation(conn, conversation_id)?
                .ok_or(Error::NotFound("conversation"))?;
            if record.name.is_none() {
                return Err(Error::Invalid("can only leave group conversations"));
            }
            ensure_participant(conn, conversation_id, me)?;
            if query_participant_ids(conn, conversation_id)?.len() <= 2 {
                return Err(Error::Invalid("a group needs at least two members"));
            }

            let cid = conversation_id.to_string();
            let uid = me.to_string();
            conn.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                [&cid, &uid],
            )?;
            conn.execute(
                "DELETE FROM typing WHERE conversation_id = ?1 AND user_id = ?2",
                [&cid, &uid],
            )?;
            debug!("{} left group {}", me, conversation_id);
            Ok(())
        })
    }

    pub fn participant_ids(&self, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_participant_ids(conn, conversation_id))
    }

    pub fn require_participant(&self, me: Uuid, conversation_id: Uuid) -> Result<()> {
        self.with_conn(|conn| ensure_participant(conn, conversation_id, me))
    }
}

fn insert_conversation(conn: &Connection, name: Option<&str>, now: i64) -> Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO conversations (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        rusqlite::params![id.to_string(), name, now],
    )?;
    Ok(id)
}

fn insert_participant(conn: &Connection, conversation_id: Uuid, user_id: Uuid, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_participants (conversation_id, user_id, unread_count, joined_at)
         VALUES (?1, ?2, 0, ?3)",
        rusqlite::params![conversation_id.to_string(), user_id.to_string(), now],
    )?;
    Ok(())
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<ConversationRecord>> {
    conn.query_row(
        "SELECT name FROM conversations WHERE id = ?1",
        [id.to_string()],
        |row| Ok(ConversationRecord { name: row.get(0)? }),
    )
    .optional()
}

/// First other participant of a conversation, by join order.
fn query_other_participant(conn: &Connection, conversation_id: Uuid, me: Uuid) -> Result<Option<UserBriefRow>> {
    conn.query_row(
        "SELECT u.id, u.name, u.image_url
         FROM conversation_participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.conversation_id = ?1 AND p.user_id != ?2
         ORDER BY p.joined_at, u.id
         LIMIT 1",
        [conversation_id.to_string(), me.to_string()],
        |row| {
            Ok(UserBriefRow {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                image_url: row.get(2)?,
            })
        },
    )
    .optional()
}

fn query_last_message(conn: &Connection, conversation_id: Uuid) -> Result<Option<LastMessageRow>> {
    conn.query_row(
        "SELECT content, deleted, sender_id, created_at FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1",
        [conversation_id.to_string()],
        |row| {
            let content: String = row.get(0)?;
            let deleted: bool = row.get(1)?;
            Ok(LastMessageRow {
                content: visible_content(deleted, content),
                sender_id: uuid_col(row, 2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

pub(crate) fn query_participant_ids(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY joined_at, user_id",
    )?;
    let ids = stmt
        .query_map([conversation_id.to_string()], |row| uuid_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn ensure_participant(conn: &Connection, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
            [conversation_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    found.map(|_| ()).ok_or(Error::NotParticipant)
}
