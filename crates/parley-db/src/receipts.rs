use rusqlite::Connection;
use uuid::Uuid;

use crate::messages::query_message;
use crate::models::ParticipantRow;
use crate::{Database, Error, OptionalExt, Result, opt_uuid_col, uuid_col};

impl Database {
    /// Clear the caller's unread counter and, when given, advance their read pointer.
    /// The pointer never moves back to an older message.
    pub fn mark_read(
        &self,
        me: Uuid,
        conversation_id: Uuid,
        last_read_message_id: Option<Uuid>,
        now: i64,
    ) -> Result<ParticipantRow> {
        self.with_tx(|conn| {
            let current = query_participant(conn, conversation_id, me)?.ok_or(Error::NotParticipant)?;

            let mut pointer = current.last_read_message_id;
            if let Some(candidate_id) = last_read_message_id {
                let candidate = query_message(conn, candidate_id)?.ok_or(Error::NotFound("message"))?;
                if candidate.conversation_id != conversation_id {
                    return Err(Error::Invalid("message belongs to another conversation"));
                }

                let current_at = match current.last_read_message_id {
                    Some(id) => query_message(conn, id)?.map(|m| m.created_at),
                    None => None,
                };
                if current_at.is_none_or(|at| candidate.created_at >= at) {
                    pointer = Some(candidate_id);
                }
            }

            conn.execute(
                "UPDATE conversation_participants
                 SET unread_count = 0, last_read_at = ?1, last_read_message_id = ?2
                 WHERE conversation_id = ?3 AND user_id = ?4",
                rusqlite::params![
                    now,
                    pointer.map(|p| p.to_string()),
                    conversation_id.to_string(),
                    me.to_string()
                ],
            )?;

            query_participant(conn, conversation_id, me)?.ok_or(Error::NotParticipant)
        })
    }
}

#[cfg(test)]
impl Database {
    fn participant(&self, me: Uuid, conversation_id: Uuid) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| query_participant(conn, conversation_id, me))
    }
}

fn query_participant(conn: &Connection, conversation_id: Uuid, user_id: Uuid) -> Result<Option<ParticipantRow>> {
    conn.query_row(
        "SELECT conversation_id, user_id, last_read_message_id, last_read_at, unread_count, joined_at
         FROM conversation_participants
         WHERE conversation_id = ?1 AND user_id = ?2",
        [conversation_id.to_string(), user_id.to_string()],
        |row| {
            Ok(ParticipantRow {
                conversation_id: uuid_col(row, 0)?,
                user_id: uuid_col(row, 1)?,
                last_read_message_id: opt_uuid_col(row, 2)?,
                last_read_at: row.get(3)?,
                unread_count: row.get(4)?,
                joined_at: row.get(5)?,
            })
        },
    )
    .optional()
}
