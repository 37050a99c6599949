use std::collections::HashMap;

use uuid::Uuid;

use crate::conversations::ensure_participant;
use crate::messages::query_message;
use crate::models::ReactionSummaryRow;
use crate::{Database, Error, OptionalExt, Result, uuid_col};

pub const ALLOWED_EMOJIS: [&str; 5] = ["👍", "❤", "😂", "😮", "😢"];

impl Database {
    /// Toggle a reaction: removes if exists, inserts if not.
    /// Returns (added, conversation_id of the message).
    pub fn toggle_reaction(&self, me: Uuid, message_id: Uuid, emoji: &str, now: i64) -> Result<(bool, Uuid)> {
        if !ALLOWED_EMOJIS.contains(&emoji) {
            return Err(Error::Invalid("invalid emoji"));
        }

        self.with_tx(|conn| {
            let message = query_message(conn, message_id)?.ok_or(Error::NotFound("message"))?;
            ensure_participant(conn, message.conversation_id, me)?;
            if message.deleted {
                return Err(Error::Invalid("cannot react to a deleted message"));
            }

            let mid = message_id.to_string();
            let uid = me.to_string();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    rusqlite::params![mid, uid, emoji],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM message_reactions WHERE id = ?1", [&existing_id])?;
                Ok((false, message.conversation_id))
            } else {
                conn.execute(
                    "INSERT INTO message_reactions (id, message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![Uuid::new_v4().to_string(), mid, uid, emoji, now],
                )?;
                Ok((true, message.conversation_id))
            }
        })
    }

    /// Per-message tallies for a conversation, emoji in order of first use.
    /// Messages without reactions are absent from the map.
    pub fn reactions_for_conversation(
        &self,
        me: Uuid,
        conversation_id: Uuid,
    ) -> Result<HashMap<Uuid, Vec<ReactionSummaryRow>>> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;

            let mut stmt = conn.prepare(
                "SELECT r.message_id, r.emoji, COUNT(*), SUM(r.user_id = ?2), MIN(r.created_at) AS first_at
                 FROM message_reactions r
                 JOIN messages m ON m.id = r.message_id
                 WHERE m.conversation_id = ?1
                 GROUP BY r.message_id, r.emoji
                 ORDER BY r.message_id, first_at, r.emoji",
            )?;
            let rows = stmt.query_map([conversation_id.to_string(), me.to_string()], |row| {
                Ok((
                    uuid_col(row, 0)?,
                    ReactionSummaryRow {
                        emoji: row.get(1)?,
                        count: row.get::<_, i64>(2)? as usize,
                        has_reacted: row.get::<_, i64>(3)? > 0,
                    },
                ))
            })?;

            let mut map: HashMap<Uuid, Vec<ReactionSummaryRow>> = HashMap::new();
            for row in rows {
                let (message_id, summary) = row?;
                map.entry(message_id).or_default().push(summary);
            }
            Ok(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, direct, user};
    use crate::Error;

    #[test]
    fn toggle_adds_then_removes() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let dm = direct(&db, &ada, &bob);
        let msg = db.send_message(ada.id, dm, "nice", None, 2_000).unwrap();

        assert_eq!(db.toggle_reaction(bob.id, msg.id, "👍", 2_100).unwrap(), (true, dm));
        assert_eq!(db.toggle_reaction(bob.id, msg.id, "👍", 2_200).unwrap(), (false, dm));
        assert!(db.reactions_for_conversation(ada.id, dm).unwrap().is_empty());
    }

    #[test]
    fn tallies_count_users_and_flag_the_caller() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let cy = user(&db, "cy");
        let group = db.create_group(ada.id, "Trio", &[bob.id, cy.id], 1_000).unwrap();
        let msg = db.send_message(ada.id, group, "party", None, 2_000).unwrap();

        db.toggle_reaction(bob.id, msg.id, "😂", 2_100).unwrap();
        db.toggle_reaction(cy.id, msg.id, "😂", 2_200).unwrap();
        db.toggle_reaction(cy.id, msg.id, "❤", 2_300).unwrap();

        let map = db.reactions_for_conversation(bob.id, group).unwrap();
        let tallies = &map[&msg.id];
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].emoji, "😂");
        assert_eq!(tallies[0].count, 2);
        assert!(tallies[0].has_reacted);
        assert_eq!(tallies[1].emoji, "❤");
        assert_eq!(tallies[1].count, 1);
        assert!(!tallies[1].has_reacted);
    }

    #[test]
    fn rejects_unknown_emoji_outsiders_and_deleted_messages() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let eve = user(&db, "eve");
        let dm = direct(&db, &ada, &bob);
        let msg = db.send_message(ada.id, dm, "hi", None, 2_000).unwrap();

        assert!(matches!(
            db.toggle_reaction(bob.id, msg.id, "🦀", 2_100).unwrap_err(),
            Error::Invalid(_)
        ));
        assert!(matches!(
            db.toggle_reaction(eve.id, msg.id, "👍", 2_100).unwrap_err(),
            Error::NotParticipant
        ));

        db.soft_delete_message(ada.id, msg.id, 2_200).unwrap();
        assert!(matches!(
            db.toggle_reaction(bob.id, msg.id, "👍", 2_300).unwrap_err(),
            Error::Invalid(_)
        ));
    }
}
