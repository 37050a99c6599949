use std::collections::BTreeSet;

use uuid::Uuid;

use crate::conversations::{ensure_participant, query_participant_ids};
use crate::models::PushTokenRow;
use crate::{Database, Error, OptionalExt, Result, uuid_col};

impl Database {
    /// Register a device token for `me`. A token seen before is re-assigned
    /// to the caller, since a device can change hands between sessions.
    pub fn register_push_token(
        &self,
        me: Uuid,
        token: &str,
        user_agent: Option<&str>,
        now: i64,
    ) -> Result<PushTokenRow> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Invalid("token is required"));
        }

        self.with_tx(|conn| {
            conn.execute(
                "INSERT INTO push_tokens (id, user_id, token, user_agent, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(token) DO UPDATE SET
                    user_id = excluded.user_id,
                    user_agent = excluded.user_agent,
                    updated_at = excluded.updated_at",
                rusqlite::params![Uuid::new_v4().to_string(), me.to_string(), token, user_agent, now],
            )?;

            conn.query_row(
                "SELECT id, user_id, token, user_agent, created_at, updated_at
                 FROM push_tokens WHERE token = ?1",
                [token],
                |row| {
                    Ok(PushTokenRow {
                        id: uuid_col(row, 0)?,
                        user_id: uuid_col(row, 1)?,
                        token: row.get(2)?,
                        user_agent: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or(Error::NotFound("push token"))
        })
    }

    /// Remove one of the caller's tokens. Tokens owned by others are left alone.
    pub fn unregister_push_token(&self, me: Uuid, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM push_tokens WHERE token = ?1 AND user_id = ?2",
                [token.trim().to_string(), me.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    /// Distinct tokens of all given users.
    pub fn push_tokens_for(&self, user_ids: &[Uuid]) -> Result<Vec<String>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT DISTINCT token FROM push_tokens WHERE user_id IN ({}) ORDER BY token",
                placeholders.join(", ")
            );

            let ids: Vec<String> = user_ids.iter().map(Uuid::to_string).collect();
            let params: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let mut stmt = conn.prepare(&sql)?;
            let tokens = stmt
                .query_map(params.as_slice(), |row| row.get(0))?
                .collect::<std::result::Result<BTreeSet<String>, _>>()?;
            Ok(tokens.into_iter().collect())
        })
    }

    /// Everyone in the conversation except `me`, for notification fan-out.
    pub fn other_participant_ids(&self, me: Uuid, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;
            Ok(query_participant_ids(conn, conversation_id)?
                .into_iter()
                .filter(|id| *id != me)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, direct, user};
    use crate::Error;

    #[test]
    fn registering_a_known_token_moves_it() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");

        let first = db.register_push_token(ada.id, "tok-1", Some("firefox"), 10).unwrap();
        let moved = db.register_push_token(bob.id, "tok-1", None, 20).unwrap();
        assert_eq!(first.id, moved.id);
        assert_eq!(moved.user_id, bob.id);
        assert_eq!(moved.created_at, 10);
        assert_eq!(moved.updated_at, 20);

        assert!(db.push_tokens_for(&[ada.id]).unwrap().is_empty());
        assert_eq!(db.push_tokens_for(&[bob.id]).unwrap(), vec!["tok-1"]);
    }

    #[test]
    fn unregister_only_touches_own_tokens() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");

        db.register_push_token(ada.id, "tok-a", None, 10).unwrap();
        assert!(!db.unregister_push_token(bob.id, "tok-a").unwrap());
        assert!(db.unregister_push_token(ada.id, "tok-a").unwrap());
        assert!(db.push_tokens_for(&[ada.id]).unwrap().is_empty());
    }

    #[test]
    fn blank_tokens_are_rejected() {
        let db = db();
        let ada = user(&db, "ada");
        assert!(matches!(
            db.register_push_token(ada.id, "  ", None, 1).unwrap_err(),
            Error::Invalid(_)
        ));
    }

    #[test]
    fn other_participants_exclude_caller_and_need_membership() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let eve = user(&db, "eve");
        let dm = direct(&db, &ada, &bob);

        assert_eq!(db.other_participant_ids(ada.id, dm).unwrap(), vec![bob.id]);
        assert!(matches!(
            db.other_participant_ids(eve.id, dm).unwrap_err(),
            Error::NotParticipant
        ));
    }
}
