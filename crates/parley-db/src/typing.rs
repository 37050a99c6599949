use uuid::Uuid;

use crate::conversations::ensure_participant;
use crate::models::TypingRow;
use crate::{Database, Result, uuid_col};

/// Typing rows older than this are ignored. Nothing sweeps them.
pub const TYPING_EXPIRY_MS: i64 = 2_000;

impl Database {
    pub fn set_typing(&self, me: Uuid, conversation_id: Uuid, is_typing: bool, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;
            if is_typing {
                conn.execute(
                    "INSERT INTO typing (user_id, conversation_id, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id, conversation_id) DO UPDATE SET updated_at = ?3",
                    rusqlite::params![me.to_string(), conversation_id.to_string(), now],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM typing WHERE user_id = ?1 AND conversation_id = ?2",
                    [me.to_string(), conversation_id.to_string()],
                )?;
            }
            Ok(())
        })
    }

    /// Users typing in `conversation_id` within the expiry window, excluding `me`.
    pub fn typing_users(&self, me: Uuid, conversation_id: Uuid, now: i64) -> Result<Vec<TypingRow>> {
        self.with_conn(|conn| {
            ensure_participant(conn, conversation_id, me)?;
            let mut stmt = conn.prepare(
                "SELECT t.user_id, u.name
                 FROM typing t
                 JOIN users u ON u.id = t.user_id
                 WHERE t.conversation_id = ?1 AND t.user_id != ?2 AND t.updated_at >= ?3
                 ORDER BY t.updated_at",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        conversation_id.to_string(),
                        me.to_string(),
                        now - TYPING_EXPIRY_MS
                    ],
                    |row| {
                        Ok(TypingRow {
                            user_id: uuid_col(row, 0)?,
                            name: row.get(1)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TYPING_EXPIRY_MS;
    use crate::test_support::{db, direct, user};
    use crate::Error;

    #[test]
    fn typing_expires_at_read_time() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let dm = direct(&db, &ada, &bob);

        db.set_typing(bob.id, dm, true, 10_000).unwrap();
        let now_typing = db.typing_users(ada.id, dm, 10_000 + TYPING_EXPIRY_MS).unwrap();
        assert_eq!(now_typing.len(), 1);
        assert_eq!(now_typing[0].name, "bob");

        assert!(db
            .typing_users(ada.id, dm, 10_001 + TYPING_EXPIRY_MS)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn own_typing_is_hidden_and_stop_clears() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let dm = direct(&db, &ada, &bob);

        db.set_typing(ada.id, dm, true, 5_000).unwrap();
        assert!(db.typing_users(ada.id, dm, 5_000).unwrap().is_empty());
        assert_eq!(db.typing_users(bob.id, dm, 5_000).unwrap().len(), 1);

        db.set_typing(ada.id, dm, false, 5_100).unwrap();
        assert!(db.typing_users(bob.id, dm, 5_100).unwrap().is_empty());
    }

    #[test]
    fn outsiders_cannot_type() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let eve = user(&db, "eve");
        let dm = direct(&db, &ada, &bob);

        assert!(matches!(
            db.set_typing(eve.id, dm, true, 1).unwrap_err(),
            Error::NotParticipant
        ));
    }
}
