use uuid::Uuid;

use crate::models::PresenceRow;
use crate::{Database, Result, uuid_col};

/// A user counts as online when seen within this window.
pub const ONLINE_WINDOW_MS: i64 = 60_000;

impl Database {
    /// Record that `user_id` is active right now.
    pub fn touch_presence(&self, user_id: Uuid, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO presence (user_id, last_seen_at, offline, updated_at) VALUES (?1, ?2, 0, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_seen_at = ?2, offline = 0, updated_at = ?2",
                rusqlite::params![user_id.to_string(), now],
            )?;
            Ok(())
        })
    }

    /// Record that `user_id` just went away. They stay offline until the next touch,
    /// whatever the online window says.
    pub fn mark_offline(&self, user_id: Uuid, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO presence (user_id, last_seen_at, offline, updated_at) VALUES (?1, ?2, 1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_seen_at = ?2, offline = 1, updated_at = ?2",
                rusqlite::params![user_id.to_string(), now],
            )?;
            Ok(())
        })
    }

    pub fn online_user_ids(&self, now: i64) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM presence
                 WHERE last_seen_at >= ?1 AND offline = 0
                 ORDER BY last_seen_at DESC",
            )?;
            let ids = stmt
                .query_map([now - ONLINE_WINDOW_MS], |row| uuid_col(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Last-seen status of every user that has ever been seen.
    pub fn presence_map(&self, now: i64) -> Result<Vec<PresenceRow>> {
        let cutoff = now - ONLINE_WINDOW_MS;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id, last_seen_at, offline FROM presence")?;
            let rows = stmt
                .query_map([], |row| {
                    let last_seen_at: i64 = row.get(1)?;
                    let offline: bool = row.get(2)?;
                    Ok(PresenceRow {
                        user_id: uuid_col(row, 0)?,
                        last_seen_at,
                        online: !offline && last_seen_at >= cutoff,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ONLINE_WINDOW_MS;
    use crate::test_support::{db, user};

    #[test]
    fn online_window_is_inclusive() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");

        db.touch_presence(ada.id, 100_000).unwrap();
        db.touch_presence(bob.id, 100_000 - ONLINE_WINDOW_MS - 1).unwrap();

        assert_eq!(db.online_user_ids(100_000 + ONLINE_WINDOW_MS).unwrap(), vec![ada.id]);
        assert!(db
            .online_user_ids(100_000 + ONLINE_WINDOW_MS + 1)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn touch_refreshes_last_seen() {
        let db = db();
        let ada = user(&db, "ada");

        db.touch_presence(ada.id, 1_000).unwrap();
        db.touch_presence(ada.id, 90_000).unwrap();

        let map = db.presence_map(100_000).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].last_seen_at, 90_000);
        assert!(map[0].online);

        let later = db.presence_map(200_000).unwrap();
        assert!(!later[0].online);
    }

    #[test]
    fn offline_mark_wins_over_the_window_until_next_touch() {
        let db = db();
        let ada = user(&db, "ada");

        db.touch_presence(ada.id, 10_000).unwrap();
        db.mark_offline(ada.id, 11_000).unwrap();

        let map = db.presence_map(11_000).unwrap();
        assert!(!map[0].online);
        assert_eq!(map[0].last_seen_at, 11_000);
        assert!(db.online_user_ids(11_000).unwrap().is_empty());

        db.touch_presence(ada.id, 12_000).unwrap();
        assert_eq!(db.online_user_ids(12_000).unwrap(), vec![ada.id]);
    }
}
