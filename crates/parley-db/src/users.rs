use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::models::UserRow;
use crate::{Database, Error, OptionalExt, Result, uuid_col};

const USER_COLUMNS: &str = "id, external_id, name, image_url, email, created_at, updated_at";

impl Database {
    /// Mirror the identity provider's profile into the user table.
    /// Inserts on first sight of `external_id`, otherwise refreshes the profile.
    pub fn sync_user(
        &self,
        external_id: &str,
        name: &str,
        image_url: Option<&str>,
        email: Option<&str>,
        now: i64,
    ) -> Result<UserRow> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Invalid("name is required"));
        }
        if external_id.is_empty() {
            return Err(Error::Invalid("identity subject is required"));
        }

        self.with_tx(|conn| {
            let existing = query_user_by_external_id(conn, external_id)?;
            match existing {
                Some(user) => {
                    conn.execute(
                        "UPDATE users SET name = ?1, image_url = ?2, email = ?3, updated_at = ?4
                         WHERE id = ?5",
                        rusqlite::params![name, image_url, email, now, user.id.to_string()],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO users (id, external_id, name, image_url, email, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        rusqlite::params![
                            Uuid::new_v4().to_string(),
                            external_id,
                            name,
                            image_url,
                            email,
                            now
                        ],
                    )?;
                }
            }
            query_user_by_external_id(conn, external_id)?.ok_or(Error::ProfileNotFound)
        })
    }

    pub fn user_by_external_id(&self, external_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_external_id(conn, external_id))
    }

    /// Resolve the caller of an authenticated request.
    pub fn require_user(&self, external_id: &str) -> Result<UserRow> {
        self.user_by_external_id(external_id)?
            .ok_or(Error::ProfileNotFound)
    }

    pub fn user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Everyone except `me`, for the people picker.
    pub fn list_users_except(&self, me: Uuid) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY name COLLATE NOCASE, id"
            ))?;
            let rows = stmt
                .query_map([me.to_string()], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id.to_string()],
        map_user,
    )
    .optional()
}

fn query_user_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
        [external_id],
        map_user,
    )
    .optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_col(row, 0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        email: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, user};
    use crate::Error;

    #[test]
    fn sync_inserts_then_updates() {
        let db = db();
        let first = db
            .sync_user("idp|ada", "Ada", None, Some("ada@example.com"), 10)
            .unwrap();
        assert_eq!(first.name, "Ada");
        assert_eq!(first.created_at, 10);

        let second = db
            .sync_user("idp|ada", "  Ada L.  ", Some("https://img/ada"), None, 20)
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Ada L.");
        assert_eq!(second.image_url.as_deref(), Some("https://img/ada"));
        assert_eq!(second.email, None);
        assert_eq!(second.created_at, 10);
        assert_eq!(second.updated_at, 20);
    }

    #[test]
    fn sync_rejects_blank_name() {
        let db = db();
        let err = db.sync_user("idp|x", "   ", None, None, 1).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn require_user_needs_a_synced_profile() {
        let db = db();
        assert!(matches!(
            db.require_user("idp|ghost").unwrap_err(),
            Error::ProfileNotFound
        ));
        let ada = user(&db, "ada");
        assert_eq!(db.require_user("idp|ada").unwrap().id, ada.id);
    }

    #[test]
    fn list_excludes_caller() {
        let db = db();
        let ada = user(&db, "ada");
        let bob = user(&db, "bob");
        let cy = user(&db, "cy");

        let others = db.list_users_except(ada.id).unwrap();
        let ids: Vec<_> = others.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![bob.id, cy.id]);
    }
}
