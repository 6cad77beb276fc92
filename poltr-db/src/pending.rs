//! Queries over `pending_logins` and `pending_registrations`: the
//! magic-link token tables used by the Session Service during login and
//! registration respectively.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::models::{PendingLogin, PendingRegistration};
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    pub fn insert_pending_login(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_logins (email, token, expires_at) VALUES (?1, ?2, ?3)",
                params![email, token, to_rfc3339(expires_at)],
            )?;
            Ok(())
        })
    }

    pub fn find_pending_login(&self, token: &str) -> DbResult<Option<PendingLogin>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, token, expires_at FROM pending_logins WHERE token = ?1",
                params![token],
                |row| {
                    Ok(PendingLogin {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        token: row.get(2)?,
                        expires_at: parse_rfc3339(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn delete_pending_login(&self, token: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM pending_logins WHERE token = ?1", params![token])?;
            Ok(())
        })
    }

    pub fn upsert_pending_registration(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_registrations (email, token, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at",
                params![email, token, to_rfc3339(expires_at)],
            )?;
            Ok(())
        })
    }

    pub fn find_pending_registration(&self, token: &str) -> DbResult<Option<PendingRegistration>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT email, token, expires_at FROM pending_registrations WHERE token = ?1",
                params![token],
                |row| {
                    Ok(PendingRegistration {
                        email: row.get(0)?,
                        token: row.get(1)?,
                        expires_at: parse_rfc3339(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn delete_pending_registration(&self, email: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM pending_registrations WHERE email = ?1",
                params![email],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pending_login_round_trips_and_deletes() {
        let gw = Gateway::open_memory().unwrap();
        let now = Utc::now();
        gw.insert_pending_login("a@example.com", "tok-123", now + Duration::minutes(15))
            .unwrap();
        let found = gw.find_pending_login("tok-123").unwrap().unwrap();
        assert_eq!(found.email, "a@example.com");
        gw.delete_pending_login("tok-123").unwrap();
        assert!(gw.find_pending_login("tok-123").unwrap().is_none());
    }

    #[test]
    fn pending_registration_upsert_replaces_token() {
        let gw = Gateway::open_memory().unwrap();
        let now = Utc::now();
        gw.upsert_pending_registration("b@example.com", "tok-a", now + Duration::minutes(15))
            .unwrap();
        gw.upsert_pending_registration("b@example.com", "tok-b", now + Duration::minutes(15))
            .unwrap();
        assert!(gw.find_pending_registration("tok-a").unwrap().is_none());
        assert!(gw.find_pending_registration("tok-b").unwrap().is_some());
    }
}
