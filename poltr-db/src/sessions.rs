//! Queries over the `sessions` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::models::Session;
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_session(
        &self,
        session_token: &str,
        did: &str,
        user_json: &str,
        expires_at: DateTime<Utc>,
        access_token: &str,
        refresh_token: &str,
    ) -> DbResult<()> {
        let now = to_rfc3339(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions
                    (session_token, did, user_json, expires_at, last_accessed_at, access_token, refresh_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_token,
                    did,
                    user_json,
                    to_rfc3339(expires_at),
                    now,
                    access_token,
                    refresh_token,
                ],
            )?;
            Ok(())
        })
    }

    pub fn find_session(&self, session_token: &str) -> DbResult<Option<Session>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT session_token, did, user_json, expires_at, last_accessed_at, access_token, refresh_token
                 FROM sessions WHERE session_token = ?1",
                params![session_token],
                row_to_session,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn touch_session(&self, session_token: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET last_accessed_at = ?1 WHERE session_token = ?2",
                params![to_rfc3339(Utc::now()), session_token],
            )?;
            Ok(())
        })
    }

    pub fn update_session_tokens(
        &self,
        session_token: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET access_token = ?1, refresh_token = ?2 WHERE session_token = ?3",
                params![access_token, refresh_token, session_token],
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, session_token: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE session_token = ?1",
                params![session_token],
            )?;
            Ok(())
        })
    }

    /// All sessions that have not yet expired, for the peer-review worker's
    /// "active user" eligibility pool.
    pub fn list_active_sessions(&self, now: DateTime<Utc>) -> DbResult<Vec<Session>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_token, did, user_json, expires_at, last_accessed_at, access_token, refresh_token
                 FROM sessions WHERE expires_at > ?1",
            )?;
            let rows = stmt
                .query_map(params![to_rfc3339(now)], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_token: row.get(0)?,
        did: row.get(1)?,
        user_json: row.get(2)?,
        expires_at: parse_rfc3339(&row.get::<_, String>(3)?),
        last_accessed_at: parse_rfc3339(&row.get::<_, String>(4)?),
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn insert_find_and_expiry() {
        let gw = Gateway::open_memory().unwrap();
        let now = Utc::now();
        gw.insert_session("tok1", "did:plc:a", "{}", now + Duration::days(7), "acc", "ref")
            .unwrap();
        let s = gw.find_session("tok1").unwrap().unwrap();
        assert!(!s.is_expired(now));
        assert!(s.is_expired(now + Duration::days(8)));
    }

    #[test]
    fn active_sessions_excludes_expired() {
        let gw = Gateway::open_memory().unwrap();
        let now = Utc::now();
        gw.insert_session("live", "did:plc:a", "{}", now + Duration::days(1), "a", "r")
            .unwrap();
        gw.insert_session("dead", "did:plc:b", "{}", now - Duration::days(1), "a", "r")
            .unwrap();
        let active = gw.list_active_sessions(now).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_token, "live");
    }

    #[test]
    fn refresh_updates_tokens() {
        let gw = Gateway::open_memory().unwrap();
        let now = Utc::now();
        gw.insert_session("tok1", "did:plc:a", "{}", now + Duration::days(7), "old-a", "old-r")
            .unwrap();
        gw.update_session_tokens("tok1", "new-a", "new-r").unwrap();
        let s = gw.find_session("tok1").unwrap().unwrap();
        assert_eq!(s.access_token, "new-a");
        assert_eq!(s.refresh_token, "new-r");
    }
}
