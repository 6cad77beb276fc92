//! Queries over the `likes` table.

use rusqlite::{params, OptionalExtension};

use crate::models::Like;
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    pub fn insert_like(&self, uri: &str, did: &str, subject_uri: &str, subject_cid: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO likes (uri, did, subject_uri, subject_cid, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![uri, did, subject_uri, subject_cid, to_rfc3339(chrono::Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn find_like(&self, uri: &str) -> DbResult<Option<Like>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT uri, did, subject_uri, subject_cid, bsky_like_uri, deleted, created_at
                 FROM likes WHERE uri = ?1",
                params![uri],
                row_to_like,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn find_like_by_did_and_subject(&self, did: &str, subject_uri: &str) -> DbResult<Option<Like>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT uri, did, subject_uri, subject_cid, bsky_like_uri, deleted, created_at
                 FROM likes WHERE did = ?1 AND subject_uri = ?2 AND deleted = 0",
                params![did, subject_uri],
                row_to_like,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn mark_like_deleted(&self, uri: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE likes SET deleted = 1 WHERE uri = ?1", params![uri])?;
            Ok(())
        })
    }

    pub fn set_like_bsky_uri(&self, uri: &str, bsky_like_uri: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE likes SET bsky_like_uri = ?1 WHERE uri = ?2",
                params![bsky_like_uri, uri],
            )?;
            Ok(())
        })
    }

    pub fn count_likes_for_subject(&self, subject_uri: &str) -> DbResult<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE subject_uri = ?1 AND deleted = 0",
                params![subject_uri],
                |row| row.get(0),
            )
            .map_err(DbError::from)
        })
    }
}

fn row_to_like(row: &rusqlite::Row<'_>) -> rusqlite::Result<Like> {
    Ok(Like {
        uri: row.get(0)?,
        did: row.get(1)?,
        subject_uri: row.get(2)?,
        subject_cid: row.get(3)?,
        bsky_like_uri: row.get(4)?,
        deleted: row.get::<_, i64>(5)? != 0,
        created_at: parse_rfc3339(&row.get::<_, String>(6)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_and_count() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_like("at://a/like/1", "did:plc:a", "at://b/ballot/1", "bafycid")
            .unwrap();
        assert_eq!(gw.count_likes_for_subject("at://b/ballot/1").unwrap(), 1);
        let like = gw.find_like_by_did_and_subject("did:plc:a", "at://b/ballot/1").unwrap().unwrap();
        assert_eq!(like.uri, "at://a/like/1");
        gw.mark_like_deleted("at://a/like/1").unwrap();
        assert_eq!(gw.count_likes_for_subject("at://b/ballot/1").unwrap(), 0);
    }
}
