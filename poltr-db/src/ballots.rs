//! Queries over the `ballots` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::models::Ballot;
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_ballot(
        &self,
        uri: &str,
        rkey: &str,
        did: &str,
        cid: &str,
        title: Option<&str>,
        description: Option<&str>,
        vote_date: Option<DateTime<Utc>>,
        record_json: &str,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ballots
                    (uri, rkey, did, cid, title, description, vote_date, created_at, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(uri) DO UPDATE SET
                    cid = excluded.cid,
                    title = excluded.title,
                    description = excluded.description,
                    vote_date = excluded.vote_date,
                    record_json = excluded.record_json",
                params![
                    uri,
                    rkey,
                    did,
                    cid,
                    title,
                    description,
                    vote_date.map(to_rfc3339),
                    to_rfc3339(Utc::now()),
                    record_json,
                ],
            )?;
            Ok(())
        })
    }

    pub fn find_ballot(&self, uri: &str) -> DbResult<Option<Ballot>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT uri, rkey, did, cid, title, description, vote_date, created_at, deleted,
                        like_count, reply_count, bookmark_count, record_json, bsky_post_uri, bsky_post_cid
                 FROM ballots WHERE uri = ?1",
                params![uri],
                row_to_ballot,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn find_ballot_by_rkey(&self, rkey: &str) -> DbResult<Option<Ballot>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT uri, rkey, did, cid, title, description, vote_date, created_at, deleted,
                        like_count, reply_count, bookmark_count, record_json, bsky_post_uri, bsky_post_cid
                 FROM ballots WHERE rkey = ?1 AND deleted = 0",
                params![rkey],
                row_to_ballot,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn list_ballots(&self, include_deleted: bool) -> DbResult<Vec<Ballot>> {
        self.with_conn(|conn| {
            let sql = if include_deleted {
                "SELECT uri, rkey, did, cid, title, description, vote_date, created_at, deleted,
                        like_count, reply_count, bookmark_count, record_json, bsky_post_uri, bsky_post_cid
                 FROM ballots ORDER BY created_at DESC"
            } else {
                "SELECT uri, rkey, did, cid, title, description, vote_date, created_at, deleted,
                        like_count, reply_count, bookmark_count, record_json, bsky_post_uri, bsky_post_cid
                 FROM ballots WHERE deleted = 0 ORDER BY created_at DESC"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], row_to_ballot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_ballot_deleted(&self, uri: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE ballots SET deleted = 1 WHERE uri = ?1", params![uri])?;
            Ok(())
        })
    }

    pub fn set_ballot_crosspost(&self, uri: &str, post_uri: &str, post_cid: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE ballots SET bsky_post_uri = ?1, bsky_post_cid = ?2 WHERE uri = ?3",
                params![post_uri, post_cid, uri],
            )?;
            Ok(())
        })
    }

    /// Ballots awaiting cross-post: not deleted, not yet posted upstream.
    /// Grounded on `crosspost.py`'s `WHERE bsky_post_uri IS NULL AND deleted = false`.
    pub fn list_ballots_pending_crosspost(&self) -> DbResult<Vec<Ballot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uri, rkey, did, cid, title, description, vote_date, created_at, deleted,
                        like_count, reply_count, bookmark_count, record_json, bsky_post_uri, bsky_post_cid
                 FROM ballots WHERE deleted = 0 AND bsky_post_uri IS NULL
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([], row_to_ballot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn increment_ballot_like_count(&self, uri: &str, delta: i64) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE ballots SET like_count = like_count + ?1 WHERE uri = ?2",
                params![delta, uri],
            )?;
            Ok(())
        })
    }
}

fn row_to_ballot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ballot> {
    Ok(Ballot {
        uri: row.get(0)?,
        rkey: row.get(1)?,
        did: row.get(2)?,
        cid: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        vote_date: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_rfc3339(&s)),
        created_at: parse_rfc3339(&row.get::<_, String>(7)?),
        deleted: row.get::<_, i64>(8)? != 0,
        like_count: row.get(9)?,
        reply_count: row.get(10)?,
        bookmark_count: row.get(11)?,
        record_json: row.get(12)?,
        bsky_post_uri: row.get(13)?,
        bsky_post_cid: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_find() {
        let gw = Gateway::open_memory().unwrap();
        gw.upsert_ballot(
            "at://did:plc:a/ch.poltr.ballot/1",
            "1",
            "did:plc:a",
            "bafy1",
            Some("Title"),
            None,
            None,
            "{}",
        )
        .unwrap();
        let b = gw.find_ballot("at://did:plc:a/ch.poltr.ballot/1").unwrap().unwrap();
        assert_eq!(b.title.as_deref(), Some("Title"));
        assert!(!b.deleted);
        assert!(b.bsky_post_uri.is_none());
    }

    #[test]
    fn find_by_rkey_excludes_deleted() {
        let gw = Gateway::open_memory().unwrap();
        gw.upsert_ballot("at://a/ballot/1", "rkey1", "did:plc:a", "c1", None, None, None, "{}")
            .unwrap();
        assert!(gw.find_ballot_by_rkey("rkey1").unwrap().is_some());
        gw.mark_ballot_deleted("at://a/ballot/1").unwrap();
        assert!(gw.find_ballot_by_rkey("rkey1").unwrap().is_none());
    }

    #[test]
    fn pending_crosspost_excludes_posted_and_deleted() {
        let gw = Gateway::open_memory().unwrap();
        gw.upsert_ballot("at://a/1", "1", "did:plc:a", "c1", None, None, None, "{}")
            .unwrap();
        gw.upsert_ballot("at://a/2", "2", "did:plc:a", "c2", None, None, None, "{}")
            .unwrap();
        gw.set_ballot_crosspost("at://a/2", "at://bsky/post/2", "bskycid").unwrap();
        gw.upsert_ballot("at://a/3", "3", "did:plc:a", "c3", None, None, None, "{}")
            .unwrap();
        gw.mark_ballot_deleted("at://a/3").unwrap();

        let pending = gw.list_ballots_pending_crosspost().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].uri, "at://a/1");
    }
}
