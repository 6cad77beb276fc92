//! Queries over the `arguments` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::models::{Argument, ArgumentType, ReviewStatus};
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_argument(
        &self,
        uri: &str,
        ballot_uri: &str,
        ballot_rkey: &str,
        did: &str,
        cid: &str,
        title: Option<&str>,
        body: Option<&str>,
        argument_type: ArgumentType,
        record_json: Option<&str>,
    ) -> DbResult<()> {
        let _ = record_json;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO arguments
                    (uri, ballot_uri, ballot_rkey, did, cid, title, body, type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(uri) DO UPDATE SET
                    cid = excluded.cid, title = excluded.title, body = excluded.body",
                params![
                    uri,
                    ballot_uri,
                    ballot_rkey,
                    did,
                    cid,
                    title,
                    body,
                    argument_type.as_str(),
                    to_rfc3339(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn find_argument(&self, uri: &str) -> DbResult<Option<Argument>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_ARGUMENT} WHERE uri = ?1"),
                params![uri],
                row_to_argument,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn list_arguments_for_ballot(&self, ballot_uri: &str) -> DbResult<Vec<Argument>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ARGUMENT} WHERE ballot_uri = ?1 AND deleted = 0 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map(params![ballot_uri], row_to_argument)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_review_status(&self, uri: &str, status: ReviewStatus) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE arguments SET review_status = ?1, indexed_at = ?2 WHERE uri = ?3",
                params![status.as_str(), to_rfc3339(Utc::now()), uri],
            )?;
            Ok(())
        })
    }

    pub fn set_argument_governance_uri(&self, uri: &str, governance_uri: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE arguments SET governance_uri = ?1 WHERE uri = ?2",
                params![governance_uri, uri],
            )?;
            Ok(())
        })
    }

    pub fn set_argument_crosspost(&self, uri: &str, post_uri: &str, post_cid: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE arguments SET bsky_post_uri = ?1, bsky_post_cid = ?2 WHERE uri = ?3",
                params![post_uri, post_cid, uri],
            )?;
            Ok(())
        })
    }

    pub fn mark_argument_deleted(&self, uri: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE arguments SET deleted = 1 WHERE uri = ?1", params![uri])?;
            Ok(())
        })
    }

    /// Arguments awaiting cross-post. Grounded on `crosspost.py`.
    pub fn list_arguments_pending_crosspost(&self) -> DbResult<Vec<Argument>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ARGUMENT} WHERE deleted = 0 AND bsky_post_uri IS NULL ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_argument)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Preliminary arguments still needing review invitations, and approved
    /// arguments not yet materialized into a governance copy. Grounded on
    /// `peer_review.py`'s two worker queries.
    pub fn list_preliminary_arguments(&self) -> DbResult<Vec<Argument>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ARGUMENT} WHERE deleted = 0 AND review_status = 'preliminary' ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_argument)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_approved_without_governance_copy(&self) -> DbResult<Vec<Argument>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ARGUMENT} WHERE deleted = 0 AND review_status = 'approved' AND governance_uri IS NULL
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_argument)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const SELECT_ARGUMENT: &str = "SELECT uri, ballot_uri, ballot_rkey, did, cid, title, body, type,
    review_status, original_uri, governance_uri, bsky_post_uri, bsky_post_cid, deleted,
    created_at, indexed_at, like_count, comment_count FROM arguments";

fn row_to_argument(row: &rusqlite::Row<'_>) -> rusqlite::Result<Argument> {
    let type_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    Ok(Argument {
        uri: row.get(0)?,
        ballot_uri: row.get(1)?,
        ballot_rkey: row.get(2)?,
        did: row.get(3)?,
        cid: row.get(4)?,
        title: row.get(5)?,
        body: row.get(6)?,
        argument_type: ArgumentType::parse(&type_str).unwrap_or(ArgumentType::Pro),
        review_status: ReviewStatus::parse(&status_str).unwrap_or(ReviewStatus::Preliminary),
        original_uri: row.get(9)?,
        governance_uri: row.get(10)?,
        bsky_post_uri: row.get(11)?,
        bsky_post_cid: row.get(12)?,
        deleted: row.get::<_, i64>(13)? != 0,
        created_at: parse_rfc3339(&row.get::<_, String>(14)?),
        indexed_at: row
            .get::<_, Option<String>>(15)?
            .map(|s| parse_rfc3339(&s)),
        like_count: row.get(16)?,
        comment_count: row.get(17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_find_defaults_preliminary() {
        let gw = Gateway::open_memory().unwrap();
        gw.upsert_ballot("at://a/ballot/1", "1", "did:plc:a", "c1", None, None, None, "{}")
            .unwrap();
        gw.upsert_argument(
            "at://a/argument/1",
            "at://a/ballot/1",
            "1",
            "did:plc:a",
            "argcid",
            Some("Pro point"),
            Some("body"),
            ArgumentType::Pro,
            None,
        )
        .unwrap();
        let arg = gw.find_argument("at://a/argument/1").unwrap().unwrap();
        assert_eq!(arg.review_status, ReviewStatus::Preliminary);
        assert_eq!(arg.argument_type, ArgumentType::Pro);
    }

    #[test]
    fn review_status_transitions_and_filters() {
        let gw = Gateway::open_memory().unwrap();
        gw.upsert_ballot("at://a/ballot/1", "1", "did:plc:a", "c1", None, None, None, "{}")
            .unwrap();
        gw.upsert_argument(
            "at://a/argument/1",
            "at://a/ballot/1",
            "1",
            "did:plc:a",
            "argcid",
            None,
            None,
            ArgumentType::Contra,
            None,
        )
        .unwrap();
        assert_eq!(gw.list_preliminary_arguments().unwrap().len(), 1);
        gw.set_review_status("at://a/argument/1", ReviewStatus::Approved).unwrap();
        assert_eq!(gw.list_preliminary_arguments().unwrap().len(), 0);
        assert_eq!(gw.list_approved_without_governance_copy().unwrap().len(), 1);
        gw.set_argument_governance_uri("at://a/argument/1", "at://gov/argument/1").unwrap();
        assert_eq!(gw.list_approved_without_governance_copy().unwrap().len(), 0);
    }
}
