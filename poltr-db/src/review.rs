//! Queries over `review_invitations` and `review_responses`: the quorum
//! mechanics of the peer-review worker.

use rusqlite::{params, OptionalExtension};

use crate::models::{ReviewInvitation, ReviewResponse, Vote};
use crate::{parse_rfc3339, to_rfc3339, DbError, DbResult, Gateway};

impl Gateway {
    pub fn insert_review_invitation(&self, uri: &str, argument_uri: &str, invitee_did: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO review_invitations (uri, argument_uri, invitee_did, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![uri, argument_uri, invitee_did, to_rfc3339(chrono::Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn list_invitations_for_argument(&self, argument_uri: &str) -> DbResult<Vec<ReviewInvitation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uri, argument_uri, invitee_did, created_at, deleted
                 FROM review_invitations WHERE argument_uri = ?1 AND deleted = 0",
            )?;
            let rows = stmt
                .query_map(params![argument_uri], |row| {
                    Ok(ReviewInvitation {
                        uri: row.get(0)?,
                        argument_uri: row.get(1)?,
                        invitee_did: row.get(2)?,
                        created_at: parse_rfc3339(&row.get::<_, String>(3)?),
                        deleted: row.get::<_, i64>(4)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Invitations for `invitee_did` that are still open: not deleted and
    /// not yet answered by a non-deleted response from the same reviewer.
    pub fn list_pending_invitations_for_invitee(&self, invitee_did: &str) -> DbResult<Vec<ReviewInvitation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uri, argument_uri, invitee_did, created_at, deleted
                 FROM review_invitations
                 WHERE invitee_did = ?1 AND deleted = 0
                   AND NOT EXISTS (
                       SELECT 1 FROM review_responses
                       WHERE review_responses.argument_uri = review_invitations.argument_uri
                         AND review_responses.reviewer_did = review_invitations.invitee_did
                         AND review_responses.deleted = 0
                   )
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![invitee_did], |row| {
                    Ok(ReviewInvitation {
                        uri: row.get(0)?,
                        argument_uri: row.get(1)?,
                        invitee_did: row.get(2)?,
                        created_at: parse_rfc3339(&row.get::<_, String>(3)?),
                        deleted: row.get::<_, i64>(4)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn invitation_exists(&self, argument_uri: &str, invitee_did: &str) -> DbResult<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM review_invitations
                 WHERE argument_uri = ?1 AND invitee_did = ?2 AND deleted = 0",
                params![argument_uri, invitee_did],
                |_| Ok(()),
            )
            .optional()
            .map(|opt| opt.is_some())
            .map_err(DbError::from)
        })
    }

    pub fn insert_review_response(
        &self,
        uri: &str,
        argument_uri: &str,
        reviewer_did: &str,
        criteria_json: &str,
        vote: Vote,
        justification: Option<&str>,
    ) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO review_responses
                    (uri, argument_uri, reviewer_did, criteria_json, vote, justification, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    uri,
                    argument_uri,
                    reviewer_did,
                    criteria_json,
                    vote.as_str(),
                    justification,
                    to_rfc3339(chrono::Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_responses_for_argument(&self, argument_uri: &str) -> DbResult<Vec<ReviewResponse>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uri, argument_uri, reviewer_did, criteria_json, vote, justification, created_at, deleted
                 FROM review_responses WHERE argument_uri = ?1 AND deleted = 0",
            )?;
            let rows = stmt
                .query_map(params![argument_uri], |row| {
                    let vote_str: String = row.get(4)?;
                    Ok(ReviewResponse {
                        uri: row.get(0)?,
                        argument_uri: row.get(1)?,
                        reviewer_did: row.get(2)?,
                        criteria_json: row.get(3)?,
                        vote: Vote::parse(&vote_str).unwrap_or(Vote::Reject),
                        justification: row.get(5)?,
                        created_at: parse_rfc3339(&row.get::<_, String>(6)?),
                        deleted: row.get::<_, i64>(7)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn reviewer_has_responded(&self, argument_uri: &str, reviewer_did: &str) -> DbResult<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM review_responses
                 WHERE argument_uri = ?1 AND reviewer_did = ?2 AND deleted = 0",
                params![argument_uri, reviewer_did],
                |_| Ok(()),
            )
            .optional()
            .map(|opt| opt.is_some())
            .map_err(DbError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_dedup_check() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_review_invitation("at://a/invite/1", "at://a/argument/1", "did:plc:reviewer")
            .unwrap();
        assert!(gw.invitation_exists("at://a/argument/1", "did:plc:reviewer").unwrap());
        assert!(!gw.invitation_exists("at://a/argument/1", "did:plc:other").unwrap());
    }

    #[test]
    fn pending_invitations_excludes_already_responded() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_review_invitation("at://a/invite/1", "at://a/argument/1", "did:plc:r1")
            .unwrap();
        gw.insert_review_invitation("at://a/invite/2", "at://a/argument/2", "did:plc:r1")
            .unwrap();
        gw.insert_review_response(
            "at://a/response/1",
            "at://a/argument/1",
            "did:plc:r1",
            "{}",
            Vote::Approve,
            None,
        )
        .unwrap();
        let pending = gw.list_pending_invitations_for_invitee("did:plc:r1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].argument_uri, "at://a/argument/2");
    }

    #[test]
    fn responses_and_quorum_tally() {
        let gw = Gateway::open_memory().unwrap();
        gw.insert_review_response(
            "at://a/response/1",
            "at://a/argument/1",
            "did:plc:r1",
            "{}",
            Vote::Approve,
            None,
        )
        .unwrap();
        gw.insert_review_response(
            "at://a/response/2",
            "at://a/argument/1",
            "did:plc:r2",
            "{}",
            Vote::Reject,
            Some("too vague"),
        )
        .unwrap();
        let responses = gw.list_responses_for_argument("at://a/argument/1").unwrap();
        assert_eq!(responses.len(), 2);
        assert!(gw.reviewer_has_responded("at://a/argument/1", "did:plc:r1").unwrap());
        assert!(!gw.reviewer_has_responded("at://a/argument/1", "did:plc:r3").unwrap());
    }
}
