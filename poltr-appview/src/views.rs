//! Canonical JSON serialization of DB rows into the shape described in
//! §4.10: `uri, cid, author{…}, record{…}, indexedAt, likeCount,
//! replyCount, bookmarkCount, labels, viewer{like?}`.
//!
//! Grounded on `original_source/services/appview/src/views.py`'s
//! row-to-view mapping; kept as a thin function layer over the typed rows
//! in `poltr_db::models` rather than implementing `Serialize` directly on
//! those rows, since the wire shape (author lookups, viewer-scoped fields)
//! depends on more than the row itself.

use poltr_db::models::{Argument, Ballot};
use poltr_db::Gateway;
use serde_json::{json, Value};

fn author_view(db: &Gateway, did: &str) -> Value {
    match db.find_credential_by_did(did) {
        Ok(Some(cred)) => json!({
            "did": cred.did,
            "handle": cred.handle,
            "labels": [],
        }),
        _ => json!({
            "did": did,
            "handle": did,
            "labels": [],
        }),
    }
}

fn viewer_like(db: &Gateway, subject_uri: &str, viewer_did: Option<&str>) -> Option<Value> {
    let did = viewer_did?;
    let like = db.find_like_by_did_and_subject(did, subject_uri).ok().flatten()?;
    Some(json!({ "like": like.uri }))
}

pub fn ballot_view(db: &Gateway, ballot: &Ballot, viewer_did: Option<&str>) -> Value {
    let record: Value = ballot
        .record_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| {
            json!({
                "title": ballot.title,
                "description": ballot.description,
                "voteDate": ballot.vote_date.map(|d| d.to_rfc3339()),
            })
        });

    json!({
        "uri": ballot.uri,
        "cid": ballot.cid,
        "author": author_view(db, &ballot.did),
        "record": record,
        "indexedAt": ballot.created_at.to_rfc3339(),
        "likeCount": ballot.like_count,
        "replyCount": ballot.reply_count,
        "bookmarkCount": ballot.bookmark_count,
        "labels": [],
        "viewer": viewer_like(db, &ballot.uri, viewer_did).unwrap_or_else(|| json!({})),
    })
}

pub fn argument_view(db: &Gateway, argument: &Argument, viewer_did: Option<&str>) -> Value {
    json!({
        "uri": argument.uri,
        "cid": argument.cid,
        "author": author_view(db, &argument.did),
        "record": {
            "ballotUri": argument.ballot_uri,
            "title": argument.title,
            "body": argument.body,
            "type": argument.argument_type.as_str(),
            "reviewStatus": argument.review_status.as_str(),
        },
        "indexedAt": argument.indexed_at.unwrap_or(argument.created_at).to_rfc3339(),
        "likeCount": argument.like_count,
        "replyCount": argument.comment_count,
        "bookmarkCount": 0,
        "labels": [],
        "viewer": viewer_like(db, &argument.uri, viewer_did).unwrap_or_else(|| json!({})),
    })
}
