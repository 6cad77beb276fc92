//! `app.ch.poltr.content.rating` / `.unrating`: likes, plus the cross-like
//! mirror onto a ballot's upstream post.
//!
//! Grounded on §4.10's cross-like description: after writing the
//! platform-native like, look up the ballot's upstream mirror and, if
//! present, write a second like referencing it, pre-seeding a synthetic
//! `pending:<did>:<ballot_uri>` row that a later unlike can find.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use poltr_pds::record_types;

use crate::error::{ApiError, ApiResult};
use crate::session::with_refresh;
use crate::state::AppState;

use super::AuthUser;

fn rkey_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn pending_uri(did: &str, ballot_uri: &str) -> String {
    format!("pending:{did}:{ballot_uri}")
}

#[derive(Deserialize)]
pub struct Subject {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
pub struct RatingRequest {
    subject: Subject,
    preference: Option<String>,
}

pub async fn rating(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(req): Json<RatingRequest>,
) -> ApiResult<Json<Value>> {
    let mut record = json!({
        "$type": record_types::LIKE,
        "subject": { "uri": req.subject.uri, "cid": req.subject.cid },
        "createdAt": Utc::now().to_rfc3339(),
    });
    if let Some(pref) = &req.preference {
        record["preference"] = json!(pref);
    }

    let created = with_refresh(&state.db, &state.user_session, &session, {
        let user_session = state.user_session.clone();
        let did = session.did.clone();
        let record = record.clone();
        move |token| {
            let user_session = user_session.clone();
            let did = did.clone();
            let record = record.clone();
            async move { user_session.create_record(&token, &did, record_types::LIKE, record).await }
        }
    })
    .await?;

    state.db.insert_like(&created.uri, &session.did, &req.subject.uri, &req.subject.cid)?;

    if let Some(ballot) = state.db.find_ballot(&req.subject.uri)? {
        if let (Some(post_uri), Some(post_cid)) = (ballot.bsky_post_uri.clone(), ballot.bsky_post_cid.clone()) {
            let upstream_record = json!({
                "$type": record_types::BSKY_LIKE,
                "subject": { "uri": post_uri, "cid": post_cid },
                "createdAt": Utc::now().to_rfc3339(),
            });
            match with_refresh(&state.db, &state.user_session, &session, {
                let user_session = state.user_session.clone();
                let did = session.did.clone();
                let record = upstream_record.clone();
                move |token| {
                    let user_session = user_session.clone();
                    let did = did.clone();
                    let record = record.clone();
                    async move { user_session.create_record(&token, &did, record_types::BSKY_LIKE, record).await }
                }
            })
            .await
            {
                Ok(upstream_created) => {
                    let pending = pending_uri(&session.did, &ballot.uri);
                    state.db.insert_like(&pending, &session.did, &ballot.uri, &ballot.cid)?;
                    state.db.set_like_bsky_uri(&pending, &upstream_created.uri)?;
                    state.db.increment_ballot_like_count(&ballot.uri, 1)?;
                }
                Err(e) => warn!(uri = %ballot.uri, error = %e, "cross-like upstream write failed"),
            }
        }
    }

    Ok(Json(json!({ "uri": created.uri, "cid": created.cid })))
}

#[derive(Deserialize)]
pub struct UnratingRequest {
    #[serde(rename = "likeUri")]
    like_uri: String,
}

pub async fn unrating(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(req): Json<UnratingRequest>,
) -> ApiResult<Json<Value>> {
    let Some(like) = state.db.find_like(&req.like_uri)? else {
        return Ok(Json(json!({ "success": true })));
    };
    if like.did != session.did {
        return Err(ApiError::InvalidRequest("like does not belong to caller".into()));
    }

    with_refresh(&state.db, &state.user_session, &session, {
        let user_session = state.user_session.clone();
        let did = session.did.clone();
        let rkey = rkey_from_uri(&req.like_uri).to_string();
        move |token| {
            let user_session = user_session.clone();
            let did = did.clone();
            let rkey = rkey.clone();
            async move { user_session.delete_record(&token, &did, record_types::LIKE, &rkey).await }
        }
    })
    .await?;
    state.db.mark_like_deleted(&req.like_uri)?;

    let pending = pending_uri(&session.did, &like.subject_uri);
    if let Some(pending_like) = state.db.find_like(&pending)? {
        if let Some(bsky_like_uri) = pending_like.bsky_like_uri.clone() {
            match with_refresh(&state.db, &state.user_session, &session, {
                let user_session = state.user_session.clone();
                let did = session.did.clone();
                let rkey = rkey_from_uri(&bsky_like_uri).to_string();
                move |token| {
                    let user_session = user_session.clone();
                    let did = did.clone();
                    let rkey = rkey.clone();
                    async move { user_session.delete_record(&token, &did, record_types::BSKY_LIKE, &rkey).await }
                }
            })
            .await
            {
                Ok(()) => {
                    state.db.mark_like_deleted(&pending)?;
                    state.db.increment_ballot_like_count(&like.subject_uri, -1)?;
                }
                Err(e) => warn!(uri = %like.subject_uri, error = %e, "cross-like upstream delete failed"),
            }
        }
    }

    Ok(Json(json!({ "success": true })))
}
