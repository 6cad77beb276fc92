//! `app.ch.poltr.review.*`: peer-review invitations and submissions.
//!
//! Submission guardrails per §4.9: a non-deleted invitation must exist for
//! `(argumentUri, reviewer_did)`, no prior non-deleted response may exist
//! for the same pair, and `REJECT` requires a non-empty justification. The
//! response record itself is written under the governance identity.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use poltr_db::models::Vote;
use poltr_pds::record_types;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::AuthUser;

pub async fn pending(State(state): State<AppState>, AuthUser(session): AuthUser) -> ApiResult<Json<Value>> {
    let invitations = state.db.list_pending_invitations_for_invitee(&session.did)?;
    Ok(Json(json!({ "invitations": invitations })))
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "argumentUri")]
    argument_uri: String,
    criteria: Value,
    vote: Vote,
    justification: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Json<Value>> {
    if !state.db.invitation_exists(&req.argument_uri, &session.did)? {
        return Err(ApiError::NotInvited);
    }
    if state.db.reviewer_has_responded(&req.argument_uri, &session.did)? {
        return Err(ApiError::AlreadyReviewed);
    }
    if req.vote == Vote::Reject && req.justification.as_deref().unwrap_or("").trim().is_empty() {
        return Err(ApiError::InvalidRequest("REJECT requires a non-empty justification".into()));
    }

    let criteria_json = req.criteria.to_string();
    let record = json!({
        "$type": record_types::REVIEW_RESPONSE,
        "argumentUri": req.argument_uri,
        "reviewerDid": session.did,
        "criteria": req.criteria,
        "vote": req.vote.as_str(),
        "justification": req.justification,
        "createdAt": Utc::now().to_rfc3339(),
    });
    let created = state.governance.create_record(record_types::REVIEW_RESPONSE, record).await?;

    state.db.insert_review_response(
        &created.uri,
        &req.argument_uri,
        &session.did,
        &criteria_json,
        req.vote,
        req.justification.as_deref(),
    )?;

    Ok(Json(json!({ "uri": created.uri })))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "argumentUri")]
    argument_uri: String,
}

pub async fn status(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(q): Query<StatusQuery>,
) -> ApiResult<Json<Value>> {
    let argument = state.db.find_argument(&q.argument_uri)?.ok_or(ApiError::NotFound)?;
    let responses = state.db.list_responses_for_argument(&q.argument_uri)?;
    let invitations = state.db.list_invitations_for_argument(&q.argument_uri)?;

    let approvals = responses.iter().filter(|r| r.vote == Vote::Approve).count();
    let rejections = responses.iter().filter(|r| r.vote == Vote::Reject).count();

    let is_author = auth.as_ref().is_some_and(|a| a.0.did == argument.did);
    let reviews = is_author.then(|| json!(responses));

    Ok(Json(json!({
        "argumentUri": q.argument_uri,
        "reviewStatus": argument.review_status.as_str(),
        "quorum": state.config.peer_review_quorum,
        "approvals": approvals,
        "rejections": rejections,
        "totalReviews": responses.len(),
        "invitationCount": invitations.len(),
        "reviews": reviews,
    })))
}
