//! `app.ch.poltr.ballot.*`

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::ballot_view;

use super::AuthUser;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let viewer_did = auth.as_ref().map(|a| a.0.did.as_str());
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let mut ballots = state.db.list_ballots(false)?;
    if let Some(since) = q.since {
        ballots.retain(|b| b.created_at >= since);
    }
    ballots.truncate(limit);

    let cursor = ballots.last().map(|b| b.created_at.to_rfc3339());
    let views: Vec<Value> = ballots.iter().map(|b| ballot_view(&state.db, b, viewer_did)).collect();
    Ok(Json(json!({ "cursor": cursor, "ballots": views })))
}

#[derive(Deserialize)]
pub struct GetQuery {
    rkey: String,
}

pub async fn get(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(q): Query<GetQuery>,
) -> ApiResult<Json<Value>> {
    let viewer_did = auth.as_ref().map(|a| a.0.did.as_str());
    let ballot = state.db.find_ballot_by_rkey(&q.rkey)?.ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "ballot": ballot_view(&state.db, &ballot, viewer_did) })))
}
