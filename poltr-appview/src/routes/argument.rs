//! `app.ch.poltr.argument.*`

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views::argument_view;

use super::AuthUser;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    ballot_rkey: String,
    limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let viewer_did = auth.as_ref().map(|a| a.0.did.as_str());
    let ballot = state
        .db
        .find_ballot_by_rkey(&q.ballot_rkey)?
        .ok_or(ApiError::NotFound)?;

    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let mut arguments = state.db.list_arguments_for_ballot(&ballot.uri)?;
    arguments.truncate(limit);

    let views: Vec<Value> = arguments.iter().map(|a| argument_view(&state.db, a, viewer_did)).collect();
    Ok(Json(json!({ "arguments": views })))
}
