//! `app.bsky.feed.describeFeedGenerator` / `.getFeedSkeleton`.
//!
//! Grounded on §6's cursor format `<iso>::<rkey>`: ballots mirrored
//! upstream, newest first, paginated by `(created_at, rkey)`.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

const FEED_RKEY: &str = "poltr-ballots";
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

pub async fn describe_feed_generator(State(state): State<AppState>) -> Json<Value> {
    let did = state.config.feed_generator_did.clone();
    let feed_uri = format!("at://{did}/app.bsky.feed.generator/{FEED_RKEY}");
    Json(json!({ "did": did, "feeds": [{ "uri": feed_uri }] }))
}

#[derive(Deserialize)]
pub struct SkeletonQuery {
    #[allow(dead_code)]
    feed: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

fn decode_cursor(cursor: &str) -> Option<(DateTime<Utc>, String)> {
    let (iso, rkey) = cursor.split_once("::")?;
    let ts = DateTime::parse_from_rfc3339(iso).ok()?.with_timezone(&Utc);
    Some((ts, rkey.to_string()))
}

fn encode_cursor(ts: DateTime<Utc>, rkey: &str) -> String {
    format!("{}::{rkey}", ts.to_rfc3339())
}

pub async fn get_feed_skeleton(
    State(state): State<AppState>,
    Query(q): Query<SkeletonQuery>,
) -> crate::error::ApiResult<Json<Value>> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let mut ballots = state.db.list_ballots(false)?;
    ballots.retain(|b| b.bsky_post_uri.is_some());
    ballots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.rkey.cmp(&a.rkey)));

    if let Some((cursor_ts, cursor_rkey)) = q.cursor.as_deref().and_then(decode_cursor) {
        ballots.retain(|b| (b.created_at, b.rkey.clone()) < (cursor_ts, cursor_rkey.clone()));
    }
    ballots.truncate(limit);

    let next_cursor = ballots.last().map(|b| encode_cursor(b.created_at, &b.rkey));
    let feed: Vec<Value> = ballots
        .iter()
        .map(|b| json!({ "post": b.bsky_post_uri.clone().unwrap_or_default() }))
        .collect();

    Ok(Json(json!({ "feed": feed, "cursor": next_cursor })))
}
