//! Augmenting Proxy (C11): generic forwarder for `app.bsky.*` XRPC calls,
//! with two response rewrites (`getProfile` label merge, `getPreferences`
//! birthdate injection).
//!
//! Grounded on `original_source/services/appview/src/proxy.py`'s header
//! allowlist and rewrite points; request/response plumbing follows the
//! teacher's plain-`reqwest::Client` style used throughout `poltr-pds`
//! rather than a generic reverse-proxy crate, since only two endpoints need
//! body rewriting and everything else is pass-through.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{error, warn};

use crate::state::AppState;

const REQUEST_HEADER_ALLOWLIST: &[&str] = &[
    "authorization",
    "accept",
    "accept-language",
    "content-type",
    "atproto-accept-labelers",
];
const RESPONSE_HEADER_ALLOWLIST: &[&str] = &["content-type", "atproto-repo-rev", "atproto-content-labelers"];

pub async fn proxy(
    State(state): State<AppState>,
    Path(nsid): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !nsid.starts_with("app.bsky.") {
        return (StatusCode::NOT_IMPLEMENTED, "MethodNotImplemented").into_response();
    }

    let mut url = format!("{}/xrpc/{nsid}", state.config.upstream_appview_url);
    if let Some(q) = &query {
        url.push('?');
        url.push_str(q);
    }

    let mut req = state.http.request(method.clone(), &url);
    for name in REQUEST_HEADER_ALLOWLIST {
        if let Some(v) = headers.get(*name) {
            req = req.header(*name, v.clone());
        }
    }
    if !body.is_empty() {
        req = req.body(body);
    }

    let upstream = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            error!(%nsid, error = %e, "proxy upstream request failed");
            return (StatusCode::BAD_GATEWAY, "pds_error").into_response();
        }
    };
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let upstream_headers = upstream.headers().clone();
    let upstream_bytes = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!(%nsid, error = %e, "failed to read upstream proxy body");
            return (StatusCode::BAD_GATEWAY, "pds_error").into_response();
        }
    };

    let body = match nsid.as_str() {
        "app.bsky.actor.getProfile" => rewrite_get_profile(&state, upstream_bytes.to_vec()).await,
        "app.bsky.actor.getPreferences" => rewrite_get_preferences(upstream_bytes.to_vec(), crate::config::DUMMY_BIRTHDATE),
        _ => upstream_bytes.to_vec(),
    };

    let mut response = Response::builder().status(status);
    for name in RESPONSE_HEADER_ALLOWLIST {
        if let Some(v) = upstream_headers.get(*name) {
            if let Ok(header_name) = HeaderName::try_from(*name) {
                if let Ok(header_value) = HeaderValue::from_bytes(v.as_bytes()) {
                    response = response.header(header_name, header_value);
                }
            }
        }
    }
    response.body(axum::body::Body::from(body)).unwrap().into_response()
}

/// Fetches the moderation service's per-DID labels and merges them into the
/// upstream `getProfile` response, keyed by `(src, val)` to avoid duplicates.
async fn rewrite_get_profile(state: &AppState, body: Vec<u8>) -> Vec<u8> {
    let Ok(mut profile) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    let Some(did) = profile.get("did").and_then(|v| v.as_str()).map(String::from) else {
        return serde_json::to_vec(&profile).unwrap_or(body);
    };

    let url = format!("{}/labels/{did}", state.config.moderation_url);
    let moderation_labels: Vec<Value> = match state.http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("labels").cloned())
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default(),
        Ok(resp) => {
            warn!(status = %resp.status(), %did, "moderation label fetch returned non-2xx");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, %did, "moderation label fetch failed");
            Vec::new()
        }
    };

    let mut existing: Vec<Value> = profile
        .get("labels")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    let key = |l: &Value| {
        (
            l.get("src").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            l.get("val").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        )
    };
    let mut seen: std::collections::HashSet<(String, String)> = existing.iter().map(key).collect();
    for label in moderation_labels {
        let k = key(&label);
        if seen.insert(k) {
            existing.push(label);
        }
    }

    if let Some(obj) = profile.as_object_mut() {
        obj.insert("labels".to_string(), Value::Array(existing));
    }
    serde_json::to_vec(&profile).unwrap_or(body)
}

/// Injects a `personalDetailsPref` with a fixed dummy birth date if the
/// upstream response has none, so age-gated upstream features accept the
/// caller.
fn rewrite_get_preferences(body: Vec<u8>, dummy_birthdate: &str) -> Vec<u8> {
    let Ok(mut parsed) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    let mut prefs: Vec<Value> = parsed
        .get("preferences")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    let has_birthdate = prefs.iter().any(|p| {
        p.get("$type").and_then(|t| t.as_str()) == Some("app.bsky.actor.defs#personalDetailsPref")
            && p.get("birthDate").is_some()
    });
    if !has_birthdate {
        prefs.push(serde_json::json!({
            "$type": "app.bsky.actor.defs#personalDetailsPref",
            "birthDate": dummy_birthdate,
        }));
    }

    if let Some(obj) = parsed.as_object_mut() {
        obj.insert("preferences".to_string(), Value::Array(prefs));
    }
    serde_json::to_vec(&parsed).unwrap_or(body)
}
