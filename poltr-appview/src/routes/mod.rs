//! XRPC Frontend (C10): HTTP router, session authentication, and JSON
//! views over C2.
//!
//! Grounded on `freeq-server::web::router`'s `Router::new().route(...)`
//! chain plus `CorsLayer`; the session extractor generalizes the
//! teacher's connection-upgrade auth check into an axum
//! `FromRequestParts` impl shared by every authenticated route.

pub mod argument;
pub mod auth;
pub mod ballot;
pub mod content;
pub mod feed;
pub mod review;

use std::net::IpAddr;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated request's validated session row.
pub struct AuthUser(pub poltr_db::models::Session);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(ApiError::InvalidToken)?;
        let session = crate::session::validate(state.db.as_ref(), &token)?;
        Ok(AuthUser(session))
    }
}

fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(auth) = parts.headers.get(AUTHORIZATION) {
        if let Ok(s) = auth.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    let cookie_header = parts.headers.get(COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session_token").then(|| value.to_string())
    })
}

/// `Set-Cookie` value for a freshly issued session, per §6: http-only,
/// `SameSite=Lax`, `Secure` in production, 7-day max-age.
pub fn session_cookie(token: &str, production: bool) -> String {
    let secure = if production { "; Secure" } else { "" };
    format!("session_token={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800{secure}")
}

pub(crate) fn client_ip(addr: std::net::SocketAddr) -> IpAddr {
    addr.ip()
}

pub(crate) fn rate_limit(
    limiter: &governor::RateLimiter<
        IpAddr,
        governor::state::keyed::DefaultKeyedStateStore<IpAddr>,
        governor::clock::DefaultClock,
    >,
    ip: IpAddr,
) -> Result<(), ApiError> {
    limiter.check_key(&ip).map_err(|_| ApiError::RateLimited)
}

pub fn router(state: AppState) -> Router {
    let cors = if state.config.allow_origins().is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .allow_origins()
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_credentials(true)
    };

    Router::new()
        .route("/xrpc/ch.poltr.auth.sendMagicLink", post(auth::send_magic_link))
        .route("/xrpc/ch.poltr.auth.register", post(auth::register))
        .route("/xrpc/ch.poltr.auth.verifyRegistration", post(auth::verify_registration))
        .route("/xrpc/ch.poltr.auth.verifyLogin", post(auth::verify_login))
        .route("/xrpc/app.ch.poltr.ballot.list", get(ballot::list))
        .route("/xrpc/app.ch.poltr.ballot.get", get(ballot::get))
        .route("/xrpc/app.ch.poltr.argument.list", get(argument::list))
        .route("/xrpc/app.ch.poltr.content.rating", post(content::rating))
        .route("/xrpc/app.ch.poltr.content.unrating", post(content::unrating))
        .route("/xrpc/app.ch.poltr.review.pending", get(review::pending))
        .route("/xrpc/app.ch.poltr.review.submit", post(review::submit))
        .route("/xrpc/app.ch.poltr.review.status", get(review::status))
        .route("/xrpc/app.bsky.feed.describeFeedGenerator", get(feed::describe_feed_generator))
        .route("/xrpc/app.bsky.feed.getFeedSkeleton", get(feed::get_feed_skeleton))
        .route("/.well-known/did.json", get(crate::wellknown::did_document))
        .route(
            "/.well-known/lexicons/ch/poltr/verification/attestation.json",
            get(crate::wellknown::verification_lexicon),
        )
        .route("/xrpc/{nsid}", get(crate::proxy::proxy).post(crate::proxy::proxy))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
