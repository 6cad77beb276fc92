//! `ch.poltr.auth.*`: magic-link issuance and verification.

use axum::extract::{ConnectInfo, State};
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::ApiResult;
use crate::session::SessionService;
use crate::state::AppState;

use super::{client_ip, rate_limit, session_cookie};

#[derive(Deserialize)]
pub struct EmailRequest {
    email: String,
}

#[derive(Serialize)]
pub struct SendLinkResponse {
    success: bool,
    message: &'static str,
}

fn service<'a>(state: &'a AppState) -> SessionService<'a> {
    SessionService {
        db: state.db.as_ref(),
        admin: state.admin.as_ref(),
        user_session: state.user_session.as_ref(),
        directory: state.directory.as_ref(),
        relay: state.relay.as_ref(),
        secret_box: state.secret_box.as_ref(),
        mailer: state.mailer.as_ref(),
        pds_hostname: &state.config.pds_hostname,
        pds_domain_short: &state.config.pds_domain_short,
        frontend_url: &state.config.frontend_url,
        max_accounts: state.config.max_accounts,
    }
}

pub async fn send_magic_link(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<SendLinkResponse>> {
    rate_limit(&state.rate_limiters.send_magic_link, client_ip(addr))?;
    service(&state).send_login_link(&req.email).await?;
    Ok(Json(SendLinkResponse { success: true, message: "login link sent" }))
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<SendLinkResponse>> {
    rate_limit(&state.rate_limiters.register, client_ip(addr))?;
    service(&state).send_registration_link(&req.email).await?;
    Ok(Json(SendLinkResponse { success: true, message: "confirmation email sent" }))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    token: String,
}

#[derive(Serialize)]
struct SessionResponse {
    did: String,
    #[serde(rename = "expiresAt")]
    expires_at: String,
}

pub async fn verify_registration(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Response> {
    rate_limit(&state.rate_limiters.verify, client_ip(addr))?;
    let issued = service(&state).verify_registration(&req.token).await?;
    Ok(issued_response(&state, issued))
}

pub async fn verify_login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Response> {
    rate_limit(&state.rate_limiters.verify, client_ip(addr))?;
    let issued = service(&state).verify_login(&req.token).await?;
    Ok(issued_response(&state, issued))
}

fn issued_response(state: &AppState, issued: crate::session::SessionIssued) -> Response {
    let body = Json(SessionResponse {
        did: issued.did,
        expires_at: issued.expires_at.to_rfc3339(),
    });
    let cookie = session_cookie(&issued.session_token, state.config.production);
    (axum::http::StatusCode::OK, [(SET_COOKIE, cookie)], body).into_response()
}
