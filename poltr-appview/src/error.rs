//! The error taxonomy of §7, mapped onto HTTP via [`axum::response::IntoResponse`].
//!
//! Grounded on `freeq-server::policy::api`'s convention of a small set of
//! stable machine-readable codes in the JSON body, and its
//! `#[serde(skip_serializing_if = "Option::is_none")]` field style. The
//! codes below (`email_taken`, `user_not_found`, ...) form the stable
//! release-to-release error surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized")]
    InvalidToken,
    #[error("session expired")]
    TokenExpired,
    #[error("feature disabled")]
    Disabled,
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("account limit reached")]
    AccountLimitReached,
    #[error("already reviewed")]
    AlreadyReviewed,
    #[error("not invited to review this argument")]
    NotInvited,
    #[error("rate limited")]
    RateLimited,
    #[error("not found")]
    NotFound,
    #[error("upstream pds error: {0}")]
    PdsError(String),
    #[error("registration failed")]
    RegistrationFailed,
    #[error("crypto error: {0}")]
    Crypto(#[from] poltr_crypto::CryptoError),
    #[error("db error: {0}")]
    Db(#[from] poltr_db::DbError),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<poltr_pds::PdsError> for ApiError {
    fn from(e: poltr_pds::PdsError) -> Self {
        match e {
            poltr_pds::PdsError::EmailTaken => ApiError::EmailTaken,
            poltr_pds::PdsError::HandleTaken => ApiError::PdsError("handle_taken".into()),
            poltr_pds::PdsError::ExpiredToken => ApiError::TokenExpired,
            other => ApiError::PdsError(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ApiError {
    fn code(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::InvalidRequest(_) => ("invalid_request", StatusCode::BAD_REQUEST),
            ApiError::InvalidToken => ("invalid_token", StatusCode::UNAUTHORIZED),
            ApiError::TokenExpired => ("token_expired", StatusCode::UNAUTHORIZED),
            ApiError::Disabled => ("disabled", StatusCode::FORBIDDEN),
            ApiError::EmailTaken => ("email_taken", StatusCode::CONFLICT),
            ApiError::UserNotFound => ("user_not_found", StatusCode::NOT_FOUND),
            ApiError::AccountLimitReached => ("account_limit_reached", StatusCode::CONFLICT),
            ApiError::AlreadyReviewed => ("already_reviewed", StatusCode::CONFLICT),
            ApiError::NotInvited => ("not_invited", StatusCode::FORBIDDEN),
            ApiError::RateLimited => ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
            ApiError::NotFound => ("not_found", StatusCode::NOT_FOUND),
            ApiError::PdsError(_) => ("pds_error", StatusCode::BAD_GATEWAY),
            ApiError::RegistrationFailed => ("registration_failed", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Crypto(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Db(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Internal(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_) | ApiError::Crypto(_) | ApiError::Db(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let (code, status) = self.code();
        let message = match &self {
            ApiError::InvalidRequest(m) | ApiError::PdsError(m) => Some(m.clone()),
            _ => None,
        };
        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
