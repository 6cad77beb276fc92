//! Session Service (C6): magic-link registration/login, session issuance
//! and validation, and the upstream-token-refresh retry wrapper around C3.
//!
//! Grounded on `original_source/services/appview/src/auth/login.py` for the
//! two magic-link sub-flows and on the registration/session state machine.
//! The retry-wrapper shape (call once, refresh on `ExpiredToken`, retry
//! exactly once) mirrors `freeq-server::verifiers::oauth`'s token-refresh
//! helper.

use std::future::Future;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, instrument, warn};

use poltr_crypto::SecretBox;
use poltr_db::models::Session;
use poltr_db::Gateway;
use poltr_federation::{DirectoryClient, RelayClient};
use poltr_pds::{PdsAdminClient, PdsError, PdsSessionClient};

use crate::email::MagicLinkMailer;
use crate::error::ApiError;
use crate::saga::{new_session_token, session_expiry, RegistrationSaga};

const REGISTRATION_TOKEN_TTL_MINUTES: i64 = 30;
const LOGIN_TOKEN_TTL_MINUTES: i64 = 15;
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub struct SessionIssued {
    pub session_token: String,
    pub did: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct SessionService<'a> {
    pub db: &'a Gateway,
    pub admin: &'a PdsAdminClient,
    pub user_session: &'a PdsSessionClient,
    pub directory: &'a DirectoryClient,
    pub relay: &'a RelayClient,
    pub secret_box: &'a SecretBox,
    pub mailer: &'a dyn MagicLinkMailer,
    pub pds_hostname: &'a str,
    pub pds_domain_short: &'a str,
    pub frontend_url: &'a str,
    pub max_accounts: i64,
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

impl<'a> SessionService<'a> {
    #[instrument(skip(self, email))]
    pub async fn send_registration_link(&self, email: &str) -> Result<(), ApiError> {
        if self.db.email_taken(email)? {
            return Err(ApiError::EmailTaken);
        }
        let token = random_token();
        self.db.upsert_pending_registration(
            email,
            &token,
            Utc::now() + Duration::minutes(REGISTRATION_TOKEN_TTL_MINUTES),
        )?;
        let link = format!("{}/verify-registration?token={token}", self.frontend_url);
        self.mailer.send_registration_link(email, &link).await;
        Ok(())
    }

    #[instrument(skip(self, email))]
    pub async fn send_login_link(&self, email: &str) -> Result<(), ApiError> {
        if self.db.find_credential_by_email(email)?.is_none() {
            return Err(ApiError::UserNotFound);
        }
        let token = random_token();
        self.db
            .insert_pending_login(email, &token, Utc::now() + Duration::minutes(LOGIN_TOKEN_TTL_MINUTES))?;
        let link = format!("{}/verify-login?token={token}", self.frontend_url);
        self.mailer.send_login_link(email, &link).await;
        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn verify_registration(&self, token: &str) -> Result<SessionIssued, ApiError> {
        let pending = self
            .db
            .find_pending_registration(token)?
            .ok_or_else(|| ApiError::InvalidRequest("invalid or expired token".into()))?;
        if Utc::now() > pending.expires_at {
            self.db.delete_pending_registration(&pending.email)?;
            return Err(ApiError::InvalidRequest("invalid or expired token".into()));
        }
        self.db.delete_pending_registration(&pending.email)?;

        if self.db.email_taken(&pending.email)? {
            return Err(ApiError::EmailTaken);
        }

        let saga = RegistrationSaga {
            db: self.db,
            admin: self.admin,
            directory: self.directory,
            relay: self.relay,
            secret_box: self.secret_box,
            pds_hostname: self.pds_hostname,
            pds_domain_short: self.pds_domain_short,
            max_accounts: self.max_accounts,
        };
        let account = saga.register(&pending.email).await?;

        let user_json = serde_json::json!({ "did": account.did, "handle": account.handle }).to_string();
        self.issue_session(&account.did, &user_json, &account.access_jwt, &account.refresh_jwt)
    }

    #[instrument(skip(self, token))]
    pub async fn verify_login(&self, token: &str) -> Result<SessionIssued, ApiError> {
        let pending = self
            .db
            .find_pending_login(token)?
            .ok_or_else(|| ApiError::InvalidRequest("invalid or expired token".into()))?;
        self.db.delete_pending_login(token)?;
        if Utc::now() > pending.expires_at {
            return Err(ApiError::InvalidRequest("invalid or expired token".into()));
        }

        let cred = self
            .db
            .find_credential_by_email(&pending.email)?
            .ok_or(ApiError::UserNotFound)?;
        let password = self
            .secret_box
            .decrypt_to_string(&cred.pw_ciphertext, &cred.pw_nonce)?;

        let login = self.user_session.login(&cred.handle, &password).await?;
        let user_json = serde_json::json!({ "did": login.did, "handle": login.handle }).to_string();
        self.issue_session(&login.did, &user_json, &login.access_jwt, &login.refresh_jwt)
    }

    fn issue_session(
        &self,
        did: &str,
        user_json: &str,
        access_jwt: &str,
        refresh_jwt: &str,
    ) -> Result<SessionIssued, ApiError> {
        let token = new_session_token();
        let expires_at = session_expiry();
        self.db
            .insert_session(&token, did, user_json, expires_at, access_jwt, refresh_jwt)?;
        info!(%did, "session issued");
        Ok(SessionIssued {
            session_token: token,
            did: did.to_string(),
            expires_at,
        })
    }

    /// Validates a session token: loads the row, rejects and deletes it if
    /// expired, otherwise touches `last_accessed_at` and returns it.
    #[instrument(skip(self, token))]
    pub fn validate(&self, token: &str) -> Result<Session, ApiError> {
        validate(self.db, token)
    }
}

/// Free-standing form of [`SessionService::validate`], usable from the
/// auth extractor where only a `Gateway` handle is at hand.
pub fn validate(db: &Gateway, token: &str) -> Result<Session, ApiError> {
    let session = db.find_session(token)?.ok_or(ApiError::InvalidToken)?;
    if session.is_expired(Utc::now()) {
        db.delete_session(token)?;
        return Err(ApiError::TokenExpired);
    }
    db.touch_session(token)?;
    Ok(session)
}

/// Retries `call` once after refreshing the session's upstream tokens if
/// the first attempt fails with `ExpiredToken`. Grounded on §4.6's
/// "implement as a retry wrapper" design note.
pub async fn with_refresh<T, F, Fut>(
    db: &Gateway,
    user_session: &PdsSessionClient,
    session: &Session,
    call: F,
) -> Result<T, ApiError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, PdsError>>,
{
    match call(session.access_token.clone()).await {
        Ok(v) => Ok(v),
        Err(PdsError::ExpiredToken) => {
            warn!(did = %session.did, "access token expired, refreshing");
            let refreshed = user_session.refresh_session(&session.refresh_token).await?;
            db.update_session_tokens(&session.session_token, &refreshed.access_jwt, &refreshed.refresh_jwt)?;
            Ok(call(refreshed.access_jwt).await?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_is_32_chars() {
        assert_eq!(random_token().chars().count(), 32);
    }
}
