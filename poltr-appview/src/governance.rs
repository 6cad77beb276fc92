//! Governance Identity (C7): a process-singleton cache of the platform-owned
//! PDS session used to author ballot mirrors, governance argument copies,
//! and review records.
//!
//! Grounded on `freeq-server::server::SharedState`'s pattern of holding a
//! single piece of shared mutable state behind a `parking_lot::Mutex` read
//! by many concurrent tasks (here: the HTTP frontend plus both workers).

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::instrument;

use poltr_pds::PdsSessionClient;

use crate::error::ApiError;

const TOKEN_LIFETIME_MINUTES: i64 = 90;
const REFRESH_SKEW_MINUTES: i64 = 30;

struct CachedToken {
    access_jwt: String,
    refresh_jwt: String,
    expires_at: DateTime<Utc>,
}

pub struct GovernanceIdentity {
    session: PdsSessionClient,
    did: String,
    password: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GovernanceIdentity {
    pub fn new(session: PdsSessionClient, did: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            session,
            did: did.into(),
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid access token, refreshing or logging in again as
    /// needed. Read-modify-write races against a concurrent caller are
    /// tolerated: both `create_session` and `refresh_session` are
    /// idempotent from the PDS's perspective.
    #[instrument(skip(self))]
    pub async fn get_token(&self) -> Result<String, ApiError> {
        let now = Utc::now();
        let needs_refresh = {
            let guard = self.cached.lock();
            match guard.as_ref() {
                Some(tok) => now >= tok.expires_at - Duration::minutes(REFRESH_SKEW_MINUTES),
                None => true,
            }
        };
        if !needs_refresh {
            return Ok(self.cached.lock().as_ref().unwrap().access_jwt.clone());
        }

        let refresh_jwt = self.cached.lock().as_ref().map(|t| t.refresh_jwt.clone());
        let (access_jwt, refresh_jwt) = match refresh_jwt {
            Some(rjwt) => match self.session.refresh_session(&rjwt).await {
                Ok(refreshed) => (refreshed.access_jwt, refreshed.refresh_jwt),
                Err(_) => self.login().await?,
            },
            None => self.login().await?,
        };

        let expires_at = now + Duration::minutes(TOKEN_LIFETIME_MINUTES);
        *self.cached.lock() = Some(CachedToken {
            access_jwt: access_jwt.clone(),
            refresh_jwt,
            expires_at,
        });
        Ok(access_jwt)
    }

    async fn login(&self) -> Result<(String, String), ApiError> {
        let session = self.session.login(&self.did, &self.password).await?;
        Ok((session.access_jwt, session.refresh_jwt))
    }

    /// Wraps `PdsSessionClient::create_record` under the governance
    /// identity's current token.
    #[instrument(skip(self, record))]
    pub async fn create_record(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<poltr_pds::CreateRecordResponse, ApiError> {
        let token = self.get_token().await?;
        Ok(self.session.create_record(&token, &self.did, collection, record).await?)
    }

    pub fn did(&self) -> &str {
        &self.did
    }
}
