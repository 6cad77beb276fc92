//! Typed client for the upstream PDS's XRPC surface.
//!
//! Grounded on `sjmelia-muat::muat-xrpc::pds::XrpcPds` for the shape of an
//! XRPC wrapper (one method per lexicon, typed request/response structs,
//! `#[serde(rename_all = "camelCase")]`), and on `original_source`'s
//! `atproto_api.py` for the exact endpoints, payload fields and error
//! handling this service depends on: admin operations go over an internal,
//! non-TLS URL with HTTP Basic auth (`admin:<password>`); user operations go
//! over the external, TLS hostname with a bearer access token and retry once
//! on `ExpiredToken` after a session refresh.

mod error;
mod types;

pub use error::PdsError;
pub use types::*;

use reqwest::StatusCode;
use tracing::{debug, error, info, instrument};

/// Lexicon `$type` values this client writes. Kept centralized so every
/// write site tags records the same way.
pub mod record_types {
    pub const PROFILE: &str = "app.bsky.actor.profile";
    pub const PSEUDONYM: &str = "app.ch.poltr.actor.pseudonym";
    pub const BALLOT: &str = "app.ch.poltr.ballot";
    pub const ARGUMENT: &str = "app.ch.poltr.argument";
    pub const LIKE: &str = "app.ch.poltr.content.like";
    pub const REVIEW_INVITATION: &str = "app.ch.poltr.review.invitation";
    pub const REVIEW_RESPONSE: &str = "app.ch.poltr.review.response";
    pub const BSKY_POST: &str = "app.bsky.feed.post";
    pub const BSKY_LIKE: &str = "app.bsky.feed.like";
}

const RECORD_TYPE_PROFILE: &str = record_types::PROFILE;

/// Admin-authenticated access to the PDS, used only during the registration
/// saga (invite-code issuance, account creation, compensating deletion).
#[derive(Clone)]
pub struct PdsAdminClient {
    http: reqwest::Client,
    internal_url: String,
    admin_password: String,
}

impl PdsAdminClient {
    pub fn new(internal_url: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            internal_url: internal_url.into(),
            admin_password: admin_password.into(),
        }
    }

    fn basic_auth_header(&self) -> String {
        use base64::Engine;
        let auth = format!("admin:{}", self.admin_password);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(auth))
    }

    #[instrument(skip(self))]
    pub async fn create_invite_code(&self) -> Result<String, PdsError> {
        let url = format!("{}/xrpc/com.atproto.server.createInviteCode", self.internal_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.basic_auth_header())
            .json(&serde_json::json!({ "useCount": 1 }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let body: CreateInviteCodeResponse = resp.json().await?;
        Ok(body.code)
    }

    #[instrument(skip(self, password))]
    pub async fn create_account(
        &self,
        handle: &str,
        password: &str,
        email: &str,
    ) -> Result<CreateAccountResponse, PdsError> {
        let invite_code = self.create_invite_code().await?;
        info!(%handle, "generated invite code for new account");

        let url = format!("{}/xrpc/com.atproto.server.createAccount", self.internal_url);
        let req = CreateAccountRequest {
            handle,
            email,
            password,
            birth_date: "1970-01-01",
            invite_code: &invite_code,
        };
        let resp = self.http.post(&url).json(&req).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_account(&self, did: &str) -> Result<(), PdsError> {
        let url = format!("{}/xrpc/com.atproto.admin.deleteAccount", self.internal_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.basic_auth_header())
            .json(&serde_json::json!({ "did": did }))
            .send()
            .await?;
        check_status(resp).await?;
        info!(%did, "compensating delete: removed pds account");
        Ok(())
    }

    /// Renames `did` to `<base>-tmp.<domain>`, waits one second, then
    /// renames back. Forces a fresh `#identity` firehose event after the
    /// Relay has caught up with the repo's final commit, working around an
    /// upstream bug where an identity event preceding the profile commit
    /// produces a permanently stubbed profile. Fully non-fatal: every
    /// failure is logged and swallowed, never returned.
    #[instrument(skip(self))]
    pub async fn admin_toggle_handle(&self, did: &str, handle: &str) {
        let Some((base, domain)) = handle.split_once('.') else {
            error!(%handle, "handle has no domain component, skipping toggle");
            return;
        };
        let tmp_handle = format!("{base}-tmp.{domain}");

        if let Err(e) = self.admin_update_handle(did, &tmp_handle).await {
            error!(%did, error = %e, "handle toggle step 1 failed");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        if let Err(e) = self.admin_update_handle(did, handle).await {
            error!(%did, %tmp_handle, error = %e, "handle toggle step 2 failed, handle may be stuck at tmp value");
        }
    }

    async fn admin_update_handle(&self, did: &str, handle: &str) -> Result<(), PdsError> {
        let url = format!("{}/xrpc/com.atproto.admin.updateAccountHandle", self.internal_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.basic_auth_header())
            .json(&serde_json::json!({ "did": did, "handle": handle }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Writes the `app.bsky.actor.profile` record with a display name,
    /// using admin/account access since the saga runs before any user
    /// session exists.
    #[instrument(skip(self, access_jwt))]
    pub async fn put_profile(
        &self,
        access_jwt: &str,
        did: &str,
        display_name: &str,
    ) -> Result<PutRecordResponse, PdsError> {
        self.put_record(
            access_jwt,
            did,
            RECORD_TYPE_PROFILE,
            "self",
            serde_json::json!({ "$type": RECORD_TYPE_PROFILE, "displayName": display_name }),
        )
        .await
    }

    #[instrument(skip(self, access_jwt, record))]
    pub async fn put_record(
        &self,
        access_jwt: &str,
        did: &str,
        collection: &str,
        rkey: &str,
        record: serde_json::Value,
    ) -> Result<PutRecordResponse, PdsError> {
        let url = format!("{}/xrpc/com.atproto.repo.putRecord", self.internal_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_jwt)
            .json(&serde_json::json!({
                "repo": did,
                "collection": collection,
                "rkey": rkey,
                "record": record,
            }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

/// Session-authenticated access to the external PDS, used for ordinary
/// user operations (login, token refresh, record CRUD). `external_url`
/// is a full base URL including scheme, e.g. `https://pds.poltr.ch`.
#[derive(Clone)]
pub struct PdsSessionClient {
    http: reqwest::Client,
    external_url: String,
}

impl PdsSessionClient {
    pub fn new(external_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            external_url: external_url.into(),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse, PdsError> {
        let url = format!(
            "{}/xrpc/com.atproto.server.createSession",
            self.external_url
        );
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<RefreshSessionResponse, PdsError> {
        let url = format!(
            "{}/xrpc/com.atproto.server.refreshSession",
            self.external_url
        );
        let resp = self.http.post(&url).bearer_auth(refresh_token).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// `GET getSession` to probe whether `access_jwt` is still valid.
    pub async fn get_session(&self, access_jwt: &str) -> Result<(), PdsError> {
        let url = format!("{}/xrpc/com.atproto.server.getSession", self.external_url);
        let resp = self.http.get(&url).bearer_auth(access_jwt).send().await?;
        if resp.status() == StatusCode::OK {
            return Ok(());
        }
        let body: ApiErrorBody = resp.json().await.unwrap_or_default();
        if body.error.as_deref() == Some("ExpiredToken") {
            return Err(PdsError::ExpiredToken);
        }
        Err(PdsError::Api {
            error: body.error.unwrap_or_default(),
            message: body.message.unwrap_or_default(),
        })
    }

    #[instrument(skip(self, access_jwt, record))]
    pub async fn create_record(
        &self,
        access_jwt: &str,
        did: &str,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<CreateRecordResponse, PdsError> {
        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.external_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_jwt)
            .json(&serde_json::json!({ "repo": did, "collection": collection, "record": record }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, access_jwt))]
    pub async fn delete_record(
        &self,
        access_jwt: &str,
        did: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<(), PdsError> {
        let url = format!("{}/xrpc/com.atproto.repo.deleteRecord", self.external_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_jwt)
            .json(&serde_json::json!({ "repo": did, "collection": collection, "rkey": rkey }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, access_jwt))]
    pub async fn create_app_password(
        &self,
        access_jwt: &str,
        name: &str,
    ) -> Result<CreateAppPasswordResponse, PdsError> {
        let url = format!("{}/xrpc/com.atproto.server.createAppPassword", self.external_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_jwt)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Mirrors `set_birthdate_on_bluesky`: reads current preferences, adds a
    /// `personalDetailsPref` with a fixed dummy birth date if absent, and
    /// writes preferences back. Failures here are non-fatal to the caller.
    #[instrument(skip(self, access_jwt))]
    pub async fn ensure_birthdate_preference(&self, access_jwt: &str, dummy_birthdate: &str) -> bool {
        let get_url = format!("{}/xrpc/app.bsky.actor.getPreferences", self.external_url);
        let resp = match self.http.get(&get_url).bearer_auth(access_jwt).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "failed to get preferences");
                return false;
            }
        };

        let mut preferences: Vec<serde_json::Value> = if resp.status().is_success() {
            resp.json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("preferences").cloned())
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default()
        } else {
            debug!("could not get preferences, continuing anyway");
            Vec::new()
        };

        let has_birthdate = preferences.iter().any(|p| {
            p.get("$type").and_then(|t| t.as_str()) == Some("app.bsky.actor.defs#personalDetailsPref")
                && p.get("birthDate").is_some()
        });
        if has_birthdate {
            return true;
        }

        preferences.push(serde_json::json!({
            "$type": "app.bsky.actor.defs#personalDetailsPref",
            "birthDate": dummy_birthdate,
        }));

        let put_url = format!("{}/xrpc/app.bsky.actor.putPreferences", self.external_url);
        match self
            .http
            .post(&put_url)
            .bearer_auth(access_jwt)
            .json(&serde_json::json!({ "preferences": preferences }))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                error!(status = %resp.status(), "failed to set birthDate preference");
                false
            }
            Err(e) => {
                error!(error = %e, "failed to set birthDate preference");
                false
            }
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, PdsError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body: ApiErrorBody = resp.json().await.unwrap_or_default();
    match body.error.as_deref() {
        Some("InvalidHandle") | Some("HandleNotAvailable") => Err(PdsError::HandleTaken),
        Some("InvalidEmail") | Some("EmailNotAvailable") => Err(PdsError::EmailTaken),
        Some("ExpiredToken") => Err(PdsError::ExpiredToken),
        _ => Err(PdsError::Api {
            error: body.error.unwrap_or_else(|| status.to_string()),
            message: body.message.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn login_succeeds_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "did": "did:plc:abc",
                "handle": "alice.poltr.info",
                "accessJwt": "access-token",
                "refreshJwt": "refresh-token",
            })))
            .mount(&server)
            .await;

        let client = PdsSessionClient::new(server.uri());
        let session = client.login("did:plc:abc", "app-password").await.unwrap();
        assert_eq!(session.did, "did:plc:abc");
        assert_eq!(session.access_jwt, "access-token");
    }

    #[tokio::test]
    async fn login_maps_invalid_password_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "AuthenticationRequired",
                "message": "Invalid identifier or password",
            })))
            .mount(&server)
            .await;

        let client = PdsSessionClient::new(server.uri());
        let err = client.login("did:plc:abc", "wrong").await.unwrap_err();
        assert!(matches!(err, PdsError::Api { .. }));
    }

    #[tokio::test]
    async fn get_session_maps_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.server.getSession"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "ExpiredToken",
                "message": "Token has expired",
            })))
            .mount(&server)
            .await;

        let client = PdsSessionClient::new(server.uri());
        let err = client.get_session("stale-token").await.unwrap_err();
        assert!(matches!(err, PdsError::ExpiredToken));
    }

    #[tokio::test]
    async fn admin_create_account_chains_invite_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createInviteCode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "poltr-invite-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createAccount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "did": "did:plc:new",
                "handle": "bob.poltr.info",
                "accessJwt": "a",
                "refreshJwt": "r",
            })))
            .mount(&server)
            .await;

        let admin = PdsAdminClient::new(server.uri(), "admin-secret");
        let account = admin
            .create_account("bob.poltr.info", "app-password", "bob@example.com")
            .await
            .unwrap();
        assert_eq!(account.did, "did:plc:new");
    }

    #[tokio::test]
    async fn handle_taken_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createInviteCode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "poltr-invite-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createAccount"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "HandleNotAvailable",
                "message": "Handle already taken",
            })))
            .mount(&server)
            .await;

        let admin = PdsAdminClient::new(server.uri(), "admin-secret");
        let err = admin
            .create_account("taken.poltr.info", "app-password", "x@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, PdsError::HandleTaken));
    }

    #[tokio::test]
    async fn toggle_handle_issues_two_renames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.admin.updateAccountHandle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let admin = PdsAdminClient::new(server.uri(), "admin-secret");
        admin.admin_toggle_handle("did:plc:abc", "alice.poltr.info").await;
    }
}
