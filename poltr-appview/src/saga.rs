//! Registration Saga (C5): create a new platform identity such that either
//! the user ends up with a working PDS account, a local Credential, an
//! active Session and a visible upstream profile, or no durable state is
//! left anywhere.
//!
//! Grounded on `original_source/auth/login.py::create_account` (handle/
//! password generation, the create-account call, credential storage) and
//! `infra/scripts/test_registration.py` (the exact ordering: minimal
//! profile → directory wait → full profile → crawl → relay wait → handle
//! toggle). `freeq-server::policy::credentials`'s explicit-state-machine
//! style (one function per step, typed errors surfaced to the caller) is
//! carried over rather than a generic retry-anything wrapper.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tracing::{info, instrument, warn};

use poltr_crypto::SecretBox;
use poltr_db::models::Credential;
use poltr_db::Gateway;
use poltr_federation::{DirectoryClient, RelayClient};
use poltr_pds::{record_types, PdsAdminClient};

use crate::error::ApiError;
use crate::pseudonym::build_pseudonym;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);
const DIRECTORY_INTERVAL: Duration = Duration::from_secs(2);
const RELAY_TIMEOUT: Duration = Duration::from_secs(30);
const RELAY_INTERVAL: Duration = Duration::from_secs(3);

const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+";
const HANDLE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub struct RegistrationSaga<'a> {
    pub db: &'a Gateway,
    pub admin: &'a PdsAdminClient,
    pub directory: &'a DirectoryClient,
    pub relay: &'a RelayClient,
    pub secret_box: &'a SecretBox,
    pub pds_hostname: &'a str,
    pub pds_domain_short: &'a str,
    pub max_accounts: i64,
}

pub struct RegisteredAccount {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

impl<'a> RegistrationSaga<'a> {
    /// Runs the full saga. On any failure after the PDS account is
    /// created, issues the compensating `admin_delete_account` before
    /// returning the error.
    #[instrument(skip(self, email))]
    pub async fn register(&self, email: &str) -> Result<RegisteredAccount, ApiError> {
        if self.max_accounts > 0 {
            let count = self.db.count_credentials()?;
            if count >= self.max_accounts {
                return Err(ApiError::AccountLimitReached);
            }
        }

        let handle = gen_handle(self.pds_domain_short);
        let password = gen_password();

        let created = self
            .admin
            .create_account(&handle, &password, email)
            .await
            .map_err(ApiError::from)?;
        // Point of no return: a PDS account now exists under `created.did`.
        info!(did = %created.did, %handle, "pds account created");

        match self
            .finish_identity(&created.did, &handle, &created.access_jwt, &password, email)
            .await
        {
            Ok(()) => Ok(RegisteredAccount {
                did: created.did,
                handle,
                access_jwt: created.access_jwt,
                refresh_jwt: created.refresh_jwt,
            }),
            Err(e) => {
                warn!(did = %created.did, error = %e, "registration failed after pds account creation, compensating");
                self.admin.delete_account(&created.did).await.unwrap_or_else(|e| {
                    warn!(did = %created.did, error = %e, "compensating delete also failed");
                });
                Err(ApiError::RegistrationFailed)
            }
        }
    }

    async fn finish_identity(
        &self,
        did: &str,
        handle: &str,
        access_jwt: &str,
        password: &str,
        email: &str,
    ) -> anyhow::Result<()> {
        // Minimal profile first: the first commit seeds the repo, so the
        // Directory can resolve the DID once this lands.
        let handle_prefix = handle.split('.').next().unwrap_or(handle);
        self.admin.put_profile(access_jwt, did, handle_prefix).await?;

        self.directory
            .wait_for_directory_resolution(did, DIRECTORY_TIMEOUT, DIRECTORY_INTERVAL)
            .await;

        let template = self
            .db
            .random_mountain_template()?
            .ok_or_else(|| anyhow::anyhow!("no mountain templates configured"))?;
        let pseudonym = build_pseudonym(&template);

        // Full profile: the rev we wait for below must contain this commit
        // so the final display name is what the Relay (and later the
        // upstream AppView) observes.
        let full_profile = self
            .admin
            .put_profile(access_jwt, did, &pseudonym.display_name)
            .await?;
        self.admin
            .put_record(
                access_jwt,
                did,
                record_types::PSEUDONYM,
                "self",
                serde_json::json!({
                    "$type": record_types::PSEUDONYM,
                    "displayName": pseudonym.display_name,
                    "mountainName": pseudonym.mountain_name,
                    "mountainFullname": pseudonym.mountain_fullname,
                    "canton": pseudonym.canton,
                    "height": pseudonym.height,
                    "color": pseudonym.color,
                    "createdAt": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        self.relay.request_crawl(&self.pds_hostname_host()).await;
        let rev = full_profile.commit.map(|c| c.rev);
        self.relay
            .wait_for_relay_indexed(did, rev.as_deref(), RELAY_TIMEOUT, RELAY_INTERVAL)
            .await;

        // Forces a fresh #identity event now that the relay has the final commit.
        self.admin.admin_toggle_handle(did, handle).await;

        let (ciphertext, nonce) = self.secret_box.encrypt_str(password)?;
        self.db.insert_credential(&Credential {
            did: did.to_string(),
            handle: handle.to_string(),
            email: email.to_string(),
            pds_hostname: self.pds_hostname.to_string(),
            pw_ciphertext: ciphertext,
            pw_nonce: nonce,
            pseudonym_template_id: Some(pseudonym.template_id),
        })?;
        self.db.set_pseudonym_template(did, pseudonym.template_id)?;

        Ok(())
    }

    fn pds_hostname_host(&self) -> String {
        self.pds_hostname
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }
}

/// `user<6 random alphanumeric chars>.<domain>`. Grounded on
/// `original_source/auth/login.py::gen_handle`.
fn gen_handle(domain: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| HANDLE_ALPHABET[rng.gen_range(0..HANDLE_ALPHABET.len())] as char)
        .collect();
    format!("user{suffix}.{domain}")
}

/// 64 random characters from letters, digits and punctuation. Grounded on
/// `original_source/auth/login.py::gen_password`.
fn gen_password() -> String {
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

pub fn new_session_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn session_expiry() -> chrono::DateTime<Utc> {
    Utc::now() + ChronoDuration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_has_expected_shape() {
        let h = gen_handle("poltr.info");
        assert!(h.starts_with("user"));
        assert!(h.ends_with(".poltr.info"));
        assert_eq!(h.len(), "user".len() + 6 + ".poltr.info".len());
    }

    #[test]
    fn password_is_64_chars() {
        let p = gen_password();
        assert_eq!(p.chars().count(), 64);
    }

    #[test]
    fn session_token_is_url_safe_and_fresh_each_call() {
        let a = new_session_token();
        let b = new_session_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
