//! Cross-post Worker (C8): mirrors governance-authored ballots and their
//! arguments onto the upstream `app.bsky.feed.post` surface.
//!
//! Grounded on `original_source/services/appview/src/workers/crosspost.py`:
//! ballots are mirrored top-level with a link facet and external-embed
//! card, arguments as replies under either the governance identity or a
//! short-lived per-author session obtained by decrypting the author's
//! stored app-password.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use poltr_crypto::SecretBox;
use poltr_db::models::{Argument, ReviewStatus};
use poltr_db::Gateway;
use poltr_pds::{record_types, PdsSessionClient};

use crate::governance::GovernanceIdentity;

const USER_TOKEN_TTL_MINUTES: i64 = 60;
const MAX_POST_CHARS: usize = 300;

struct CachedUserToken {
    access_jwt: String,
    expires_at: chrono::DateTime<Utc>,
}

pub struct CrosspostWorker {
    db: Arc<Gateway>,
    governance: Arc<GovernanceIdentity>,
    user_session: PdsSessionClient,
    secret_box: Arc<SecretBox>,
    frontend_url: String,
    user_tokens: Mutex<HashMap<String, CachedUserToken>>,
    enabled: Arc<std::sync::atomic::AtomicBool>,
    poll_interval: StdDuration,
}

impl CrosspostWorker {
    pub fn new(
        db: Arc<Gateway>,
        governance: Arc<GovernanceIdentity>,
        user_session: PdsSessionClient,
        secret_box: Arc<SecretBox>,
        frontend_url: String,
        enabled: bool,
        poll_interval: StdDuration,
    ) -> Self {
        Self {
            db,
            governance,
            user_session,
            secret_box,
            frontend_url,
            user_tokens: Mutex::new(HashMap::new()),
            enabled: Arc::new(std::sync::atomic::AtomicBool::new(enabled)),
            poll_interval,
        }
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            if self.enabled.load(std::sync::atomic::Ordering::Relaxed) {
                self.tick().await;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) {
        self.mirror_ballots().await;
        self.mirror_arguments().await;
    }

    async fn mirror_ballots(&self) {
        let ballots = match self.db.list_ballots_pending_crosspost() {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to list ballots pending crosspost");
                return;
            }
        };
        for ballot in ballots {
            if ballot.did != self.governance.did() {
                continue;
            }
            let url = format!("{}/ballots/{}", self.frontend_url, ballot.rkey);
            let title = ballot.title.clone().unwrap_or_else(|| "New ballot".to_string());
            let text = format!("{title}\n\n{url}");
            let byte_start = text.rfind(&url).unwrap_or(0);
            let byte_end = byte_start + url.len();

            let record = serde_json::json!({
                "$type": record_types::BSKY_POST,
                "text": text,
                "facets": [{
                    "index": { "byteStart": byte_start, "byteEnd": byte_end },
                    "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": url }],
                }],
                "embed": {
                    "$type": "app.bsky.embed.external",
                    "external": { "uri": url, "title": title, "description": ballot.description.clone().unwrap_or_default() },
                },
                "createdAt": Utc::now().to_rfc3339(),
            });

            match self.governance.create_record(record_types::BSKY_POST, record).await {
                Ok(created) => {
                    if let Err(e) = self.db.set_ballot_crosspost(&ballot.uri, &created.uri, &created.cid) {
                        error!(uri = %ballot.uri, error = %e, "failed to record ballot crosspost");
                    } else {
                        info!(uri = %ballot.uri, upstream = %created.uri, "mirrored ballot");
                    }
                }
                Err(e) => warn!(uri = %ballot.uri, error = %e, "ballot mirror failed, deferring to next tick"),
            }
        }
    }

    async fn mirror_arguments(&self) {
        let arguments = match self.db.list_arguments_pending_crosspost() {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "failed to list arguments pending crosspost");
                return;
            }
        };
        for argument in arguments {
            let ballot = match self.db.find_ballot(&argument.ballot_uri) {
                Ok(Some(b)) => b,
                Ok(None) => continue,
                Err(e) => {
                    error!(uri = %argument.uri, error = %e, "failed to load parent ballot");
                    continue;
                }
            };
            let (Some(root_uri), Some(root_cid)) = (ballot.bsky_post_uri.clone(), ballot.bsky_post_cid.clone()) else {
                continue; // parent ballot not yet mirrored; retry next tick
            };

            let text = compose_argument_text(&argument);
            let record = serde_json::json!({
                "$type": record_types::BSKY_POST,
                "text": text,
                "reply": {
                    "root": { "uri": root_uri, "cid": root_cid },
                    "parent": { "uri": root_uri, "cid": root_cid },
                },
                "createdAt": Utc::now().to_rfc3339(),
            });

            let result = if argument.original_uri.is_some() && argument.did == self.governance.did() {
                self.governance
                    .create_record(record_types::BSKY_POST, record)
                    .await
                    .map_err(|e| e.to_string())
            } else {
                match self.user_access_token(&argument.did).await {
                    Ok(token) => self
                        .user_session
                        .create_record(&token, &argument.did, record_types::BSKY_POST, record)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e),
                }
            };

            match result {
                Ok(created) => {
                    if let Err(e) = self.db.set_argument_crosspost(&argument.uri, &created.uri, &created.cid) {
                        error!(uri = %argument.uri, error = %e, "failed to record argument crosspost");
                    } else {
                        info!(uri = %argument.uri, upstream = %created.uri, "mirrored argument");
                    }
                }
                Err(e) => warn!(uri = %argument.uri, error = %e, "argument mirror failed, deferring to next tick"),
            }
        }
    }

    async fn user_access_token(&self, did: &str) -> Result<String, String> {
        let now = Utc::now();
        if let Some(cached) = self.user_tokens.lock().get(did) {
            if now < cached.expires_at {
                return Ok(cached.access_jwt.clone());
            }
        }

        let cred = self
            .db
            .find_credential_by_did(did)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no stored credential for {did}"))?;
        let password = self
            .secret_box
            .decrypt_to_string(&cred.pw_ciphertext, &cred.pw_nonce)
            .map_err(|e| e.to_string())?;
        let session = self
            .user_session
            .login(&cred.handle, &password)
            .await
            .map_err(|e| e.to_string())?;

        self.user_tokens.lock().insert(
            did.to_string(),
            CachedUserToken {
                access_jwt: session.access_jwt.clone(),
                expires_at: now + Duration::minutes(USER_TOKEN_TTL_MINUTES),
            },
        );
        Ok(session.access_jwt)
    }
}

fn compose_argument_text(argument: &Argument) -> String {
    let stance = match argument.argument_type {
        poltr_db::models::ArgumentType::Pro => "[PRO]",
        poltr_db::models::ArgumentType::Contra => "[CONTRA]",
    };
    let preliminary = if argument.review_status == ReviewStatus::Preliminary {
        "[Preliminary] "
    } else {
        ""
    };
    let body = argument.body.clone().unwrap_or_default();
    let mut text = format!("{stance} {preliminary}{body}");
    if text.chars().count() > MAX_POST_CHARS {
        text = text.chars().take(MAX_POST_CHARS).collect();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use poltr_db::models::ArgumentType;

    fn sample_argument(review_status: ReviewStatus) -> Argument {
        Argument {
            uri: "at://a/argument/1".into(),
            ballot_uri: "at://a/ballot/1".into(),
            ballot_rkey: "1".into(),
            did: "did:plc:a".into(),
            cid: "c".into(),
            title: None,
            body: Some("this policy is sound".into()),
            argument_type: ArgumentType::Pro,
            review_status,
            original_uri: None,
            governance_uri: None,
            bsky_post_uri: None,
            bsky_post_cid: None,
            deleted: false,
            created_at: Utc::now(),
            indexed_at: None,
            like_count: 0,
            comment_count: 0,
        }
    }

    #[test]
    fn preliminary_arguments_get_prefixed() {
        let text = compose_argument_text(&sample_argument(ReviewStatus::Preliminary));
        assert!(text.starts_with("[PRO] [Preliminary] "));
    }

    #[test]
    fn approved_arguments_have_no_preliminary_tag() {
        let text = compose_argument_text(&sample_argument(ReviewStatus::Approved));
        assert!(!text.contains("[Preliminary]"));
    }

    #[test]
    fn text_is_truncated_to_300_chars() {
        let mut arg = sample_argument(ReviewStatus::Approved);
        arg.body = Some("x".repeat(1000));
        let text = compose_argument_text(&arg);
        assert!(text.chars().count() <= MAX_POST_CHARS);
    }
}
