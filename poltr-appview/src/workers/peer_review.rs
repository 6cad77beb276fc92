//! Peer-review Worker (C9): invites eligible reviewers to preliminary
//! arguments and materializes approved arguments into governance-authored
//! copies.
//!
//! Grounded on `original_source/services/appview/src/workers/peer_review.py`:
//! same invite cap (20 arguments/tick), same biased-coin invitation scheme,
//! same 10-argument materialization cap.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, instrument, warn};

use poltr_db::Gateway;
use poltr_pds::record_types;

use crate::governance::GovernanceIdentity;

const MAX_ARGUMENTS_PER_INVITE_TICK: usize = 20;
const MAX_ARGUMENTS_PER_MATERIALIZE_TICK: usize = 10;

pub struct PeerReviewWorker {
    db: Arc<Gateway>,
    governance: Arc<GovernanceIdentity>,
    quorum: i64,
    invite_probability: f64,
    enabled: std::sync::atomic::AtomicBool,
    poll_interval: StdDuration,
}

impl PeerReviewWorker {
    pub fn new(
        db: Arc<Gateway>,
        governance: Arc<GovernanceIdentity>,
        quorum: i64,
        invite_probability: f64,
        enabled: bool,
        poll_interval: StdDuration,
    ) -> Self {
        Self {
            db,
            governance,
            quorum,
            invite_probability,
            enabled: std::sync::atomic::AtomicBool::new(enabled),
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
        self.invite_reviewers().await;
        self.materialize_approved().await;
    }

    async fn invite_reviewers(&self) {
        let preliminary = match self.db.list_preliminary_arguments() {
            Ok(args) => args,
            Err(e) => {
                error!(error = %e, "failed to list preliminary arguments");
                return;
            }
        };

        let active_sessions = match self.db.list_active_sessions(Utc::now()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to list active sessions");
                return;
            }
        };
        let mut candidate_dids: Vec<String> = active_sessions.into_iter().map(|s| s.did).collect();
        candidate_dids.sort();
        candidate_dids.dedup();

        for argument in preliminary.into_iter().take(MAX_ARGUMENTS_PER_INVITE_TICK) {
            let current_count = match self.db.list_invitations_for_argument(&argument.uri) {
                Ok(v) => v.len() as i64,
                Err(e) => {
                    error!(uri = %argument.uri, error = %e, "failed to count invitations");
                    continue;
                }
            };
            let remaining = self.quorum - current_count;
            if remaining <= 0 {
                continue;
            }

            let mut invited_this_round = 0i64;
            for candidate_did in &candidate_dids {
                if invited_this_round >= remaining {
                    break;
                }
                if candidate_did == &argument.did {
                    continue;
                }
                match self.db.invitation_exists(&argument.uri, candidate_did) {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        error!(uri = %argument.uri, error = %e, "invitation lookup failed");
                        continue;
                    }
                }

                let heads = rand::thread_rng().gen_bool(self.invite_probability);
                if !heads {
                    continue;
                }

                let record = serde_json::json!({
                    "$type": record_types::REVIEW_INVITATION,
                    "argumentUri": argument.uri,
                    "invitee": candidate_did,
                    "createdAt": Utc::now().to_rfc3339(),
                });
                match self.governance.create_record(record_types::REVIEW_INVITATION, record).await {
                    Ok(created) => {
                        if let Err(e) = self.db.insert_review_invitation(&created.uri, &argument.uri, candidate_did) {
                            error!(uri = %argument.uri, error = %e, "failed to store review invitation");
                            continue;
                        }
                        invited_this_round += 1;
                    }
                    Err(e) => warn!(uri = %argument.uri, error = %e, "invitation write failed, deferring"),
                }
            }
        }
    }

    async fn materialize_approved(&self) {
        let approved = match self.db.list_approved_without_governance_copy() {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to list approved arguments");
                return;
            }
        };

        for argument in approved.into_iter().take(MAX_ARGUMENTS_PER_MATERIALIZE_TICK) {
            let record = serde_json::json!({
                "$type": record_types::ARGUMENT,
                "ballotUri": argument.ballot_uri,
                "title": argument.title,
                "body": argument.body,
                "type": argument.argument_type.as_str(),
                "originalUri": argument.uri,
                "createdAt": Utc::now().to_rfc3339(),
            });
            match self.governance.create_record(record_types::ARGUMENT, record).await {
                Ok(created) => {
                    if let Err(e) = self.db.set_argument_governance_uri(&argument.uri, &created.uri) {
                        error!(uri = %argument.uri, error = %e, "failed to record governance copy uri");
                    } else {
                        info!(uri = %argument.uri, governance_uri = %created.uri, "materialized governance copy");
                    }
                }
                Err(e) => warn!(uri = %argument.uri, error = %e, "governance copy write failed, deferring"),
            }
        }
    }
}
