//! Typed row structs for every entity in the relational store.
//!
//! Grounded on `freeq-server::db`'s own convention of loading rows into
//! typed structs (`MessageRow`, `IdentityRow`) rather than loose maps; the
//! same convention is used here, kept lenient only at the
//! JSON-serialization boundary (see `poltr-appview::views`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally stored, symmetric-encrypted PDS app-password plus account
/// identity. Debug is hand-written to redact the ciphertext and nonce;
/// this struct must never appear unredacted in logs.
#[derive(Clone)]
pub struct Credential {
    pub did: String,
    pub handle: String,
    pub email: String,
    pub pds_hostname: String,
    pub pw_ciphertext: Vec<u8>,
    pub pw_nonce: Vec<u8>,
    pub pseudonym_template_id: Option<i64>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("email", &self.email)
            .field("pds_hostname", &self.pds_hostname)
            .field("pw_ciphertext", &"REDACTED")
            .field("pw_nonce", &"REDACTED")
            .field("pseudonym_template_id", &self.pseudonym_template_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_token: String,
    pub did: String,
    pub user_json: String,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub id: i64,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountainTemplate {
    pub id: i64,
    pub name: String,
    pub fullname: String,
    pub canton: String,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ballot {
    pub uri: String,
    pub rkey: String,
    pub did: String,
    pub cid: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vote_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub like_count: i64,
    pub reply_count: i64,
    pub bookmark_count: i64,
    pub record_json: Option<String>,
    pub bsky_post_uri: Option<String>,
    pub bsky_post_cid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArgumentType {
    Pro,
    Contra,
}

impl ArgumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentType::Pro => "PRO",
            ArgumentType::Contra => "CONTRA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRO" => Some(ArgumentType::Pro),
            "CONTRA" => Some(ArgumentType::Contra),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Preliminary,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Preliminary => "preliminary",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preliminary" => Some(ReviewStatus::Preliminary),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vote {
    Approve,
    Reject,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Approve => "APPROVE",
            Vote::Reject => "REJECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPROVE" => Some(Vote::Approve),
            "REJECT" => Some(Vote::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Argument {
    pub uri: String,
    pub ballot_uri: String,
    pub ballot_rkey: String,
    pub did: String,
    pub cid: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub argument_type: ArgumentType,
    pub review_status: ReviewStatus,
    pub original_uri: Option<String>,
    pub governance_uri: Option<String>,
    pub bsky_post_uri: Option<String>,
    pub bsky_post_cid: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Like {
    pub uri: String,
    pub did: String,
    pub subject_uri: String,
    pub subject_cid: String,
    pub bsky_like_uri: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewInvitation {
    pub uri: String,
    pub argument_uri: String,
    pub invitee_did: String,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    pub uri: String,
    pub argument_uri: String,
    pub reviewer_did: String,
    pub criteria_json: String,
    pub vote: Vote,
    pub justification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}
