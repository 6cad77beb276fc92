//! Process configuration, loaded once at startup via [`clap::Parser`], the
//! same pattern `freeq-server::ServerConfig` uses, generalized from
//! positional IRC listen addresses to the full set of external
//! collaborators this service depends on.

use clap::Parser;

/// Fixed birth date injected into `getPreferences` responses lacking a
/// `personalDetailsPref`, matching `src.config.DUMMY_BIRTHDATE` upstream.
pub const DUMMY_BIRTHDATE: &str = "1990-01-01";

#[derive(Debug, Clone, Parser)]
#[command(name = "poltr-appview", version, about = "Civic-participation AppView")]
pub struct Config {
    /// Connection string for the relational store.
    #[arg(long, env = "DB_URL")]
    pub db_url: String,

    /// Shared secret for PDS admin endpoints.
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: String,

    /// Non-TLS internal URL for admin ops (geofenced at the external ingress).
    #[arg(long, env = "PDS_INTERNAL_URL")]
    pub pds_internal_url: String,

    /// Public PDS hostname for user sessions, e.g. `https://pds.poltr.ch`.
    #[arg(long, env = "PDS_HOSTNAME")]
    pub pds_hostname: String,

    /// Identifier directory base URL.
    #[arg(long, env = "DIRECTORY_URL")]
    pub directory_url: String,

    /// Relay base URL.
    #[arg(long, env = "RELAY_URL")]
    pub relay_url: String,

    /// Upstream AppView base URL.
    #[arg(long, env = "UPSTREAM_APPVIEW_URL")]
    pub upstream_appview_url: String,

    /// Moderation service base URL.
    #[arg(long, env = "MODERATION_URL")]
    pub moderation_url: String,

    /// 32-byte symmetric key for app-password encryption, base64.
    #[arg(long, env = "MASTER_KEY_B64")]
    pub master_key_b64: String,

    /// Ed25519 seed for attestation signing, base64.
    #[arg(long, env = "SIGNING_KEY_SEED_B64")]
    pub signing_key_seed_b64: String,

    /// DID of the platform-owned governance PDS identity.
    #[arg(long, env = "GOVERNANCE_DID")]
    pub governance_did: String,

    /// Password for the governance PDS identity.
    #[arg(long, env = "GOVERNANCE_PASSWORD")]
    pub governance_password: String,

    /// DID of this service, published in the feed-generator descriptor.
    #[arg(long, env = "FEED_GENERATOR_DID")]
    pub feed_generator_did: String,

    #[arg(long, env = "CROSSPOST_ENABLED", default_value_t = true)]
    pub crosspost_enabled: bool,

    #[arg(long, env = "PEER_REVIEW_ENABLED", default_value_t = true)]
    pub peer_review_enabled: bool,

    #[arg(long, env = "CROSSPOST_POLL_INTERVAL_SECONDS", default_value_t = 30)]
    pub crosspost_poll_interval_seconds: u64,

    #[arg(long, env = "PEER_REVIEW_POLL_INTERVAL_SECONDS", default_value_t = 30)]
    pub peer_review_poll_interval_seconds: u64,

    #[arg(long, env = "PEER_REVIEW_QUORUM", default_value_t = 10)]
    pub peer_review_quorum: i64,

    #[arg(long, env = "PEER_REVIEW_INVITE_PROBABILITY", default_value_t = 0.35)]
    pub peer_review_invite_probability: f64,

    /// Freeform criteria description attached to submitted reviews.
    #[arg(long, env = "PEER_REVIEW_CRITERIA", default_value = "clarity,relevance,civility")]
    pub peer_review_criteria: String,

    /// Hard cap on local Credential count (0 = unlimited).
    #[arg(long, env = "MAX_ACCOUNTS", default_value_t = 0)]
    pub max_accounts: i64,

    /// Base URL used in cross-post card links and magic-link emails.
    #[arg(long, env = "FRONTEND_URL", default_value = "https://poltr.ch")]
    pub frontend_url: String,

    /// Extra CORS origins, comma-separated.
    #[arg(long, env = "APP_ALLOW_ORIGINS", default_value = "")]
    pub app_allow_origins: String,

    /// Short PDS domain label used when generating new handles
    /// (`user<6 random chars>.<this>`).
    #[arg(long, env = "PDS_DOMAIN_SHORT", default_value = "poltr.info")]
    pub pds_domain_short: String,

    #[arg(long, env = "PRODUCTION", default_value_t = false)]
    pub production: bool,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
}

impl Config {
    pub fn allow_origins(&self) -> Vec<String> {
        self.app_allow_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
