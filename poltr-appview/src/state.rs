//! Shared application state threaded through every axum handler and both
//! background workers.
//!
//! Grounded on `freeq-server::server::SharedState`: one `Arc`-wrapped
//! struct holding the DB pool, config, and any other process-wide mutable
//! state, cloned cheaply into every handler via axum's `State` extractor.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};

use poltr_crypto::{AttestationSigner, SecretBox};
use poltr_db::Gateway;
use poltr_federation::{DirectoryClient, RelayClient};
use poltr_pds::{PdsAdminClient, PdsSessionClient};

use crate::config::Config;
use crate::email::MagicLinkMailer;
use crate::governance::GovernanceIdentity;

type KeyedLimiter = RateLimiter<IpAddr, governor::state::keyed::DefaultKeyedStateStore<IpAddr>, governor::clock::DefaultClock>;

pub struct RateLimiters {
    pub send_magic_link: KeyedLimiter,
    pub verify: KeyedLimiter,
    pub register: KeyedLimiter,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            send_magic_link: RateLimiter::keyed(Quota::per_minute(NonZeroU32::new(5).unwrap())),
            verify: RateLimiter::keyed(Quota::per_minute(NonZeroU32::new(10).unwrap())),
            register: RateLimiter::keyed(Quota::per_minute(NonZeroU32::new(10).unwrap())),
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Gateway>,
    pub config: Arc<Config>,
    pub admin: Arc<PdsAdminClient>,
    pub user_session: Arc<PdsSessionClient>,
    pub directory: Arc<DirectoryClient>,
    pub relay: Arc<RelayClient>,
    pub secret_box: Arc<SecretBox>,
    pub attestation: Arc<AttestationSigner>,
    pub governance: Arc<GovernanceIdentity>,
    pub mailer: Arc<dyn MagicLinkMailer>,
    pub http: reqwest::Client,
    pub rate_limiters: Arc<RateLimiters>,
}
