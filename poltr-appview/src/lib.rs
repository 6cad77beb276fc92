//! AppView tier: registration saga, session service, governance identity,
//! cross-post and peer-review workers, and the XRPC frontend.
//!
//! Grounded on `freeq-server`'s split between a `Server` struct that wires
//! collaborators together and a `web` module exposing the router; `run`
//! below plays the `Server::run` role for this service.

pub mod config;
pub mod email;
pub mod error;
pub mod governance;
pub mod proxy;
pub mod pseudonym;
pub mod routes;
pub mod saga;
pub mod session;
pub mod state;
pub mod views;
pub mod wellknown;
pub mod workers;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use poltr_crypto::{AttestationSigner, MasterKey, SecretBox};
use poltr_db::Gateway;
use poltr_federation::{DirectoryClient, RelayClient};
use poltr_pds::{PdsAdminClient, PdsSessionClient};

use config::Config;
use email::LoggingMailer;
use governance::GovernanceIdentity;
use state::{AppState, RateLimiters};
use workers::crosspost::CrosspostWorker;
use workers::peer_review::PeerReviewWorker;

pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let db = Arc::new(Gateway::open_file(&config.db_url)?);
    let master_key = MasterKey::from_base64(&config.master_key_b64)?;
    let secret_box = Arc::new(SecretBox::new(master_key));
    let attestation = Arc::new(AttestationSigner::from_seed_base64(&config.signing_key_seed_b64)?);

    let admin = Arc::new(PdsAdminClient::new(config.pds_internal_url.clone(), config.admin_password.clone()));
    let user_session = Arc::new(PdsSessionClient::new(config.pds_hostname.clone()));
    let directory = Arc::new(DirectoryClient::new(config.directory_url.clone()));
    let relay = Arc::new(RelayClient::new(config.relay_url.clone()));

    let governance = Arc::new(GovernanceIdentity::new(
        PdsSessionClient::new(config.pds_hostname.clone()),
        config.governance_did.clone(),
        config.governance_password.clone(),
    ));

    let mailer = Arc::new(LoggingMailer);
    let http = reqwest::Client::new();

    Ok(AppState {
        db,
        config: Arc::new(config),
        admin,
        user_session,
        directory,
        relay,
        secret_box,
        attestation,
        governance,
        mailer,
        http,
        rate_limiters: Arc::new(RateLimiters::new()),
    })
}

pub fn spawn_workers(state: &AppState) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    let crosspost = Arc::new(CrosspostWorker::new(
        state.db.clone(),
        state.governance.clone(),
        (*state.user_session).clone(),
        state.secret_box.clone(),
        state.config.frontend_url.clone(),
        state.config.crosspost_enabled,
        Duration::from_secs(state.config.crosspost_poll_interval_seconds),
    ));
    handles.push(tokio::spawn(crosspost.run()));

    let peer_review = Arc::new(PeerReviewWorker::new(
        state.db.clone(),
        state.governance.clone(),
        state.config.peer_review_quorum,
        state.config.peer_review_invite_probability,
        state.config.peer_review_enabled,
        Duration::from_secs(state.config.peer_review_poll_interval_seconds),
    ));
    handles.push(tokio::spawn(peer_review.run()));

    handles
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.listen_addr.clone();
    let state = build_state(config)?;
    let _workers = spawn_workers(&state);

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(%listen_addr, "poltr-appview listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}
