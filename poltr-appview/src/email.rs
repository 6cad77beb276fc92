//! Magic-link delivery, stubbed behind a trait.
//!
//! SMTP delivery is out of scope; this mirrors `freeq-server::verifiers`'s
//! convention of treating an external delivery concern as swappable (it
//! does the same for OAuth/GitHub providers) rather than hard-coding one.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait MagicLinkMailer: Send + Sync {
    async fn send_registration_link(&self, email: &str, link: &str);
    async fn send_login_link(&self, email: &str, link: &str);
}

/// Logs the link instead of sending it. The only implementation provided;
/// a real SMTP sender is left to the deployer.
pub struct LoggingMailer;

#[async_trait]
impl MagicLinkMailer for LoggingMailer {
    async fn send_registration_link(&self, email: &str, link: &str) {
        info!(%email, %link, "registration magic link (not actually sent)");
    }

    async fn send_login_link(&self, email: &str, link: &str) {
        info!(%email, %link, "login magic link (not actually sent)");
    }
}
