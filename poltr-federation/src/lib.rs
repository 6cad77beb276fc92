//! Best-effort clients for the external Directory and Relay.
//!
//! Grounded on `freeq-server::verifiers::bluesky`'s polling style (a bare
//! `reqwest::Client`, a `User-Agent` header, pagination via a `cursor`
//! field) adapted to fixed-interval retry instead of pagination. Every
//! operation here is non-fatal by contract: callers never see an `Err`,
//! only a `bool` (or unit) outcome, and failures are logged at `warn!` and
//! swallowed. This mirrors the propagation policy in which only the
//! registration saga (C5) treats failures as fatal.

use std::time::Duration;

use tracing::{info, instrument, warn};

const USER_AGENT: &str = "poltr-appview";

pub struct DirectoryClient {
    http: reqwest::Client,
    directory_url: String,
}

impl DirectoryClient {
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            directory_url: directory_url.into(),
        }
    }

    /// Polls the Directory for `did`'s DID document. Returns `true` on the
    /// first HTTP 200, `false` (with a logged warning) if `timeout`
    /// elapses first.
    #[instrument(skip(self))]
    pub async fn wait_for_directory_resolution(&self, did: &str, timeout: Duration, interval: Duration) -> bool {
        let url = format!("{}/{did}", self.directory_url);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.http.get(&url).header("User-Agent", USER_AGENT).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(%did, "directory resolution confirmed");
                    return true;
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(%did, "directory resolution did not confirm before timeout");
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

pub struct RelayClient {
    http: reqwest::Client,
    relay_url: String,
}

impl RelayClient {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: relay_url.into(),
        }
    }

    /// Polls the Relay's latest-commit endpoint for `did`. Succeeds when
    /// the Relay reports any rev lexicographically ≥ `expected_rev` (AT
    /// Protocol TIDs are base32-sortable), or on any 200 if no
    /// `expected_rev` was given.
    #[instrument(skip(self))]
    pub async fn wait_for_relay_indexed(
        &self,
        did: &str,
        expected_rev: Option<&str>,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let url = format!(
            "{}/xrpc/com.atproto.sync.getLatestCommit?did={did}",
            self.relay_url
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(resp) = self.http.get(&url).header("User-Agent", USER_AGENT).send().await {
                if resp.status().is_success() {
                    let satisfied = match expected_rev {
                        None => true,
                        Some(expected) => resp
                            .json::<serde_json::Value>()
                            .await
                            .ok()
                            .and_then(|v| v.get("rev").and_then(|r| r.as_str()).map(String::from))
                            .is_some_and(|rev| rev.as_str() >= expected),
                    };
                    if satisfied {
                        info!(%did, "relay commit visibility confirmed");
                        return true;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(%did, "relay did not report commit visibility before timeout");
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Fire-and-forget notification asking the Relay to crawl `hostname`.
    /// Never returns an error to the caller; logs and moves on.
    #[instrument(skip(self))]
    pub async fn request_crawl(&self, hostname: &str) {
        let url = format!("{}/xrpc/com.atproto.sync.requestCrawl", self.relay_url);
        match self
            .http
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "hostname": hostname }))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => info!(%hostname, "requested relay crawl"),
            Ok(resp) => warn!(%hostname, status = %resp.status(), "relay crawl request rejected"),
            Err(e) => warn!(%hostname, error = %e, "relay crawl request failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn directory_resolution_succeeds_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/did:plc:abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "did:plc:abc"})))
            .mount(&server)
            .await;

        let client = DirectoryClient::new(server.uri());
        let ok = client
            .wait_for_directory_resolution("did:plc:abc", Duration::from_millis(200), Duration::from_millis(10))
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn directory_resolution_times_out_gracefully() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/did:plc:missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = DirectoryClient::new(server.uri());
        let ok = client
            .wait_for_directory_resolution("did:plc:missing", Duration::from_millis(50), Duration::from_millis(10))
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn relay_indexed_without_expected_rev() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.sync.getLatestCommit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"rev": "3jzfcijpj2z2a"})))
            .mount(&server)
            .await;

        let client = RelayClient::new(server.uri());
        let ok = client
            .wait_for_relay_indexed("did:plc:abc", None, Duration::from_millis(200), Duration::from_millis(10))
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn relay_crawl_request_never_panics_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.sync.requestCrawl"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RelayClient::new(server.uri());
        client.request_crawl("pds.poltr.info").await;
    }
}
