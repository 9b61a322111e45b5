//! Health and data requests against a candidate peer.

use std::time::Duration;

use async_trait::async_trait;
use firewatch_core::QueryParams;
use reqwest::Client;

use crate::{
    http::{self, HttpError},
    remote::DEFAULT_USER_AGENT,
};

/// Talks to peers offering the remote endpoint's data contract.
#[async_trait]
pub trait PeerProbe: Send + Sync {
    /// `GET {url}/health`; returns the round-trip time on success.
    async fn health(&self, url: &str, timeout: Duration) -> Result<Duration, HttpError>;

    /// `GET {url}/events` scoped by `params`; returns the body text.
    async fn fetch(
        &self,
        url: &str,
        params: &QueryParams,
        timeout: Duration,
    ) -> Result<String, HttpError>;
}

/// [`PeerProbe`] issuing real HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpPeerProbe {
    client: Client,
}

impl HttpPeerProbe {
    /// Build a probe with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Network`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        Ok(Self {
            client: http::build_client(timeout, DEFAULT_USER_AGENT)?,
        })
    }
}

#[async_trait]
impl PeerProbe for HttpPeerProbe {
    async fn health(&self, url: &str, timeout: Duration) -> Result<Duration, HttpError> {
        let endpoint = http::endpoint_url(url, "health")?;
        http::probe(&self.client, endpoint, timeout).await
    }

    async fn fetch(
        &self,
        url: &str,
        params: &QueryParams,
        timeout: Duration,
    ) -> Result<String, HttpError> {
        let endpoint = http::events_url(url, params)?;
        http::get_text(&self.client, endpoint, timeout).await
    }
}
