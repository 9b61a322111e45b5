//! One-shot queries against the remote events endpoint.
//!
//! Every refresh issues a single `GET {base}/events` carrying the bounding
//! box and time range as query parameters. Endpoints that ignore those
//! parameters are marked non-filtering and the scope is re-applied locally.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use firewatch_core::{
    EventRecord, EventSource, QueryParams, SourceCapabilities, SourceError, SourceKind,
    SourceSnapshot, SourceState,
};
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    http::{self, HttpError},
    worker::BackgroundProcessor,
};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("firewatch/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`RemoteQuerySource`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use firewatch_data::RemoteConfig;
///
/// let config = RemoteConfig::new("https://fires.example.org/api")
///     .with_timeout(Duration::from_secs(10))
///     .with_server_filters(true);
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; `/events` and `/health` are appended.
    pub base_url: String,
    /// Bound on a single request.
    pub timeout: Duration,
    /// User agent header.
    pub user_agent: String,
    /// Whether the endpoint applies bbox and time filters itself.
    pub server_filters: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            server_filters: false,
        }
    }
}

impl RemoteConfig {
    /// Configuration for `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Declare whether the endpoint filters server-side.
    #[must_use]
    pub const fn with_server_filters(mut self, server_filters: bool) -> Self {
        self.server_filters = server_filters;
        self
    }
}

/// [`EventSource`] backed by the remote query endpoint.
#[derive(Debug)]
pub struct RemoteQuerySource {
    config: RemoteConfig,
    client: Client,
    processor: Arc<BackgroundProcessor>,
    capabilities: SourceCapabilities,
    state: SourceState,
    cancel: CancellationToken,
}

impl RemoteQuerySource {
    /// Build a source issuing requests against `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Network`] when the HTTP client cannot be built.
    pub fn new(config: RemoteConfig, processor: Arc<BackgroundProcessor>) -> Result<Self, HttpError> {
        let client = http::build_client(config.timeout, &config.user_agent)?;
        let capabilities = SourceCapabilities {
            supports_push: false,
            supports_peer_discovery: false,
            supports_caching: true,
            supports_filtering: config.server_filters,
            supports_bounding_box: true,
            max_concurrent_requests: 4,
            update_interval: Duration::from_secs(60),
        };
        Ok(Self {
            config,
            client,
            processor,
            capabilities,
            state: SourceState::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn fetch(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        let url = http::events_url(&self.config.base_url, params)?;
        debug!("querying {url}");
        let body = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(SourceError::warning("remote source was destroyed"));
            }
            body = http::get_text(&self.client, url, self.config.timeout) => body?,
        };
        let local_scope = if self.config.server_filters {
            QueryParams::default()
        } else {
            *params
        };
        let output = self
            .processor
            .process(&body, &local_scope)
            .await
            .map_err(|err| SourceError::error(format!("remote payload rejected: {err}")))?;
        Ok(output.data)
    }
}

#[async_trait]
impl EventSource for RemoteQuerySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &self.capabilities
    }

    async fn init(&self) -> Result<(), SourceError> {
        http::endpoint_url(&self.config.base_url, "events")?;
        Ok(())
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.state.begin_refresh();
        match self.fetch(params).await {
            Ok(events) => {
                self.state.set_connected(self.config.base_url.as_str());
                self.state.finish_ok(events.len());
                Ok(events)
            }
            Err(err) => {
                warn!("remote refresh failed: {err}");
                self.state.set_disconnected();
                self.state.finish_err(err.clone());
                Err(err)
            }
        }
    }

    async fn destroy(&self) {
        self.cancel.cancel();
        self.state.set_disconnected();
    }

    async fn health_check(&self) -> bool {
        // The query endpoint is the only path a remote server is required to serve.
        let healthy = match http::endpoint_url(&self.config.base_url, "events") {
            Ok(url) => http::probe(&self.client, url, self.config.timeout)
                .await
                .is_ok(),
            Err(_) => false,
        };
        self.state.set_healthy(healthy);
        healthy
    }

    fn state(&self) -> SourceSnapshot {
        self.state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support::StaticHttpServer, worker::WorkerConfig};
    use firewatch_core::{BoundingBox, Severity, test_support::events_in};
    use rstest::{fixture, rstest};

    #[fixture]
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime")
    }

    fn processor() -> Arc<BackgroundProcessor> {
        Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled()))
    }

    fn bbox_params() -> QueryParams {
        QueryParams::default().with_bbox(BoundingBox::new(0.0, 0.0, 5.0, 5.0).expect("bbox"))
    }

    #[rstest]
    fn non_filtering_endpoint_is_filtered_locally(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let body = serde_json::to_string(&events_in(10, [0.0, 0.0, 10.0, 10.0]))
                .expect("serialise");
            let server = StaticHttpServer::start(vec![("/events", 200, body)]).await;
            let source = RemoteQuerySource::new(RemoteConfig::new(server.base_url()), processor())
                .expect("source");

            let events = source.refresh(&bbox_params()).await.expect("refresh");

            assert_eq!(events.len(), 5);
            let snapshot = source.state();
            assert!(snapshot.connection.connected);
            assert_eq!(snapshot.stats.count, 5);
            assert!(
                server
                    .requests()
                    .iter()
                    .any(|request| request.contains("bbox=0%2C0%2C5%2C5"))
            );
        });
    }

    #[rstest]
    fn filtering_endpoint_is_trusted(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let body = serde_json::to_string(&events_in(10, [0.0, 0.0, 10.0, 10.0]))
                .expect("serialise");
            let server = StaticHttpServer::start(vec![("/events", 200, body)]).await;
            let config = RemoteConfig::new(server.base_url()).with_server_filters(true);
            let source = RemoteQuerySource::new(config, processor()).expect("source");

            let events = source.refresh(&bbox_params()).await.expect("refresh");

            assert_eq!(events.len(), 10);
        });
    }

    #[rstest]
    fn server_errors_are_error_severity(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let server = StaticHttpServer::start(vec![("/events", 503, String::new())]).await;
            let source = RemoteQuerySource::new(RemoteConfig::new(server.base_url()), processor())
                .expect("source");

            let err = source
                .refresh(&QueryParams::default())
                .await
                .expect_err("503 should fail");

            assert_eq!(err.severity, Severity::Error);
            assert!(err.recoverable);
            let snapshot = source.state();
            assert_eq!(snapshot.error, Some(err));
            assert!(!snapshot.loading);
            assert_eq!(snapshot.connection.consecutive_errors, 1);
        });
    }

    #[rstest]
    fn unreachable_endpoint_is_a_warning(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let config = RemoteConfig::new("http://127.0.0.1:9")
                .with_timeout(Duration::from_secs(1));
            let source = RemoteQuerySource::new(config, processor()).expect("source");

            let err = source
                .refresh(&QueryParams::default())
                .await
                .expect_err("nothing listens on the discard port");

            assert_eq!(err.severity, Severity::Warning);
            assert!(!source.health_check().await);
        });
    }

    #[rstest]
    #[case::serving(200, true)]
    #[case::overloaded(503, false)]
    fn health_follows_the_events_endpoint(
        runtime: tokio::runtime::Runtime,
        #[case] status: u16,
        #[case] expected: bool,
    ) {
        runtime.block_on(async {
            let server = StaticHttpServer::start(vec![("/events", status, "[]".to_owned())]).await;
            let source = RemoteQuerySource::new(RemoteConfig::new(server.base_url()), processor())
                .expect("source");

            assert_eq!(source.health_check().await, expected);
            assert_eq!(source.state().healthy, expected);
            assert!(
                server
                    .requests()
                    .iter()
                    .all(|line| line.starts_with("GET /events"))
            );
        });
    }

    #[rstest]
    fn destroyed_source_refuses_work(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let server = StaticHttpServer::start(vec![("/events", 200, "[]".to_owned())]).await;
            let source = RemoteQuerySource::new(RemoteConfig::new(server.base_url()), processor())
                .expect("source");
            source.destroy().await;
            let err = source
                .refresh(&QueryParams::default())
                .await
                .expect_err("destroyed");
            assert_eq!(err.severity, Severity::Warning);
        });
    }
}
