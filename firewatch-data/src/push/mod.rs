//! Persistent push channel delivering incremental deltas.
//!
//! One background task owns the connection. It joins the group for the
//! most recently requested bounding box, applies `created`/`updated`/
//! `resolved` frames to a working set, answers `get-current` requests in
//! order, and reconnects with exponential backoff when the connection
//! drops. Once attempts are exhausted the source reports a critical error
//! and the next `refresh` starts over.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use firewatch_core::{
    EventRecord, EventSet, EventSource, QueryParams, SourceCapabilities, SourceError, SourceKind,
    SourceSnapshot, SourceState, bbox::GLOBAL_GROUP,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::worker::BackgroundProcessor;

mod backoff;
mod message;
mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use message::{ClientMessage, ServerMessage};
pub use transport::{PushConnection, PushTransport, TransportError, WebSocketTransport};

/// Configuration for [`PushChannelSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Channel endpoint, e.g. `wss://fires.example.org/push`.
    pub url: String,
    /// Bound on connecting and on each `get-current` round-trip.
    pub request_timeout: Duration,
    /// Reconnect schedule.
    pub backoff: BackoffPolicy,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/push".to_owned(),
            request_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl PushConfig {
    /// Configuration for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the reconnect schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Lifecycle of the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkStatus {
    Connecting,
    Connected,
    Stopped,
}

/// Why a connection pump stopped.
enum PumpExit {
    Cancelled,
    Lost(TransportError),
}

#[derive(Debug)]
struct Channel {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Session {
    working: EventSet,
    seeded: bool,
    group: Option<String>,
}

struct PushShared {
    config: PushConfig,
    transport: Arc<dyn PushTransport>,
    state: SourceState,
    session: Mutex<Session>,
    pending: Mutex<VecDeque<oneshot::Sender<Vec<EventRecord>>>>,
    link: watch::Sender<LinkStatus>,
    cancel: CancellationToken,
}

impl PushShared {
    fn group(&self) -> String {
        lock(&self.session)
            .group
            .clone()
            .unwrap_or_else(|| GLOBAL_GROUP.to_owned())
    }

    /// Record `key` as the group to join on the next connect.
    fn adopt_group(&self, key: &str) {
        let mut session = lock(&self.session);
        if session.group.as_deref() != Some(key) {
            session.group = Some(key.to_owned());
            session.seeded = false;
        }
    }

    fn handle(&self, message: ServerMessage) {
        match message {
            ServerMessage::Current { events } => {
                {
                    let mut session = lock(&self.session);
                    session.working.replace_all(events.iter().cloned());
                    session.seeded = true;
                }
                let waiter = lock(&self.pending).pop_front();
                if let Some(tx) = waiter
                    && tx.send(events).is_err()
                {
                    debug!("get-current answer arrived after the caller gave up");
                }
            }
            other => {
                if let Some(delta) = other.into_delta() {
                    let id = delta.record().id();
                    if !lock(&self.session).working.apply(delta) {
                        debug!("ignored push delta for record {id}");
                    }
                }
            }
        }
    }

    fn connection_lost(&self) {
        self.state.set_disconnected();
        lock(&self.session).seeded = false;
        let abandoned: Vec<_> = lock(&self.pending).drain(..).collect();
        if !abandoned.is_empty() {
            debug!("failing {} pending get-current requests", abandoned.len());
        }
    }

    async fn run(self: Arc<Self>, mut outgoing: mpsc::UnboundedReceiver<ClientMessage>) {
        let mut backoff = self.config.backoff.start();
        loop {
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                attempt = self.transport.connect(&self.config.url) => attempt,
            };
            match connected {
                Ok(mut connection) => {
                    backoff.reset();
                    match self.serve(connection.as_mut(), &mut outgoing).await {
                        PumpExit::Cancelled => {
                            self.connection_lost();
                            break;
                        }
                        PumpExit::Lost(err) => {
                            self.link.send_replace(LinkStatus::Connecting);
                            self.connection_lost();
                            warn!("push channel lost: {err}");
                            self.state.report_error(SourceError::warning(err.to_string()));
                        }
                    }
                }
                Err(err) => {
                    warn!("push channel connect failed: {err}");
                    self.state.report_error(SourceError::warning(err.to_string()));
                }
            }
            let Some(delay) = backoff.next_delay() else {
                let attempts = backoff.attempts();
                self.state.report_error(SourceError::critical(format!(
                    "push channel unavailable after {attempts} reconnect attempts"
                )));
                break;
            };
            debug!("reconnecting push channel in {delay:?}");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        self.link.send_replace(LinkStatus::Stopped);
    }

    async fn serve(
        &self,
        connection: &mut dyn PushConnection,
        outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    ) -> PumpExit {
        let key = self.group();
        if let Err(err) = connection.send(&ClientMessage::JoinGroup { key: key.clone() }).await {
            return PumpExit::Lost(err);
        }
        info!("push channel joined group {key}");
        self.state.set_connected(self.config.url.as_str());
        self.link.send_replace(LinkStatus::Connected);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PumpExit::Cancelled,
                queued = outgoing.recv() => {
                    let Some(message) = queued else {
                        return PumpExit::Cancelled;
                    };
                    if let Err(err) = connection.send(&message).await {
                        return PumpExit::Lost(err);
                    }
                }
                frame = connection.next() => match frame {
                    None => return PumpExit::Lost(TransportError::Closed),
                    Some(Ok(message)) => self.handle(message),
                    Some(Err(TransportError::Decode { message })) => {
                        warn!("ignoring undecodable push frame: {message}");
                    }
                    Some(Err(err)) => return PumpExit::Lost(err),
                },
            }
        }
    }
}

/// [`EventSource`] fed by a persistent push channel.
pub struct PushChannelSource {
    shared: Arc<PushShared>,
    processor: Arc<BackgroundProcessor>,
    capabilities: SourceCapabilities,
    channel: tokio::sync::Mutex<Option<Channel>>,
}

impl std::fmt::Debug for PushChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannelSource")
            .field("url", &self.shared.config.url)
            .field("link", &*self.shared.link.borrow())
            .finish_non_exhaustive()
    }
}

impl PushChannelSource {
    /// Build a source that connects through `transport` on first use.
    #[must_use]
    pub fn new(
        config: PushConfig,
        transport: Arc<dyn PushTransport>,
        processor: Arc<BackgroundProcessor>,
    ) -> Self {
        let (link, _) = watch::channel(LinkStatus::Stopped);
        Self {
            shared: Arc::new(PushShared {
                config,
                transport,
                state: SourceState::default(),
                session: Mutex::new(Session::default()),
                pending: Mutex::new(VecDeque::new()),
                link,
                cancel: CancellationToken::new(),
            }),
            processor,
            capabilities: SourceCapabilities {
                supports_push: true,
                supports_peer_discovery: false,
                supports_caching: true,
                supports_filtering: true,
                supports_bounding_box: true,
                max_concurrent_requests: 1,
                update_interval: Duration::ZERO,
            },
            channel: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether a connection is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.link.borrow() == LinkStatus::Connected
    }

    /// Copy of the working set, ordered by id.
    #[must_use]
    pub fn working_set(&self) -> Vec<EventRecord> {
        lock(&self.shared.session).working.to_vec()
    }

    /// Group the channel is subscribed to.
    #[must_use]
    pub fn group(&self) -> String {
        self.shared.group()
    }

    /// Start the connection task if none is running and wait until it is
    /// connected. A new task joins `group` directly. Returns the sender for
    /// outgoing frames.
    async fn ensure_connected(
        &self,
        group: &str,
    ) -> Result<mpsc::UnboundedSender<ClientMessage>, SourceError> {
        if self.shared.cancel.is_cancelled() {
            return Err(SourceError::warning("push source was destroyed"));
        }
        let outgoing = {
            let mut channel = self.channel.lock().await;
            match channel.as_ref() {
                Some(existing) if !existing.task.is_finished() => existing.outgoing.clone(),
                _ => {
                    self.shared.adopt_group(group);
                    let (tx, rx) = mpsc::unbounded_channel();
                    self.shared.link.send_replace(LinkStatus::Connecting);
                    let task = tokio::spawn(Arc::clone(&self.shared).run(rx));
                    *channel = Some(Channel {
                        outgoing: tx.clone(),
                        task,
                    });
                    tx
                }
            }
        };
        let mut link = self.shared.link.subscribe();
        let settled = tokio::time::timeout(
            self.shared.config.request_timeout,
            link.wait_for(|status| *status != LinkStatus::Connecting),
        )
        .await
        .ok()
        .and_then(Result::ok)
        .map(|status| *status);
        match settled {
            Some(LinkStatus::Connected) => Ok(outgoing),
            Some(LinkStatus::Stopped) => Err(self
                .shared
                .state
                .snapshot()
                .error
                .filter(SourceError::is_critical)
                .unwrap_or_else(|| {
                    SourceError::warning(format!(
                        "push channel {} has stopped",
                        self.shared.config.url
                    ))
                })),
            Some(LinkStatus::Connecting) | None => Err(SourceError::warning(format!(
                "push channel {} is not connected",
                self.shared.config.url
            ))),
        }
    }

    /// Move the subscription to `key`, leaving the previous group first.
    /// Returns whether the group changed.
    fn switch_group(
        &self,
        outgoing: &mpsc::UnboundedSender<ClientMessage>,
        key: String,
    ) -> Result<bool, SourceError> {
        let previous = {
            let mut session = lock(&self.shared.session);
            let previous = session
                .group
                .replace(key.clone())
                .unwrap_or_else(|| GLOBAL_GROUP.to_owned());
            if previous != key {
                session.seeded = false;
            }
            previous
        };
        if previous == key {
            return Ok(false);
        }
        debug!("push channel moving from group {previous} to {key}");
        send(outgoing, ClientMessage::LeaveGroup { key: previous })?;
        send(outgoing, ClientMessage::JoinGroup { key })?;
        Ok(true)
    }

    async fn request_current(
        &self,
        outgoing: &mpsc::UnboundedSender<ClientMessage>,
        params: &QueryParams,
    ) -> Result<Vec<EventRecord>, SourceError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).push_back(tx);
        send(outgoing, ClientMessage::GetCurrent { params: *params })?;
        match tokio::time::timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(events)) => Ok(events),
            Ok(Err(_)) => Err(SourceError::warning(
                "push channel closed before answering get-current",
            )),
            Err(_) => Err(SourceError::warning(format!(
                "push channel did not answer get-current within {:?}",
                self.shared.config.request_timeout
            ))),
        }
    }

    async fn fetch(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        let key = params.group_key();
        let outgoing = self.ensure_connected(&key).await?;
        self.switch_group(&outgoing, key)?;
        let seeded = lock(&self.shared.session).seeded;
        let events = if seeded {
            self.working_set()
        } else {
            self.request_current(&outgoing, params).await?
        };
        Ok(self.processor.filter_by_bounds(events, params).await)
    }
}

#[async_trait]
impl EventSource for PushChannelSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Push
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &self.capabilities
    }

    async fn init(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.shared.state.begin_refresh();
        match self.fetch(params).await {
            Ok(events) => {
                self.shared.state.finish_ok(events.len());
                Ok(events)
            }
            Err(err) => {
                self.shared.state.finish_err(err.clone());
                Err(err)
            }
        }
    }

    async fn destroy(&self) {
        self.shared.cancel.cancel();
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel
            && let Err(err) = channel.task.await
        {
            warn!("push connection task ended abnormally: {err}");
        }
        self.shared.connection_lost();
        self.shared.link.send_replace(LinkStatus::Stopped);
    }

    async fn health_check(&self) -> bool {
        !self.shared.cancel.is_cancelled() && self.shared.state.is_healthy()
    }

    fn state(&self) -> SourceSnapshot {
        self.shared.state.snapshot()
    }
}

fn send(
    outgoing: &mpsc::UnboundedSender<ClientMessage>,
    message: ClientMessage,
) -> Result<(), SourceError> {
    outgoing
        .send(message)
        .map_err(|_| SourceError::warning("push connection task has stopped"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
