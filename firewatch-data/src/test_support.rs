//! Test doubles for the network seams.
//!
//! [`StaticHttpServer`] answers canned responses on a loopback port,
//! [`StubTransport`] scripts a push server, and [`StubProbe`] and
//! [`StaticBrowser`] stand in for peer discovery.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use firewatch_core::{EventRecord, QueryParams};
use log::debug;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    http::HttpError,
    peer::{AnnouncementBrowser, PeerProbe},
    push::{ClientMessage, PushConnection, PushTransport, ServerMessage, TransportError},
};

type Routes = HashMap<String, (u16, String)>;

/// Loopback HTTP server returning fixed bodies per path.
///
/// Unknown paths answer `404`. Every request line is recorded.
#[derive(Debug)]
pub struct StaticHttpServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StaticHttpServer {
    /// Bind an ephemeral port and serve `routes` as `(path, status, body)`.
    ///
    /// # Panics
    ///
    /// Panics when no loopback port can be bound.
    #[expect(
        clippy::expect_used,
        reason = "a fixture that cannot bind loopback cannot run any test"
    )]
    pub async fn start(routes: Vec<(&str, u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let address = listener.local_addr().expect("listener address");
        let table: Arc<Routes> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_owned(), (status, body)))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routing = Arc::clone(&table);
                let seen = Arc::clone(&log);
                tokio::spawn(async move {
                    if let Err(err) = respond(stream, &routing, &seen).await {
                        debug!("static server connection failed: {err}");
                    }
                });
            }
        });
        Self {
            base_url: format!("http://{address}"),
            requests,
            task,
        }
    }

    /// `http://127.0.0.1:<port>` without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Request lines received so far, e.g. `GET /events?bbox=... HTTP/1.1`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl Drop for StaticHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(
    mut stream: TcpStream,
    routes: &Routes,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        head.extend(chunk.iter().take(read));
    }
    let text = String::from_utf8_lossy(&head);
    let request_line = text.lines().next().unwrap_or_default().to_owned();
    let path = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|target| target.split('?').next())
        .unwrap_or("/")
        .to_owned();
    lock(seen).push(request_line);

    let (status, body) = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| (404, String::new()));
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500..=599 => "Server Error",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[derive(Debug)]
enum Incoming {
    Frame(ServerMessage),
    Close,
}

#[derive(Debug, Default)]
struct TransportState {
    current: Vec<EventRecord>,
    failing_connects: usize,
    connects: usize,
    sent: Vec<ClientMessage>,
    link: Option<mpsc::UnboundedSender<Incoming>>,
}

/// Scripted push server.
///
/// Connections answer `get-current` with the configured records filtered
/// to the requested scope. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    state: Arc<Mutex<TransportState>>,
}

impl StubTransport {
    /// Records returned for `get-current`.
    #[must_use]
    pub fn with_current(self, events: Vec<EventRecord>) -> Self {
        lock(&self.state).current = events;
        self
    }

    /// Refuse the next `count` connection attempts.
    #[must_use]
    pub fn failing_connects(self, count: usize) -> Self {
        lock(&self.state).failing_connects = count;
        self
    }

    /// Deliver `message` on the open connection, if any.
    pub fn push(&self, message: ServerMessage) {
        if let Some(link) = &lock(&self.state).link
            && link.send(Incoming::Frame(message)).is_err()
        {
            debug!("stub push dropped: connection gone");
        }
    }

    /// Close the open connection from the server side.
    pub fn drop_connection(&self) {
        if let Some(link) = lock(&self.state).link.take()
            && link.send(Incoming::Close).is_err()
        {
            debug!("stub connection already closed");
        }
    }

    /// Every frame the client has sent, across connections.
    #[must_use]
    pub fn sent(&self) -> Vec<ClientMessage> {
        lock(&self.state).sent.clone()
    }

    /// Number of connection attempts, including refused ones.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }
}

#[async_trait]
impl PushTransport for StubTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, TransportError> {
        let mut state = lock(&self.state);
        state.connects = state.connects.saturating_add(1);
        if state.failing_connects > 0 {
            state.failing_connects = state.failing_connects.saturating_sub(1);
            return Err(TransportError::Connect {
                url: url.to_owned(),
                message: "refused".to_owned(),
            });
        }
        let (link, incoming) = mpsc::unbounded_channel();
        state.link = Some(link.clone());
        Ok(Box::new(StubConnection {
            state: Arc::clone(&self.state),
            replies: link,
            incoming,
        }))
    }
}

struct StubConnection {
    state: Arc<Mutex<TransportState>>,
    replies: mpsc::UnboundedSender<Incoming>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
}

#[async_trait]
impl PushConnection for StubConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let reply = {
            let mut state = lock(&self.state);
            state.sent.push(message.clone());
            match message {
                ClientMessage::GetCurrent { params } => Some(ServerMessage::Current {
                    events: params.filter(state.current.clone()),
                }),
                ClientMessage::JoinGroup { .. } | ClientMessage::LeaveGroup { .. } => None,
            }
        };
        if let Some(frame) = reply {
            self.replies
                .send(Incoming::Frame(frame))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        match self.incoming.recv().await {
            Some(Incoming::Frame(message)) => Some(Ok(message)),
            Some(Incoming::Close) | None => None,
        }
    }
}

#[derive(Debug, Clone)]
struct StubPeer {
    healthy: bool,
    body: String,
    fetch_fails: bool,
}

/// Scripted peer probe keyed by base URL.
///
/// Unknown URLs are unreachable.
#[derive(Debug, Default)]
pub struct StubProbe {
    peers: Mutex<HashMap<String, StubPeer>>,
    health_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubProbe {
    /// Register a healthy peer serving `body` from its events endpoint.
    #[must_use]
    pub fn healthy(self, url: &str, body: &str) -> Self {
        lock(&self.peers).insert(
            url.to_owned(),
            StubPeer {
                healthy: true,
                body: body.to_owned(),
                fetch_fails: false,
            },
        );
        self
    }

    /// Make event fetches from `url` fail while health probes succeed.
    #[must_use]
    pub fn failing_fetch(self, url: &str) -> Self {
        if let Some(peer) = lock(&self.peers).get_mut(url) {
            peer.fetch_fails = true;
        }
        self
    }

    /// Flip the health of `url`, registering it with an empty body if new.
    pub fn set_healthy(&self, url: &str, healthy: bool) {
        lock(&self.peers)
            .entry(url.to_owned())
            .or_insert_with(|| StubPeer {
                healthy,
                body: "[]".to_owned(),
                fetch_fails: false,
            })
            .healthy = healthy;
    }

    /// Number of health probes issued.
    #[must_use]
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Number of event fetches issued.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Most health probes observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn peer(&self, url: &str) -> Option<StubPeer> {
        lock(&self.peers).get(url).cloned()
    }
}

fn unreachable_peer(url: &str) -> HttpError {
    HttpError::Network {
        url: url.to_owned(),
        message: "connection refused".to_owned(),
    }
}

#[async_trait]
impl PeerProbe for StubProbe {
    async fn health(&self, url: &str, _timeout: Duration) -> Result<Duration, HttpError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        // Give sibling probes a chance to start before this one finishes.
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.peer(url) {
            Some(peer) if peer.healthy => Ok(Duration::from_millis(1)),
            _ => Err(unreachable_peer(url)),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        _params: &QueryParams,
        _timeout: Duration,
    ) -> Result<String, HttpError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.peer(url) {
            Some(peer) if peer.healthy && !peer.fetch_fails => Ok(peer.body),
            Some(peer) if peer.fetch_fails => Err(HttpError::Status {
                url: url.to_owned(),
                status: 503,
                message: "Service Unavailable".to_owned(),
            }),
            _ => Err(unreachable_peer(url)),
        }
    }
}

/// Announcement browser returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticBrowser {
    urls: Vec<String>,
}

impl StaticBrowser {
    /// Announce `urls` on every browse.
    #[must_use]
    pub const fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl AnnouncementBrowser for StaticBrowser {
    async fn browse(&self, _timeout: Duration) -> Vec<String> {
        self.urls.clone()
    }
}

/// Poll `check` every few milliseconds for up to a second.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
