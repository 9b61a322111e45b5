//! Upstream strategies, caching, and coordination for Firewatch.
//!
//! Responsibilities:
//! - Implement [`firewatch_core::EventSource`] for the remote query endpoint,
//!   the push channel, same-network peers, and the local cache.
//! - Offload parsing and filtering to a background thread.
//! - Compose the sources behind a single [`SourceCoordinator`].
//!
//! Boundaries:
//! - Domain types and persistence traits live in `firewatch-core`.
//! - Blocking store calls run on Tokio's blocking pool, never on the
//!   async executor.
//!
//! Invariants:
//! - No global mutable state; collaborators are passed at construction.
//! - Every timer is owned by the component that starts it and stops in
//!   `destroy()`.

#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod coordinator;
mod http;
pub mod peer;
pub mod push;
pub mod remote;
pub mod schedule;
pub mod worker;

#[doc(hidden)]
pub mod test_support;

pub use cache::{CacheConfig, CacheEngine, CacheError, CacheStats};
pub use config::{BuildError, FirewatchConfig, build_coordinator, open_store};
pub use coordinator::{
    CoordinatorConfig, CoordinatorError, CoordinatorSnapshot, SourceCoordinator, SourceHealth,
    SourceSet,
};
pub use http::HttpError;
pub use peer::{
    AnnouncementBrowser, DiscoveryConfig, HttpPeerProbe, NoAnnouncements, PeerConfig,
    PeerDiscoverySource, PeerProbe, ScanRange,
};
pub use push::{
    BackoffPolicy, ClientMessage, PushChannelSource, PushConfig, PushConnection, PushTransport,
    ServerMessage, TransportError, WebSocketTransport,
};
pub use remote::{RemoteConfig, RemoteQuerySource};
pub use schedule::PeriodicTask;
pub use worker::{
    BackgroundProcessor, DisplayFeature, ProcessMetrics, ProcessOutput, ProcessingPath,
    TransformError, WorkerConfig,
};
