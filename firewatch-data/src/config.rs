//! Top-level configuration and wiring of a ready-to-use coordinator.

use std::{path::PathBuf, sync::Arc};

use firewatch_core::{
    EventSource, MemoryRevisionStore, NetworkMonitor, RevisionStore, RevisionStoreError,
    SqliteRevisionStore,
};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cache::{CacheConfig, CacheEngine},
    coordinator::{CoordinatorConfig, SourceCoordinator, SourceSet},
    http::HttpError,
    peer::{HttpPeerProbe, NoAnnouncements, PeerConfig, PeerDiscoverySource},
    push::{PushChannelSource, PushConfig, WebSocketTransport},
    remote::{RemoteConfig, RemoteQuerySource},
    worker::{BackgroundProcessor, WorkerConfig},
};

/// Settings for every component, deserialisable from a single document.
///
/// # Examples
///
/// ```
/// use firewatch_data::FirewatchConfig;
///
/// let config: FirewatchConfig = serde_json::from_str(
///     r#"{ "remote": { "base_url": "https://fires.example.org" } }"#,
/// )
/// .expect("valid config");
/// assert_eq!(config.remote.base_url, "https://fires.example.org");
/// assert!(config.cache_path.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewatchConfig {
    /// Remote query endpoint.
    pub remote: RemoteConfig,
    /// Push channel.
    pub push: PushConfig,
    /// Peer discovery.
    pub peer: PeerConfig,
    /// Cache tiers.
    pub cache: CacheConfig,
    /// Background processing.
    pub worker: WorkerConfig,
    /// Selection and fallback policy.
    pub coordinator: CoordinatorConfig,
    /// SQLite file backing the persistent tier; in-memory when unset.
    pub cache_path: Option<PathBuf>,
}

/// Failure assembling a coordinator.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An HTTP client could not be created.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The persistent store could not be opened.
    #[error("failed to open cache store at {path}: {source}")]
    Store {
        /// Database location.
        path: PathBuf,
        /// Store error.
        #[source]
        source: RevisionStoreError,
    },
}

/// Open the revision store configured by `config`.
///
/// # Errors
///
/// Returns [`BuildError::Store`] when the SQLite file cannot be opened.
pub fn open_store(config: &FirewatchConfig) -> Result<Arc<dyn RevisionStore>, BuildError> {
    match &config.cache_path {
        Some(path) => {
            let store = SqliteRevisionStore::open(path).map_err(|source| BuildError::Store {
                path: path.clone(),
                source,
            })?;
            info!("persistent cache at {}", path.display());
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryRevisionStore::default())),
    }
}

/// Build a coordinator over the production sources.
///
/// The sources share one [`BackgroundProcessor`]; the push source speaks
/// WebSocket and peers are found from manual entries and address ranges.
/// Call [`SourceCoordinator::init`] before the first refresh.
///
/// # Errors
///
/// Returns [`BuildError`] when an HTTP client or the store cannot be built.
pub fn build_coordinator(
    config: FirewatchConfig,
    monitor: Arc<dyn NetworkMonitor>,
) -> Result<SourceCoordinator, BuildError> {
    let store = open_store(&config)?;
    let FirewatchConfig {
        remote,
        push,
        peer,
        cache,
        worker,
        coordinator,
        cache_path: _,
    } = config;
    let processor = Arc::new(BackgroundProcessor::new(worker));
    let probe = HttpPeerProbe::new(peer.request_timeout)?;

    let sources = SourceSet {
        remote: Arc::new(RemoteQuerySource::new(remote, Arc::clone(&processor))?)
            as Arc<dyn EventSource>,
        push: Arc::new(PushChannelSource::new(
            push,
            Arc::new(WebSocketTransport),
            Arc::clone(&processor),
        )),
        peer: Arc::new(PeerDiscoverySource::new(
            peer,
            Arc::new(probe),
            Arc::new(NoAnnouncements),
            Arc::clone(&processor),
        )),
        cache: Arc::new(CacheEngine::new(cache, store, Arc::clone(&processor))),
    };
    Ok(SourceCoordinator::new(coordinator, sources, monitor).with_processor(processor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use firewatch_core::{NetworkCondition, SourceKind, StaticNetworkMonitor};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn partial_documents_keep_defaults() {
        let config: FirewatchConfig = serde_json::from_str(
            r#"{ "coordinator": { "push_enabled": false }, "worker": { "threshold": 10 } }"#,
        )
        .expect("parse");
        assert!(!config.coordinator.push_enabled);
        assert_eq!(config.worker.threshold, 10);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[rstest]
    fn sqlite_path_is_opened() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = FirewatchConfig {
            cache_path: Some(dir.path().join("cache.sqlite")),
            ..FirewatchConfig::default()
        };
        let store = open_store(&config).expect("open");
        assert_eq!(store.metadata().expect("metadata").revision_count, 0);
    }

    #[rstest]
    fn missing_directory_is_a_store_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = FirewatchConfig {
            cache_path: Some(dir.path().join("absent").join("cache.sqlite")),
            ..FirewatchConfig::default()
        };
        assert!(matches!(open_store(&config), Err(BuildError::Store { .. })));
    }

    #[rstest]
    fn offline_coordinator_selects_cache() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime");
        let mut config = FirewatchConfig::default();
        config.coordinator = config
            .coordinator
            .with_health_interval(Duration::ZERO);
        config.worker = config.worker.disabled();
        let monitor = StaticNetworkMonitor::new(NetworkCondition::Offline);

        runtime.block_on(async {
            let coordinator = build_coordinator(config, Arc::new(monitor)).expect("build");
            assert_eq!(coordinator.select_optimal_source(), SourceKind::Cache);
            coordinator.destroy().await;
        });
    }
}
