//! Fetch command implementation for the Firewatch CLI.

use std::{io::Write, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use firewatch_core::{
    BoundingBox, BoundingBoxError, EventRecord, NetworkCondition, QueryParams, SourceKind,
    StaticNetworkMonitor,
};
use firewatch_data::{
    CoordinatorConfig, CoordinatorSnapshot, DiscoveryConfig, FirewatchConfig, PeerConfig,
    PushConfig, RemoteConfig, build_coordinator,
};
use firewatch_fs::{PathKind, ensure_parent_dir, path_kind};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BBOX, ARG_CACHE_PATH, ARG_NETWORK, ARG_PEERS, ARG_PREFER, ARG_PUSH_URL, ARG_REMOTE_URL,
    CliError, ENV_REMOTE_URL, write_json,
};

/// CLI arguments for the `fetch` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Initialise every source, refresh once through the best \
                 available one, and print the events alongside the \
                 coordinator's status. Options can come from CLI flags, \
                 configuration files, or environment variables.",
    about = "Refresh fire events once"
)]
#[ortho_config(prefix = "FIREWATCH")]
pub(crate) struct FetchArgs {
    /// Base URL of the remote query endpoint.
    #[arg(long = ARG_REMOTE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) remote_url: Option<String>,
    /// WebSocket URL of the push channel; push is disabled when unset.
    #[arg(long = ARG_PUSH_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) push_url: Option<String>,
    /// Comma-separated peer base URLs, in preference order.
    #[arg(long = ARG_PEERS, value_name = "urls")]
    #[serde(default)]
    pub(crate) peers: Option<String>,
    /// Area of interest as `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long = ARG_BBOX, value_name = "bbox", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// SQLite file backing the persistent cache.
    #[arg(long = ARG_CACHE_PATH, value_name = "path")]
    #[serde(default)]
    pub(crate) cache_path: Option<Utf8PathBuf>,
    /// Network condition: `online`, `local-only`, or `offline`.
    #[arg(long = ARG_NETWORK, value_name = "condition")]
    #[serde(default)]
    pub(crate) network: Option<String>,
    /// Pin the active source: `remote`, `push`, `peer`, or `cache`.
    #[arg(long = ARG_PREFER, value_name = "source")]
    #[serde(default)]
    pub(crate) prefer: Option<String>,
}

impl FetchArgs {
    pub(crate) fn into_config(self) -> Result<FetchConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        FetchConfig::try_from(merged)
    }
}

/// Fully resolved `fetch` settings.
#[derive(Debug, Clone)]
pub(crate) struct FetchConfig {
    pub(crate) firewatch: FirewatchConfig,
    pub(crate) bbox: Option<BoundingBox>,
    pub(crate) network: NetworkCondition,
    pub(crate) cache_path: Option<Utf8PathBuf>,
}

impl FetchConfig {
    pub(crate) fn params(&self) -> QueryParams {
        self.bbox
            .map_or_else(QueryParams::default, |bbox| QueryParams::default().with_bbox(bbox))
    }

    /// Create the cache directory and refuse paths occupied by non-files.
    pub(crate) fn prepare_cache(&self) -> Result<(), CliError> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        prepare_cache_file(path)
    }
}

pub(crate) fn prepare_cache_file(path: &Utf8Path) -> Result<(), CliError> {
    let prepare_error = |source| CliError::PrepareCachePath {
        path: path.to_path_buf(),
        source,
    };
    match path_kind(path).map_err(prepare_error)? {
        PathKind::Other => Err(CliError::CachePathNotFile {
            path: path.to_path_buf(),
        }),
        PathKind::File => Ok(()),
        PathKind::Missing => ensure_parent_dir(path).map_err(prepare_error),
    }
}

impl TryFrom<FetchArgs> for FetchConfig {
    type Error = CliError;

    fn try_from(args: FetchArgs) -> Result<Self, Self::Error> {
        let remote_url = args.remote_url.ok_or(CliError::MissingArgument {
            field: ARG_REMOTE_URL,
            env: ENV_REMOTE_URL,
        })?;
        let bbox = args.bbox.as_deref().map(parse_bbox).transpose()?;
        let network = args
            .network
            .as_deref()
            .map_or(Ok(NetworkCondition::Online), parse_network)?;
        let preferred = args.prefer.as_deref().map(parse_source).transpose()?;

        let discovery = split_peers(args.peers.as_deref())
            .into_iter()
            .fold(DiscoveryConfig::default(), DiscoveryConfig::with_manual);
        let mut coordinator =
            CoordinatorConfig::default().with_push_enabled(args.push_url.is_some());
        if let Some(kind) = preferred {
            coordinator = coordinator.with_preferred(kind);
        }
        let firewatch = FirewatchConfig {
            remote: RemoteConfig::new(remote_url),
            push: args.push_url.map(PushConfig::new).unwrap_or_default(),
            peer: PeerConfig::default().with_discovery(discovery),
            coordinator,
            cache_path: args.cache_path.clone().map(Utf8PathBuf::into_std_path_buf),
            ..FirewatchConfig::default()
        };

        Ok(Self {
            firewatch,
            bbox,
            network,
            cache_path: args.cache_path,
        })
    }
}

fn parse_bbox(value: &str) -> Result<BoundingBox, CliError> {
    value
        .parse()
        .map_err(|err: BoundingBoxError| CliError::InvalidValue {
            field: ARG_BBOX,
            value: value.to_owned(),
            reason: err.to_string(),
        })
}

fn parse_network(value: &str) -> Result<NetworkCondition, CliError> {
    match value {
        "online" => Ok(NetworkCondition::Online),
        "local-only" => Ok(NetworkCondition::LocalOnly),
        "offline" => Ok(NetworkCondition::Offline),
        other => Err(CliError::InvalidValue {
            field: ARG_NETWORK,
            value: other.to_owned(),
            reason: "expected online, local-only, or offline".to_owned(),
        }),
    }
}

fn parse_source(value: &str) -> Result<SourceKind, CliError> {
    value
        .parse()
        .map_err(|reason: String| CliError::InvalidValue {
            field: ARG_PREFER,
            value: value.to_owned(),
            reason,
        })
}

fn split_peers(value: Option<&str>) -> Vec<String> {
    value
        .into_iter()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Output of a single `fetch`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FetchReport {
    pub(crate) events: Vec<EventRecord>,
    pub(crate) snapshot: CoordinatorSnapshot,
}

pub(super) fn run_fetch_with(args: FetchArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let report = execute_fetch(config)?;
    write_json(writer, &report)
}

pub(crate) fn execute_fetch(config: FetchConfig) -> Result<FetchReport, CliError> {
    config.prepare_cache()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(fetch(config))
}

async fn fetch(config: FetchConfig) -> Result<FetchReport, CliError> {
    let params = config.params();
    let monitor = Arc::new(StaticNetworkMonitor::new(config.network));
    let coordinator = build_coordinator(config.firewatch, monitor)?;
    coordinator.init().await;
    let outcome = coordinator.refresh(&params).await;
    let snapshot = coordinator.snapshot();
    coordinator.destroy().await;
    let events = outcome?;
    info!(
        "fetched {} events from {}",
        events.len(),
        snapshot.active
    );
    Ok(FetchReport { events, snapshot })
}
