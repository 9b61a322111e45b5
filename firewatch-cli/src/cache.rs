//! Cache maintenance commands for the Firewatch CLI.

use std::{io::Write, sync::Arc, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use firewatch_core::EventSource;
use firewatch_data::{
    BackgroundProcessor, CacheConfig, CacheEngine, CacheStats, FirewatchConfig, WorkerConfig,
    open_store,
};
use firewatch_fs::{PathKind, path_kind};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{ARG_CACHE_PATH, CliError, ENV_CACHE_PATH, write_json};

/// CLI arguments shared by the `cache` subcommands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Locate the persistent cache")]
#[ortho_config(prefix = "FIREWATCH")]
pub(crate) struct CacheArgs {
    /// SQLite file backing the persistent cache.
    #[arg(long = ARG_CACHE_PATH, value_name = "path")]
    #[serde(default)]
    pub(crate) cache_path: Option<Utf8PathBuf>,
}

impl CacheArgs {
    fn into_path(self) -> Result<Utf8PathBuf, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let path = merged.cache_path.ok_or(CliError::MissingArgument {
            field: ARG_CACHE_PATH,
            env: ENV_CACHE_PATH,
        })?;
        require_cache_file(&path)?;
        Ok(path)
    }
}

/// Result of `cache clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ClearReport {
    /// Revisions held before clearing.
    pub(crate) cleared: usize,
}

fn require_cache_file(path: &Utf8Path) -> Result<(), CliError> {
    let kind = path_kind(path).map_err(|source| CliError::PrepareCachePath {
        path: path.to_path_buf(),
        source,
    })?;
    match kind {
        PathKind::File => Ok(()),
        PathKind::Missing => Err(CliError::MissingCacheFile {
            path: path.to_path_buf(),
        }),
        PathKind::Other => Err(CliError::CachePathNotFile {
            path: path.to_path_buf(),
        }),
    }
}

pub(super) fn run_cache_stats_with(
    args: CacheArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let path = args.into_path()?;
    let stats = cache_stats(&path)?;
    write_json(writer, &stats)
}

pub(super) fn run_cache_clear_with(
    args: CacheArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let path = args.into_path()?;
    let report = clear_cache(&path)?;
    write_json(writer, &report)
}

pub(crate) fn cache_stats(path: &Utf8Path) -> Result<CacheStats, CliError> {
    with_engine(path, |engine| async move { Ok(engine.cache_stats().await) })
}

pub(crate) fn clear_cache(path: &Utf8Path) -> Result<ClearReport, CliError> {
    with_engine(path, |engine| async move {
        let cleared = engine.cache_stats().await.revisions;
        engine.clear().await?;
        info!("cleared {cleared} cached revisions");
        Ok(ClearReport { cleared })
    })
}

/// Open the cache at `path`, index its revisions, and run `action`.
fn with_engine<T, F, Fut>(path: &Utf8Path, action: F) -> Result<T, CliError>
where
    F: FnOnce(Arc<CacheEngine>) -> Fut,
    Fut: Future<Output = Result<T, CliError>>,
{
    let config = FirewatchConfig {
        cache_path: Some(path.as_std_path().to_path_buf()),
        ..FirewatchConfig::default()
    };
    let store = open_store(&config)?;
    let engine = Arc::new(CacheEngine::new(
        CacheConfig::default().with_cleanup_interval(Duration::ZERO),
        store,
        Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled())),
    ));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(async {
        engine.init().await.map_err(CliError::CacheLoad)?;
        let outcome = action(Arc::clone(&engine)).await;
        engine.destroy().await;
        outcome
    })
}
