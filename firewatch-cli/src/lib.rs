//! Command-line interface for querying fire events through Firewatch.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use serde::Serialize;

mod cache;
mod error;
mod fetch;

pub use error::CliError;

use cache::{CacheArgs, run_cache_clear_with, run_cache_stats_with};
use fetch::{FetchArgs, run_fetch_with};

pub(crate) const ARG_REMOTE_URL: &str = "remote-url";
pub(crate) const ARG_PUSH_URL: &str = "push-url";
pub(crate) const ARG_PEERS: &str = "peers";
pub(crate) const ARG_BBOX: &str = "bbox";
pub(crate) const ARG_CACHE_PATH: &str = "cache-path";
pub(crate) const ARG_NETWORK: &str = "network";
pub(crate) const ARG_PREFER: &str = "prefer";
pub(crate) const ENV_REMOTE_URL: &str = "FIREWATCH_CMDS_FETCH_REMOTE_URL";
pub(crate) const ENV_CACHE_PATH: &str = "FIREWATCH_CMDS_CACHE_CACHE_PATH";

/// Run the Firewatch CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments are invalid, configuration cannot
/// be merged, or the selected command fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_with(cli, &mut stdout)
}

fn run_with(cli: Cli, writer: &mut dyn Write) -> Result<(), CliError> {
    match cli.command {
        Command::Fetch(args) => run_fetch_with(args, writer),
        Command::Cache { action } => match action {
            CacheCommand::Stats(args) => run_cache_stats_with(args, writer),
            CacheCommand::Clear(args) => run_cache_clear_with(args, writer),
        },
    }
}

fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::Serialise)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "firewatch",
    about = "Fetch fire events from the best available source",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh events once and print them as JSON.
    Fetch(FetchArgs),
    /// Inspect or reset the persistent cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Print hit, miss, and size counters.
    Stats(CacheArgs),
    /// Remove every stored revision.
    Clear(CacheArgs),
}

#[cfg(test)]
mod tests;
