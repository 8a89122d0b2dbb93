//! Command-line interface for swcache
//!
//! Parses arguments with clap and plays the host platform for a worker:
//! each subcommand fires one lifecycle event (or inspects the cache
//! storage) and prints a short line-oriented report.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{CacheError, CacheStorage, CacheStore};
use crate::config::{ConfigError, Preset, WorkerConfig};
use crate::network::{Network, Request};
use crate::worker::{ServiceWorker, WorkerError};

/// Error types for the command-line driver
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified profile name is not recognized
    #[error("Invalid profile: '{0}'. Valid profiles: tennis-lab, actus, actus-daily")]
    InvalidProfile(String),

    /// Worker configuration could not be built
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No home directory to place the default cache in
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// A lifecycle event failed
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Inspecting the cache storage failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Writing the report failed
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Some fetch targets could not be served
    #[error("{0} fetch(es) failed")]
    FetchFailed(usize),
}

/// swcache - offline asset cache with network-first and cache-first routing
#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline asset caching worker for static web apps")]
#[command(version)]
pub struct Cli {
    /// Built-in worker profile
    ///
    /// Valid profiles: tennis-lab, actus, actus-daily
    #[arg(long, short, value_name = "PROFILE", default_value = "actus")]
    pub profile: String,

    /// TOML worker configuration (replaces --profile)
    #[arg(long, value_name = "FILE", conflicts_with = "profile")]
    pub config: Option<PathBuf>,

    /// Origin the asset paths are relative to (overrides the config's scope)
    #[arg(long, value_name = "URL")]
    pub origin: Option<String>,

    /// Directory holding the caches (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Lifecycle events and inspection commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pre-cache the profile's asset list
    Install,
    /// Delete caches from other versions
    Activate,
    /// Fetch paths or URLs through the worker, in order
    Fetch {
        /// Paths relative to the origin, or absolute URLs
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// List caches and their entries
    Keys,
}

/// Parses a profile string argument into a Preset.
///
/// # Arguments
/// * `s` - The profile string from CLI
///
/// # Returns
/// * `Ok(Preset)` if the string matches a built-in profile
/// * `Err(CliError::InvalidProfile)` if the string doesn't match
pub fn parse_profile_arg(s: &str) -> Result<Preset, CliError> {
    Preset::from_str(s).ok_or_else(|| CliError::InvalidProfile(s.to_string()))
}

/// Builds the worker configuration selected by the CLI arguments.
///
/// A `--config` file wins over `--profile`; `--origin` overrides the scope
/// either way.
pub fn resolve_config(cli: &Cli) -> Result<WorkerConfig, CliError> {
    let origin = cli.origin.as_deref();
    match &cli.config {
        Some(path) => Ok(WorkerConfig::load(path, origin)?),
        None => {
            let preset = parse_profile_arg(&cli.profile)?;
            Ok(WorkerConfig::preset(preset, origin)?)
        }
    }
}

/// Runs one command against the worker, writing its report to `out`
pub async fn execute<S, N, W>(
    worker: &ServiceWorker<S, N>,
    command: &Command,
    out: &mut W,
) -> Result<(), CliError>
where
    S: CacheStorage,
    N: Network,
    W: Write,
{
    let cache_name = &worker.config().cache_name;

    match command {
        Command::Install => {
            let count = worker.install().await?;
            writeln!(out, "installed {} assets into {}", count, cache_name)?;
        }
        Command::Activate => {
            let report = worker.activate().await?;
            for name in &report.deleted {
                writeln!(out, "deleted {}", name)?;
            }
            writeln!(out, "active cache: {}", cache_name)?;
        }
        Command::Fetch { targets } => {
            let mut failed = 0;
            for target in targets {
                let url = match worker.config().resolve(target) {
                    Ok(url) => url,
                    Err(e) => {
                        failed += 1;
                        tracing::error!(value = %target, error = %e, "invalid fetch target");
                        writeln!(out, "ERR - 0 {}", target)?;
                        continue;
                    }
                };
                let request = Request::get(url);
                match worker.fetch(&request).await {
                    Ok(outcome) => writeln!(
                        out,
                        "{} {} {} {}",
                        outcome.response.status,
                        outcome.served_from,
                        outcome.response.body.len(),
                        request.url
                    )?,
                    Err(e) => {
                        failed += 1;
                        tracing::error!(url = %request.url, error = %e, "fetch failed");
                        writeln!(out, "ERR - 0 {}", request.url)?;
                    }
                }
            }
            if failed > 0 {
                return Err(CliError::FetchFailed(failed));
            }
        }
        Command::Keys => {
            let names = worker.storage().keys().await?;
            if names.is_empty() {
                writeln!(out, "no caches")?;
            }
            for name in names {
                let marker = if &name == cache_name { "*" } else { " " };
                writeln!(out, "{} {}", marker, name)?;
                for request in worker.storage().open(&name).await?.keys().await? {
                    writeln!(out, "    {}", request.url)?;
                }
            }
        }
    }
    Ok(())
}
