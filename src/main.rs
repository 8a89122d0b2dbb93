//! swcache - offline asset caching worker
//!
//! Drives one worker instance against the on-disk cache storage and the
//! network: `install`, `activate`, `fetch <targets>...` or `keys`.

use clap::Parser;
use std::io;

use swcache::cli::{execute, resolve_config, Cli, CliError};
use swcache::{DiskCacheStorage, HttpNetwork, ServiceWorker};

/// Sets up stderr logging at the requested level (INFO if unparseable)
fn init_logging(level: &str) {
    let log_level = level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("Logging initialized at level: {}", log_level);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = resolve_config(&cli)?;
    let storage = match &cli.cache_dir {
        Some(dir) => DiskCacheStorage::with_dir(dir.clone()),
        None => DiskCacheStorage::new().ok_or(CliError::NoCacheDir)?,
    };
    tracing::debug!(root = %storage.root().display(), cache = %config.cache_name, "starting worker");

    let worker = ServiceWorker::new(config, storage, HttpNetwork::new());
    execute(&worker, &cli.command, &mut io::stdout()).await?;

    Ok(())
}
