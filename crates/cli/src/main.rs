//! shellcache: command-line host for the offline cache worker.
//!
//! Every invocation boots the worker (install, then activate) against the
//! configured store before running its command, so bumping the version
//! between runs evicts the previous version's store.

mod args;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shellcache_client::{FetchClient, FetchConfig, ServiceWorker};
use shellcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.map(|p| p.to_string_lossy().into_owned()))?;

    let db = CacheDb::open(&config.db_path).await?;
    let fetch = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = ServiceWorker::from_config(&config, db, fetch.clone())?;
    let report = worker.start().await?;

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Install => commands::install(&worker, &report, &mut out)?,
        Commands::Fetch { url, navigate } => commands::fetch(&worker, fetch.as_ref(), &url, navigate, &mut out).await?,
        Commands::Message { json } => commands::message(&worker, &json, &mut out).await?,
        Commands::Stores => commands::stores(&worker, &mut out).await?,
        Commands::Status => commands::status(&worker, &mut out).await?,
    }

    Ok(())
}
