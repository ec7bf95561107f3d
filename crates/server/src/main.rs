//! shellcache MCP server entry point.
//!
//! Boots the worker (install, then activate) against the configured store
//! and serves the MCP host tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchClient, FetchConfig, ServiceWorker};
use shellcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let db = CacheDb::open(&config.db_path).await?;
    let fetch = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(ServiceWorker::from_config(&config, db, fetch.clone())?);

    let report = worker.start().await?;
    tracing::info!(
        store = %worker.context().store_name,
        precached = report.populate.stored.len(),
        precache_failed = report.populate.failed.len(),
        evicted = report.evict.as_ref().map_or(0, |e| e.deleted.len()),
        "worker started; serving on stdio transport"
    );

    let handler = handler::ShellCacheServer::new(worker, fetch);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
