//! Subcommand handlers. Each writes a human-readable report to `out`.

use std::io::Write;

use anyhow::{Result, bail};
use shellcache_client::fetch::resolve;
use shellcache_client::worker::{EventReply, StartReport};
use shellcache_client::{CacheMode, FetchDisposition, Network, Request, ServiceWorker, WorkerEvent, WorkerMessage};

pub fn install(worker: &ServiceWorker, report: &StartReport, out: &mut impl Write) -> Result<()> {
    let ctx = worker.context();
    writeln!(out, "installed {} into {}", ctx.version, ctx.store_name)?;
    for url in &report.populate.stored {
        writeln!(out, "  stored  {url}")?;
    }
    for (url, reason) in &report.populate.failed {
        writeln!(out, "  failed  {url}: {reason}")?;
    }
    if let Some(evict) = &report.evict {
        for name in &evict.deleted {
            writeln!(out, "  evicted {name}")?;
        }
        for (name, reason) in &evict.failed {
            writeln!(out, "  kept    {name}: {reason}")?;
        }
    }
    Ok(())
}

pub async fn fetch(
    worker: &ServiceWorker, network: &dyn Network, url: &str, navigate: bool, out: &mut impl Write,
) -> Result<()> {
    let url = resolve(&worker.context().scope, url)?;
    let request = if navigate { Request::navigate(url) } else { Request::get(url) };

    let handled = worker.dispatch(WorkerEvent::Fetch(request.clone())).await?;
    let EventReply::Fetch(disposition) = handled.reply else {
        bail!("fetch event produced no fetch reply");
    };

    let (response, source) = match disposition {
        FetchDisposition::Respond { response, source } => (response, format!("{source:?}").to_lowercase()),
        FetchDisposition::Passthrough => (network.fetch(&request, CacheMode::Default).await?, "passthrough".into()),
        FetchDisposition::NetworkError(message) => {
            handled.lifetime.settled().await;
            bail!("network error: {message}");
        }
    };
    handled.lifetime.settled().await;

    tracing::info!(status = response.status.as_u16(), %source, "{}", response.url);
    writeln!(out, "{} {} ({source})", response.status.as_u16(), response.status_text)?;
    out.write_all(&response.body)?;
    writeln!(out)?;
    Ok(())
}

pub async fn message(worker: &ServiceWorker, json: &str, out: &mut impl Write) -> Result<()> {
    let message = WorkerMessage::parse(json)?;
    let handled = worker.dispatch(WorkerEvent::Message(message)).await?;
    let EventReply::Message(reply) = handled.reply else {
        bail!("message event produced no message reply");
    };
    handled.lifetime.settled().await;

    writeln!(out, "{}", serde_json::to_string(&reply)?)?;
    Ok(())
}

pub async fn stores(worker: &ServiceWorker, out: &mut impl Write) -> Result<()> {
    let db = worker.store().db();
    for name in db.store_names().await? {
        let marker = if name == worker.context().store_name { "*" } else { " " };
        writeln!(out, "{marker} {name} ({} entries)", db.count_entries(&name).await?)?;
    }
    Ok(())
}

pub async fn status(worker: &ServiceWorker, out: &mut impl Write) -> Result<()> {
    let ctx = worker.context();
    writeln!(out, "version:     {}", ctx.version)?;
    writeln!(out, "store:       {}", ctx.store_name)?;
    writeln!(out, "scope:       {}", ctx.scope)?;
    writeln!(out, "shell:       {}", ctx.shell)?;
    writeln!(out, "navigation:  {:?}", ctx.navigation)?;
    writeln!(out, "phase:       {:?}", worker.phase().await)?;
    writeln!(out, "controlling: {}", worker.is_controlling().await)?;
    Ok(())
}
