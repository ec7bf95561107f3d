//! worker_fetch tool implementation.
//!
//! Delivers one fetch event to the worker and reports the response it
//! produced. Requests the worker does not intercept are fetched directly
//! by the host, unmodified.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::fetch::{HeaderName, HeaderValue, Method, resolve};
use shellcache_client::{
    CacheMode, Destination, FetchDisposition, Network, Request, Response, ServiceWorker, WorkerEvent,
    worker::EventReply,
};
use shellcache_core::Error;

use super::{json_result, label};
use crate::error::ToolError;

/// Input parameters for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// URL to request; relative URLs resolve against the worker scope.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level page load.
    #[serde(default)]
    pub navigate: bool,

    /// Request destination, e.g. "script", "style", "image", "document".
    #[serde(default)]
    pub destination: Option<String>,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    /// URL of the response.
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// One of "cache", "network", "offline" or "passthrough".
    pub source: String,
    pub content_type: Option<String>,
    /// Body as text, for textual content types.
    pub body: Option<String>,
    pub body_bytes: usize,
    /// Background tasks (store writes) completed before this reply.
    pub background_tasks: usize,
}

pub(crate) fn build_request(worker: &ServiceWorker, params: &WorkerFetchParams) -> Result<Request, McpError> {
    let url = resolve(&worker.context().scope, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let method = params
        .method
        .to_ascii_uppercase()
        .parse::<Method>()
        .map_err(|_| ToolError::InvalidInput(format!("invalid method: {}", params.method)))?;

    let mut request = (if params.navigate { Request::navigate(url) } else { Request::get(url) }).with_method(method);

    if let Some(destination) = &params.destination {
        let destination: Destination = serde_json::from_value(serde_json::Value::String(destination.clone()))
            .map_err(|_| ToolError::InvalidInput(format!("unknown destination: {destination}")))?;
        request = request.with_destination(destination);
    }

    for (name, value) in &params.headers {
        let name = name
            .parse::<HeaderName>()
            .map_err(|_| ToolError::InvalidInput(format!("invalid header name: {name}")))?;
        let value = value
            .parse::<HeaderValue>()
            .map_err(|_| ToolError::InvalidInput(format!("invalid header value for {name}")))?;
        request = request.with_header(name, value);
    }

    Ok(request)
}

fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.starts_with("text/") || ct.contains("json") || ct.contains("javascript") || ct.contains("xml")
    })
}

fn to_output(response: &Response, source: &str, background_tasks: usize) -> WorkerFetchOutput {
    let content_type = response.content_type().map(str::to_string);
    let body = is_textual(content_type.as_deref()).then(|| String::from_utf8_lossy(&response.body).into_owned());
    WorkerFetchOutput {
        url: response.url.to_string(),
        status: response.status.as_u16(),
        status_text: response.status_text.clone(),
        source: source.to_string(),
        content_type,
        body,
        body_bytes: response.body.len(),
        background_tasks,
    }
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(
    worker: &ServiceWorker, network: &dyn Network, params: WorkerFetchParams,
) -> Result<CallToolResult, McpError> {
    let request = build_request(worker, &params)?;
    let handled = worker.dispatch(WorkerEvent::Fetch(request.clone())).await?;

    let EventReply::Fetch(disposition) = handled.reply else {
        return Err(Error::WorkerState("fetch event produced no fetch reply".into()).into());
    };

    let (response, source) = match disposition {
        FetchDisposition::Respond { response, source } => (response, label(&source)),
        FetchDisposition::Passthrough => {
            let response = network.fetch(&request, CacheMode::Default).await?;
            (response, "passthrough".to_string())
        }
        FetchDisposition::NetworkError(message) => {
            handled.lifetime.settled().await;
            return Err(Error::Network(message).into());
        }
    };

    let background_tasks = handled.lifetime.settled().await;
    json_result(&to_output(&response, &source, background_tasks))
}
