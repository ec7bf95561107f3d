//! cache_get tool implementation.
//!
//! Reads one stored entry by request identity, without going through the router.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ServiceWorker;
use shellcache_client::fetch::resolve;
use shellcache_core::Error;
use shellcache_core::cache::hash::compute_cache_key;

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// URL of the stored request; relative URLs resolve against the worker scope.
    pub url: String,

    /// Request method the entry was stored under (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Store to read (default: the current version's store).
    #[serde(default)]
    pub store: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub store: String,
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    /// Request headers the entry was stored under, when the response varies.
    pub vary: Option<serde_json::Value>,
    pub stored_at: String,
    pub body_bytes: usize,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = resolve(&worker.context().scope, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let store = params.store.unwrap_or_else(|| worker.context().store_name.clone());
    let db = worker.store().db();

    if !db.has_store(&store).await? {
        return Err(Error::StoreMissing(store).into());
    }

    let entry = db
        .get_entry(&store, &compute_cache_key(&params.method, url.as_str()))
        .await?
        .ok_or_else(|| Error::CacheMiss(url.to_string()))?;

    let vary = entry
        .vary_json
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| Error::CorruptEntry(e.to_string()))?;

    let output = CacheGetOutput {
        store,
        url: entry.url,
        method: entry.method,
        status: entry.status,
        status_text: entry.status_text,
        content_type: entry.content_type,
        vary,
        stored_at: entry.stored_at,
        body_bytes: entry.body.len(),
    };

    json_result(&output)
}
