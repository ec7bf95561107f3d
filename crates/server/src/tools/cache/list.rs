//! cache_list tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ServiceWorker;
use shellcache_core::Error;

use crate::tools::json_result;

/// Parameters for the cache_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheListParams {
    /// Store to list (default: the current version's store).
    #[serde(default)]
    pub store: Option<String>,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub store: String,
    /// Stored request URLs, sorted.
    pub urls: Vec<String>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(worker: &ServiceWorker, params: CacheListParams) -> Result<CallToolResult, McpError> {
    let store = params.store.unwrap_or_else(|| worker.context().store_name.clone());
    let db = worker.store().db();

    if !db.has_store(&store).await? {
        return Err(Error::StoreMissing(store).into());
    }

    let urls = db.entry_urls(&store).await?;
    json_result(&CacheListOutput { store, urls })
}
