//! worker_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ServiceWorker;

use super::{json_result, label};

/// One store visible to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreSummary {
    pub name: String,
    pub entries: u64,
    /// Whether this is the store owned by the running version.
    pub current: bool,
}

/// Output structure for worker_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusOutput {
    pub version: String,
    pub store_name: String,
    pub scope: String,
    pub shell: String,
    /// Lifecycle phase, e.g. "activated".
    pub phase: String,
    /// Whether fetches are routed through the worker.
    pub controlling: bool,
    /// "network-first" or "cache-first".
    pub navigation_strategy: String,
    pub precache: Vec<String>,
    pub stores: Vec<StoreSummary>,
}

/// Implementation of the worker_status tool.
pub async fn status_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let ctx = worker.context();
    let db = worker.store().db();

    let mut stores = Vec::new();
    for name in db.store_names().await? {
        let entries = db.count_entries(&name).await?;
        let current = name == ctx.store_name;
        stores.push(StoreSummary { name, entries, current });
    }

    let output = WorkerStatusOutput {
        version: ctx.version.clone(),
        store_name: ctx.store_name.clone(),
        scope: ctx.scope.to_string(),
        shell: ctx.shell.to_string(),
        phase: label(&worker.phase().await),
        controlling: worker.is_controlling().await,
        navigation_strategy: label(&ctx.navigation),
        precache: ctx.precache.iter().map(ToString::to_string).collect(),
        stores,
    };

    json_result(&output)
}
